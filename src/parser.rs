use std::io::Read;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{Error, ParseError};
use crate::model::Encoding;
use crate::reader::{Original, Reader};

fn anchored(pattern: &str) -> Regex {
    Regex::new(&format!(r"\A(?:{pattern})")).expect("grammar regex")
}

static MULTILINE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| anchored(r"\s*"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| anchored(r"[^\S\r\n]*"));
static EXPORT: LazyLock<Regex> = LazyLock::new(|| anchored(r"(?:export[^\S\r\n]+)?"));
static SINGLE_QUOTED_KEY: LazyLock<Regex> = LazyLock::new(|| anchored(r"'([^']+)'"));
static UNQUOTED_KEY: LazyLock<Regex> = LazyLock::new(|| anchored(r"([^=#\s]+)"));
static EQUAL_SIGN: LazyLock<Regex> = LazyLock::new(|| anchored(r"=[^\S\r\n]*"));
static SINGLE_QUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| anchored(r"(?s)'((?:\\.|[^'\\])*)'"));
static DOUBLE_QUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| anchored(r#"(?s)"((?:\\.|[^"\\])*)""#));
// Quotes after the start of a value must close on the same line.
static INLINE_SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| anchored(r"'((?:\\[^\r\n]|[^'\\\r\n])*)'"));
static INLINE_DOUBLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| anchored(r#""((?:\\[^\r\n]|[^"\\\r\n])*)""#));
// Group 1 is the value text, group 2 the horizontal whitespace after it.
// `#` is content unless it starts the run or follows whitespace.
static UNQUOTED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    anchored(r##"((?:[^\s'"#](?:[^\s'"]|[^\S\r\n]+[^\s#'"])*)?)([^\S\r\n]*)"##)
});
static COMMENT: LazyLock<Regex> = LazyLock::new(|| anchored(r"(?:[^\S\r\n]*#[^\r\n]*)?"));
static END_OF_LINE: LazyLock<Regex> = LazyLock::new(|| anchored(r"[^\S\r\n]*(?:\r\n|\n|\r|\z)"));
static REST_OF_LINE: LazyLock<Regex> = LazyLock::new(|| anchored(r"[^\r\n]*(?:\r\n|\n|\r)?"));
static DOUBLE_QUOTE_ESCAPES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\\[\\'"abfnrtv]"#).expect("escape regex"));
static SINGLE_QUOTE_ESCAPES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\[\\']").expect("escape regex"));

/// Quote style of one segment of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Single,
    Double,
}

/// One segment of a value, with escapes already decoded.
///
/// `a=x"y"'z'` has three parts. Quote kind decides whether the text takes
/// part in interpolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePart {
    pub quote: Option<QuoteKind>,
    pub text: String,
}

impl ValuePart {
    fn unquoted(text: impl Into<String>) -> Self {
        Self {
            quote: None,
            text: text.into(),
        }
    }
}

/// One statement of a dotenv source: a binding, a comment/blank span, or a
/// malformed line.
///
/// Concatenating `original.text` over every binding of a parse yields the
/// input unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub key: Option<String>,
    /// `None` for comments, errors and keys declared without `=`.
    pub value: Option<String>,
    pub parts: Vec<ValuePart>,
    pub original: Original,
    pub is_error: bool,
}

/// Iterator over the bindings of one source.
#[derive(Debug, Clone)]
pub struct Bindings {
    reader: Reader,
}

impl Iterator for Bindings {
    type Item = Binding;

    fn next(&mut self) -> Option<Binding> {
        if !self.reader.has_next() {
            return None;
        }
        Some(parse_binding(&mut self.reader))
    }
}

/// Parse dotenv bindings from text.
pub fn parse_str(input: &str) -> Bindings {
    Bindings {
        reader: Reader::new(input),
    }
}

/// Parse dotenv bindings from raw bytes in the given encoding.
pub fn parse_bytes(input: &[u8], encoding: Encoding) -> Result<Bindings, Error> {
    let text = encoding.decode(input)?;
    Ok(Bindings {
        reader: Reader::new(text.into_owned()),
    })
}

/// Parse dotenv bindings from a stream, reading it to the end first.
///
/// The read blocks until the writer side closes, which is what makes a
/// named pipe usable as a source.
pub fn parse_reader<R: Read>(mut reader: R, encoding: Encoding) -> Result<Bindings, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    parse_bytes(&buf, encoding)
}

/// Log a warning for every malformed binding passing through.
pub(crate) fn warn_for_invalid_lines(bindings: Bindings) -> impl Iterator<Item = Binding> {
    bindings.inspect(|binding| {
        if binding.is_error {
            tracing::warn!(
                line = binding.original.line,
                "could not parse statement starting at line {}",
                binding.original.line
            );
        }
    })
}

fn parse_binding(reader: &mut Reader) -> Binding {
    reader.set_mark();
    match try_parse_binding(reader) {
        Ok(binding) => binding,
        Err(_) => {
            reader.read_matching(&REST_OF_LINE).ok();
            Binding {
                key: None,
                value: None,
                parts: Vec::new(),
                original: reader.get_marked(),
                is_error: true,
            }
        }
    }
}

fn try_parse_binding(reader: &mut Reader) -> Result<Binding, ParseError> {
    reader.read_matching(&MULTILINE_WHITESPACE)?;
    if !reader.has_next() {
        return Ok(Binding {
            key: None,
            value: None,
            parts: Vec::new(),
            original: reader.get_marked(),
            is_error: false,
        });
    }

    reader.read_matching(&EXPORT)?;
    let key = parse_key(reader)?;
    reader.read_matching(&WHITESPACE)?;

    let parts = if reader.peek_char() == Some('=') {
        reader.read_matching(&EQUAL_SIGN)?;
        Some(parse_value(reader)?)
    } else {
        None
    };

    reader.read_matching(&COMMENT)?;
    reader.read_matching(&END_OF_LINE)?;

    let value = parts
        .as_ref()
        .map(|parts| parts.iter().map(|part| part.text.as_str()).collect());
    Ok(Binding {
        key,
        value,
        parts: parts.unwrap_or_default(),
        original: reader.get_marked(),
        is_error: false,
    })
}

fn parse_key(reader: &mut Reader) -> Result<Option<String>, ParseError> {
    let groups = match reader.peek_char() {
        Some('#') => return Ok(None),
        Some('\'') => reader.read_matching(&SINGLE_QUOTED_KEY)?,
        _ => reader.read_matching(&UNQUOTED_KEY)?,
    };
    Ok(groups.into_iter().next())
}

fn parse_value(reader: &mut Reader) -> Result<Vec<ValuePart>, ParseError> {
    let mut parts = Vec::new();
    let mut pending_whitespace = String::new();

    loop {
        let at_start = parts.is_empty() && pending_whitespace.is_empty();
        let quoted = match (reader.peek_char(), at_start) {
            (Some('\''), true) => Some((QuoteKind::Single, &*SINGLE_QUOTED_VALUE)),
            (Some('"'), true) => Some((QuoteKind::Double, &*DOUBLE_QUOTED_VALUE)),
            (Some('\''), false) => Some((QuoteKind::Single, &*INLINE_SINGLE_QUOTED)),
            (Some('"'), false) => Some((QuoteKind::Double, &*INLINE_DOUBLE_QUOTED)),
            _ => None,
        };

        if let Some((quote, pattern)) = quoted {
            let raw = match reader.read_matching(pattern) {
                Ok(mut groups) => groups.swap_remove(0),
                Err(err) if at_start => return Err(err),
                Err(_) => {
                    // A quote that never closes is plain text, as in `don't`.
                    pending_whitespace.push_str(&reader.read(1)?);
                    push_unquoted(&mut parts, std::mem::take(&mut pending_whitespace));
                    continue;
                }
            };
            if !pending_whitespace.is_empty() {
                push_unquoted(&mut parts, std::mem::take(&mut pending_whitespace));
            }
            let text = match quote {
                QuoteKind::Single => decode_escapes(&SINGLE_QUOTE_ESCAPES, &raw),
                QuoteKind::Double => decode_escapes(&DOUBLE_QUOTE_ESCAPES, &raw),
            };
            parts.push(ValuePart {
                quote: Some(quote),
                text,
            });
            continue;
        }

        let mut groups = reader.read_matching(&UNQUOTED_VALUE)?;
        let trailing = groups.pop().unwrap_or_default();
        let text = groups.pop().unwrap_or_default();
        if text.is_empty() && trailing.is_empty() {
            break;
        }
        if !text.is_empty() {
            pending_whitespace.push_str(&text);
            push_unquoted(&mut parts, std::mem::take(&mut pending_whitespace));
        }
        pending_whitespace.push_str(&trailing);
    }

    Ok(parts)
}

/// Append unquoted text, merging it into a preceding unquoted part so that
/// `${...}` references around a literal quote stay in one piece.
fn push_unquoted(parts: &mut Vec<ValuePart>, text: String) {
    match parts.last_mut() {
        Some(last) if last.quote.is_none() => last.text.push_str(&text),
        _ => parts.push(ValuePart::unquoted(text)),
    }
}

fn decode_escapes(pattern: &Regex, text: &str) -> String {
    pattern
        .replace_all(text, |caps: &Captures| unescape(&caps[0]))
        .into_owned()
}

fn unescape(sequence: &str) -> String {
    let decoded = match sequence {
        r"\\" => "\\",
        r"\'" => "'",
        r#"\""# => "\"",
        r"\a" => "\x07",
        r"\b" => "\x08",
        r"\f" => "\x0c",
        r"\n" => "\n",
        r"\r" => "\r",
        r"\t" => "\t",
        r"\v" => "\x0b",
        other => other,
    };
    decoded.to_owned()
}
