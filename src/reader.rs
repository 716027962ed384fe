use regex::Regex;

use crate::error::{ParseError, ParseErrorKind};

/// The exact source text a binding was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Original {
    pub text: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    offset: usize,
    line: u32,
}

impl Position {
    fn start() -> Self {
        Self { offset: 0, line: 1 }
    }
}

/// Cursor over the full text of a dotenv source.
///
/// Offsets are byte offsets into the text. Lines are counted on every
/// consumed `\n`, `\r\n` or bare `\r`.
#[derive(Debug, Clone)]
pub struct Reader {
    text: String,
    position: Position,
    mark: Position,
}

impl Reader {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            position: Position::start(),
            mark: Position::start(),
        }
    }

    pub fn has_next(&self) -> bool {
        self.position.offset < self.text.len()
    }

    pub fn line(&self) -> u32 {
        self.position.line
    }

    pub fn set_mark(&mut self) {
        self.mark = self.position;
    }

    pub fn get_marked(&self) -> Original {
        Original {
            text: self.text[self.mark.offset..self.position.offset].to_owned(),
            line: self.mark.line,
        }
    }

    /// Up to `count` characters from the cursor, without consuming them.
    pub fn peek(&self, count: usize) -> &str {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .nth(count)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        &rest[..end]
    }

    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn read(&mut self, count: usize) -> Result<String, ParseError> {
        let result = self.peek(count).to_owned();
        if result.chars().count() < count {
            return Err(self.error(ParseErrorKind::UnexpectedEof));
        }
        self.advance(result.len());
        Ok(result)
    }

    /// Match `pattern` anchored at the cursor and consume the match.
    ///
    /// `pattern` must start with `\A`. Returns the capture groups, with
    /// non-participating groups as empty strings.
    pub fn read_matching(&mut self, pattern: &Regex) -> Result<Vec<String>, ParseError> {
        let Some(captures) = pattern.captures(self.rest()) else {
            return Err(self.error(ParseErrorKind::PatternMismatch));
        };
        let Some(whole) = captures.get(0).filter(|m| m.start() == 0) else {
            return Err(self.error(ParseErrorKind::PatternMismatch));
        };

        let groups = captures
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_owned()).unwrap_or_default())
            .collect();
        let consumed = whole.end();
        self.advance(consumed);
        Ok(groups)
    }

    fn rest(&self) -> &str {
        &self.text[self.position.offset..]
    }

    fn advance(&mut self, len: usize) {
        let consumed = &self.text[self.position.offset..self.position.offset + len];
        self.position.line += count_newlines(consumed);
        self.position.offset += len;
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.position.line, kind)
    }
}

fn count_newlines(text: &str) -> u32 {
    let bytes = text.as_bytes();
    let mut count = 0u32;
    let mut idx = 0usize;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\r' => {
                count += 1;
                if bytes.get(idx + 1) == Some(&b'\n') {
                    idx += 1;
                }
            }
            b'\n' => count += 1,
            _ => {}
        }
        idx += 1;
    }
    count
}
