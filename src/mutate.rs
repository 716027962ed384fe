use std::path::Path;

use crate::error::Error;
use crate::loader::read_file;
use crate::model::{Encoding, QuoteMode};
use crate::parser::{Binding, parse_str, warn_for_invalid_lines};

/// How [`set_key`] writes the new binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetKeyOptions {
    pub quote_mode: QuoteMode,
    /// Prefix the line with `export `.
    pub export: bool,
    pub encoding: Encoding,
}

/// Outcome of [`unset_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsetStatus {
    Removed,
    /// The file exists but declares no such key. Nothing was written.
    KeyNotFound,
    FileMissing,
}

impl UnsetStatus {
    pub fn removed(self) -> bool {
        self == Self::Removed
    }
}

/// Add or update `key` in an existing dotenv file.
///
/// Every binding of `key` is replaced in place; other bytes of the file are
/// left untouched. When the key is not present, a new line is appended.
/// The file must already exist.
pub fn set_key(
    path: impl AsRef<Path>,
    key: &str,
    value: &str,
    options: SetKeyOptions,
) -> Result<(bool, String, String), Error> {
    let path = path.as_ref();
    let text = read_file(path, options.encoding)?;
    let line = format_line(key, value, options)?;

    let bindings: Vec<Binding> = warn_for_invalid_lines(parse_str(&text)).collect();
    let mut out = String::with_capacity(text.len() + line.len());
    let mut replaced = false;
    let mut last_text = "";

    for binding in &bindings {
        let original = binding.original.text.as_str();
        if binding.key.as_deref() == Some(key) {
            out.push_str(leading_blank_lines(original));
            out.push_str(&line);
            replaced = true;
        } else {
            out.push_str(original);
        }
        last_text = original;
    }

    if !replaced {
        if !last_text.is_empty() && !last_text.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&line);
    }

    write_file(path, &out, options.encoding)?;
    Ok((true, key.to_owned(), value.to_owned()))
}

/// Remove every binding of `key` from a dotenv file.
pub fn unset_key(
    path: impl AsRef<Path>,
    key: &str,
    encoding: Encoding,
) -> Result<(UnsetStatus, String), Error> {
    let path = path.as_ref();
    let text = match read_file(path, encoding) {
        Ok(text) => text,
        Err(Error::FileNotFound { .. }) => {
            tracing::warn!(path = %path.display(), "can't delete from {} - it doesn't exist", path.display());
            return Ok((UnsetStatus::FileMissing, key.to_owned()));
        }
        Err(err) => return Err(err),
    };

    let mut out = String::with_capacity(text.len());
    let mut removed = false;
    for binding in warn_for_invalid_lines(parse_str(&text)) {
        let original = binding.original.text.as_str();
        if binding.key.as_deref() == Some(key) {
            out.push_str(leading_blank_lines(original));
            removed = true;
        } else {
            out.push_str(original);
        }
    }

    if !removed {
        tracing::warn!(key, path = %path.display(), "key {key} not removed from {} - key doesn't exist", path.display());
        return Ok((UnsetStatus::KeyNotFound, key.to_owned()));
    }

    write_file(path, &out, encoding)?;
    Ok((UnsetStatus::Removed, key.to_owned()))
}

fn write_file(path: &Path, text: &str, encoding: Encoding) -> Result<(), Error> {
    let bytes = encoding.encode(text)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn format_line(key: &str, value: &str, options: SetKeyOptions) -> Result<String, Error> {
    let prefix = if options.export { "export " } else { "" };
    Ok(format!(
        "{prefix}{}={}\n",
        format_key(key)?,
        format_value(value, options.quote_mode)
    ))
}

/// Write `key` so that it parses back to itself: bare when possible,
/// otherwise in single quotes, which take no escapes.
fn format_key(key: &str) -> Result<String, Error> {
    let plain = !key.starts_with('\'')
        && !key.chars().any(|ch| ch == '=' || ch == '#' || ch.is_whitespace());
    if key.is_empty() || (!plain && key.contains('\'')) {
        return Err(Error::InvalidKey {
            key: key.to_owned(),
        });
    }
    if plain {
        Ok(key.to_owned())
    } else {
        Ok(format!("'{key}'"))
    }
}

fn format_value(value: &str, mode: QuoteMode) -> String {
    let quote = match mode {
        QuoteMode::Always => true,
        QuoteMode::Auto => value.is_empty() || !value.chars().all(char::is_alphanumeric),
        QuoteMode::Never => false,
    };
    if !quote {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// The blank lines a binding's span starts with, up to its last newline.
fn leading_blank_lines(original: &str) -> &str {
    let whitespace = original.len() - original.trim_start().len();
    match original[..whitespace].rfind(['\n', '\r']) {
        Some(idx) => &original[..=idx],
        None => "",
    }
}
