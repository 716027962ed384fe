use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

use crate::model::Encoding;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dotenv file {} does not exist", path.display())]
    FileNotFound { path: PathBuf },
    #[error("could not find {filename} in {} or any parent directory", start.display())]
    DotenvNotFound { filename: String, start: PathBuf },
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Unencodable { ch: char, encoding: Encoding },
    #[error("key {key:?} cannot be written to a dotenv file")]
    InvalidKey { key: String },
}

impl Error {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }
}

/// Raised when a `${NAME?message}` or `${NAME:?message}` reference fires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct LookupError {
    pub name: String,
    pub message: String,
}

/// Failure of a single [`Reader`](crate::Reader) operation.
///
/// The parser recovers from these locally; they only reach callers that
/// drive a `Reader` directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: u32,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: u32, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedEof,
    PatternMismatch,
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::PatternMismatch => write!(f, "pattern not found"),
        }
    }
}
