//! Parse, load and edit `.env` files.
//!
//! Parsing is lossless: every [`Binding`] keeps the exact source text it
//! came from, so [`set_key`] and [`unset_key`] rewrite one binding without
//! disturbing the rest of the file. Values may reference other variables
//! with `${NAME}` and the POSIX-style `-`, `+` and `?` operators.
//!
//! [`dotenv_values`] and [`EnvLoader::parse_only`] never touch the process
//! environment. The convenience loaders (`dotenv`, `load_dotenv`,
//! `load_dotenv_from_reader`) mutate it and are `unsafe`, because callers
//! must guarantee no concurrent process-environment access.

mod env;
mod error;
mod find;
mod loader;
mod model;
mod mutate;
mod parser;
mod reader;
mod store;
mod variables;

pub use env::TargetEnv;
pub use error::{Error, LookupError, ParseError, ParseErrorKind};
pub use find::{find_dotenv, find_dotenv_from, walk_to_root};
pub use loader::{
    EnvLoader, dotenv, dotenv_values, dotenv_values_from_reader, get_key, load_dotenv,
    load_dotenv_from_reader,
};
pub use model::{Encoding, EnvMap, LoadReport, QuoteMode};
pub use mutate::{SetKeyOptions, UnsetStatus, set_key, unset_key};
pub use parser::{Binding, Bindings, QuoteKind, ValuePart, parse_bytes, parse_reader, parse_str};
pub use reader::{Original, Reader};
pub use store::{StoreBuilder, build};
pub use variables::{
    Action, Atom, EnvView, Layered, Operator, ProcessEnv, parse_variables, resolve,
};
