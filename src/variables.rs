//! `${NAME}` interpolation with POSIX default, alternate and error operators.
//!
//! Only the braced form is recognized; a bare `$NAME` is literal text.

use std::collections::{BTreeMap, HashMap};

use crate::error::LookupError;

const DEFAULT_ERROR_MESSAGE: &str = "parameter null or not set";

/// Read-only view of variables used during interpolation.
pub trait EnvView {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl<T: EnvView + ?Sized> EnvView for &T {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

impl EnvView for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvView for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// The current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvView for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
    }
}

/// Two views consulted in order.
#[derive(Debug, Clone, Copy)]
pub struct Layered<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: EnvView, B: EnvView> EnvView for Layered<A, B> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.first
            .lookup(name)
            .or_else(|| self.second.lookup(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `-`: argument when unset.
    Default,
    /// `:-`: argument when unset or empty.
    DefaultIfEmpty,
    /// `+`: argument when set.
    Alternate,
    /// `:+`: argument when set and non-empty.
    AlternateIfNonEmpty,
    /// `?`: fail when unset.
    Required,
    /// `:?`: fail when unset or empty.
    RequiredNonEmpty,
}

impl Operator {
    fn checks_empty(self) -> bool {
        matches!(
            self,
            Self::DefaultIfEmpty | Self::AlternateIfNonEmpty | Self::RequiredNonEmpty
        )
    }

    fn parse(input: &str) -> Option<(Self, usize)> {
        let (colon, rest) = match input.strip_prefix(':') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let op = match (colon, rest.as_bytes().first().copied()?) {
            (false, b'-') => Self::Default,
            (true, b'-') => Self::DefaultIfEmpty,
            (false, b'+') => Self::Alternate,
            (true, b'+') => Self::AlternateIfNonEmpty,
            (false, b'?') => Self::Required,
            (true, b'?') => Self::RequiredNonEmpty,
            _ => return None,
        };
        Some((op, usize::from(colon) + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub operator: Operator,
    pub argument: Vec<Atom>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Literal(String),
    Variable { name: String, action: Option<Action> },
}

impl Atom {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable {
            name: name.into(),
            action: None,
        }
    }

    pub fn resolve(&self, env: &impl EnvView) -> Result<String, LookupError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Variable { name, action } => resolve_variable(name, action.as_ref(), env),
        }
    }
}

/// Split `value` into literal text and variable references.
///
/// A `${` that does not form a valid reference is kept as literal text.
pub fn parse_variables(value: &str) -> Vec<Atom> {
    let (atoms, _) = parse_atoms(value, 0, false);
    atoms
}

/// Resolve a sequence of atoms against `env` and concatenate the results.
pub fn resolve(atoms: &[Atom], env: &impl EnvView) -> Result<String, LookupError> {
    let mut out = String::new();
    for atom in atoms {
        out.push_str(&atom.resolve(env)?);
    }
    Ok(out)
}

fn resolve_variable(
    name: &str,
    action: Option<&Action>,
    env: &impl EnvView,
) -> Result<String, LookupError> {
    let current = env.lookup(name);
    let Some(action) = action else {
        return Ok(current.unwrap_or_default());
    };

    let is_set = match &current {
        Some(value) => !(action.operator.checks_empty() && value.is_empty()),
        None => false,
    };

    match action.operator {
        Operator::Default | Operator::DefaultIfEmpty => match current {
            Some(value) if is_set => Ok(value),
            _ => resolve(&action.argument, env),
        },
        Operator::Alternate | Operator::AlternateIfNonEmpty => {
            if is_set {
                resolve(&action.argument, env)
            } else {
                Ok(String::new())
            }
        }
        Operator::Required | Operator::RequiredNonEmpty => match current {
            Some(value) if is_set => Ok(value),
            _ => {
                let message = resolve(&action.argument, env)?;
                Err(LookupError {
                    name: name.to_owned(),
                    message: if message.is_empty() {
                        DEFAULT_ERROR_MESSAGE.to_owned()
                    } else {
                        message
                    },
                })
            }
        },
    }
}

/// Parse atoms starting at `start`. When `nested`, stop at the first
/// unmatched `}` and return its offset; `None` means it was never found.
fn parse_atoms(input: &str, start: usize, nested: bool) -> (Vec<Atom>, Option<usize>) {
    let bytes = input.as_bytes();
    let mut atoms = Vec::new();
    let mut literal_start = start;
    let mut idx = start;

    while idx < bytes.len() {
        if nested && bytes[idx] == b'}' {
            push_literal(&mut atoms, &input[literal_start..idx]);
            return (atoms, Some(idx));
        }

        if bytes[idx] == b'$' && bytes.get(idx + 1) == Some(&b'{') {
            if let Some((atom, end)) = parse_reference(input, idx) {
                push_literal(&mut atoms, &input[literal_start..idx]);
                atoms.push(atom);
                idx = end;
                literal_start = end;
                continue;
            }
        }
        idx += 1;
    }

    push_literal(&mut atoms, &input[literal_start..]);
    (atoms, if nested { None } else { Some(bytes.len()) })
}

/// Parse `${...}` at `start`, returning the atom and the offset after `}`.
fn parse_reference(input: &str, start: usize) -> Option<(Atom, usize)> {
    let name_start = start + 2;
    let name_len = input[name_start..]
        .find(|ch: char| !is_name_char(ch))
        .unwrap_or(input.len() - name_start);
    if name_len == 0 {
        return None;
    }
    let name = &input[name_start..name_start + name_len];
    let after_name = name_start + name_len;

    if input[after_name..].starts_with('}') {
        return Some((Atom::variable(name), after_name + 1));
    }

    let (operator, op_len) = Operator::parse(&input[after_name..])?;
    let (argument, close) = parse_atoms(input, after_name + op_len, true);
    let close = close?;
    let action = Action { operator, argument };
    Some((
        Atom::Variable {
            name: name.to_owned(),
            action: Some(action),
        },
        close + 1,
    ))
}

fn is_name_char(ch: char) -> bool {
    !ch.is_whitespace() && !matches!(ch, '{' | '}' | '$' | ':' | '-' | '+' | '?')
}

fn push_literal(atoms: &mut Vec<Atom>, text: &str) {
    if text.is_empty() {
        return;
    }
    // Keep adjacent literal runs merged, e.g. around a rejected `${`.
    if let Some(Atom::Literal(previous)) = atoms.last_mut() {
        previous.push_str(text);
    } else {
        atoms.push(Atom::literal(text));
    }
}
