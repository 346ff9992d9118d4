//! Named to positional parameter rewriting.
//!
//! Repositories write `@Name` placeholders; tiberius binds `@P1..@Pn` in the
//! order values are passed. Quoted text, bracketed or double-quoted
//! identifiers, line comments and `@@` system functions are copied unchanged.

use crate::core::params::{ParameterMap, PARAMETER_MARKER};
use crate::core::value::SqlValue;
use crate::error::{DalError, Result};

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '#')
}

/// Rewrite `sql` for positional binding.
///
/// Returns the rewritten text and the values in `@P` order. A name used
/// several times binds once. Every placeholder must have a value in
/// `params`; unused entries in `params` are ignored.
pub fn bind_named(sql: &str, params: &ParameterMap) -> Result<(String, Vec<SqlValue<'static>>)> {
    let mut out = String::with_capacity(sql.len());
    let mut bound: Vec<(String, usize)> = Vec::new();
    let mut values = Vec::new();

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '[' => {
                let close = if c == '[' { ']' } else { c };
                out.push(c);
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == close {
                        // A doubled closing character is an escape.
                        if chars.peek() == Some(&close) {
                            out.push(close);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            PARAMETER_MARKER if chars.peek() == Some(&PARAMETER_MARKER) => {
                out.push(c);
                while let Some(&next) = chars.peek() {
                    if next != PARAMETER_MARKER && !is_name_char(next) {
                        break;
                    }
                    out.push(next);
                    chars.next();
                }
            }
            PARAMETER_MARKER if chars.peek().is_some_and(|&n| is_name_char(n)) => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if !is_name_char(next) {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }

                let key = name.to_lowercase();
                let index = match bound.iter().find(|(n, _)| *n == key) {
                    Some((_, index)) => *index,
                    None => {
                        let value = params.get(&name).ok_or_else(|| {
                            DalError::Mapping(format!("no value bound for parameter @{}", name))
                        })?;
                        values.push(value.clone());
                        bound.push((key, values.len()));
                        values.len()
                    }
                };
                out.push_str(&format!("@P{}", index));
            }
            other => out.push(other),
        }
    }

    Ok((out, values))
}
