//! Identifier conformance, validation and quoting.
//!
//! Property and stream names arrive from upstream as arbitrary strings. Before
//! any of them reaches a DDL or DML statement it passes through two stages:
//!
//! 1. **Conformance** ([`IdentifierConformer::conform`]) rewrites the name into
//!    a portable snake_case identifier that never starts with `_` or a digit.
//! 2. **Quoting** ([`quote_pg`], [`quote_mysql`]) validates the identifier and
//!    wraps it in the engine's delimiters, doubling any embedded delimiter.
//!
//! SQL identifiers cannot be bound as statement parameters, so quoting is the
//! only barrier between a hostile property name and the generated SQL.

use std::collections::HashMap;

use crate::error::{Result, SinkError};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Prefix for conformed names that would otherwise start with a digit.
const DIGIT_PREFIX: char = 'n';

/// Prefix for conformed names that are empty or made only of underscores.
const EMPTY_PREFIX: char = 'x';

/// Normalizes source names into target identifiers.
///
/// Pure and deterministic: the output depends only on the input and the
/// case-folding flag, and `conform(conform(x)) == conform(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierConformer {
    lower_case: bool,
}

impl Default for IdentifierConformer {
    fn default() -> Self {
        Self { lower_case: true }
    }
}

impl IdentifierConformer {
    pub fn new(lower_case: bool) -> Self {
        Self { lower_case }
    }

    pub fn lower_case(&self) -> bool {
        self.lower_case
    }

    /// Conform a single name.
    pub fn conform(&self, name: &str) -> String {
        let replaced = replace_invalid_runs(name);
        let relocated = relocate_leading_underscores(&replaced);
        let snake = split_camel_case(&relocated);
        let folded = if self.lower_case {
            snake.to_ascii_lowercase()
        } else {
            snake
        };

        if folded.chars().all(|c| c == '_') {
            return format!("{}{}", EMPTY_PREFIX, folded);
        }
        if folded.starts_with(|c: char| c.is_ascii_digit()) {
            return format!("{}{}", DIGIT_PREFIX, folded);
        }
        folded
    }

    /// Conform every name of one schema, failing when two distinct source
    /// names land on the same identifier.
    ///
    /// The result is aligned with the input order.
    pub fn conform_properties<'a, I>(&self, names: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen: HashMap<String, &'a str> = HashMap::new();
        let mut out = Vec::new();

        for name in names {
            let conformed = self.conform(name);
            if let Some(first) = seen.get(&conformed) {
                if *first != name {
                    return Err(SinkError::IdentifierCollision {
                        first: first.to_string(),
                        second: name.to_string(),
                        conformed,
                    });
                }
            } else {
                seen.insert(conformed.clone(), name);
            }
            out.push(conformed);
        }

        Ok(out)
    }
}

/// Replace each run of characters outside `[A-Za-z0-9_]` with one `_`.
fn replace_invalid_runs(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

fn relocate_leading_underscores(name: &str) -> String {
    let body = name.trim_start_matches('_');
    let leading = name.len() - body.len();
    let mut out = String::with_capacity(name.len());
    out.push_str(body);
    out.extend(std::iter::repeat('_').take(leading));
    out
}

/// Insert `_` at camelCase boundaries: before an uppercase letter that follows
/// a lowercase letter or digit, or that ends an uppercase run and is followed
/// by a lowercase letter. Never doubles an existing underscore.
fn split_camel_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let after_lower = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let ends_run =
                prev.is_ascii_uppercase() && next.map_or(false, |n| n.is_ascii_lowercase());
            if prev != '_' && (after_lower || ends_run) {
                out.push('_');
            }
        }
        out.push(c);
    }
    out
}

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SinkError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(SinkError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SinkError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier, doubling embedded backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}
