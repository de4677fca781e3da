//! Concrete column types.
//!
//! [`SqlType`] is engine-neutral. Each [`Dialect`](super::traits::Dialect)
//! renders it with its own DDL spelling and parses catalog metadata back into
//! it; the [`Display`](std::fmt::Display) form is the canonical rendering used
//! to compare types.

use std::fmt;

/// Highest precision accepted for fixed-point numerics on every supported engine.
pub const MAX_NUMERIC_PRECISION: u32 = 65;

/// A 64-bit integer expressed as fixed-point (precision, scale).
pub const INTEGER_AS_NUMERIC: (u32, u32) = (19, 0);

/// A concrete column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// Variable-length text. `None` is unbounded.
    Text { length: Option<u32> },
    /// 64-bit integer.
    Integer,
    /// Fixed-point numeric.
    Numeric { precision: u32, scale: u32 },
    /// Double-precision floating point.
    Float,
    /// Native boolean.
    Boolean,
    Date,
    Time,
    /// Timestamp without time zone.
    Timestamp,
    /// A type this crate does not model, kept by name so it can be compared.
    Other(String),
}

/// Generic class of a type, ignoring size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Text,
    Numeric,
    Boolean,
    DateTime,
    Time,
    Other,
}

impl SqlType {
    /// Build a text type, treating a zero length as unbounded.
    pub fn text(length: Option<u32>) -> Self {
        SqlType::Text {
            length: length.filter(|&l| l > 0),
        }
    }

    pub fn numeric(precision: u32, scale: u32) -> Self {
        SqlType::Numeric { precision, scale }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            SqlType::Text { .. } => TypeFamily::Text,
            SqlType::Integer | SqlType::Numeric { .. } | SqlType::Float => TypeFamily::Numeric,
            SqlType::Boolean => TypeFamily::Boolean,
            SqlType::Date | SqlType::Timestamp => TypeFamily::DateTime,
            SqlType::Time => TypeFamily::Time,
            SqlType::Other(_) => TypeFamily::Other,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SqlType::Text { .. })
    }

    /// Declared text length, if any.
    pub fn length(&self) -> Option<u32> {
        match self {
            SqlType::Text { length } => *length,
            _ => None,
        }
    }

    /// Whether two types render identically.
    pub fn renders_as(&self, other: &SqlType) -> bool {
        self.to_string() == other.to_string()
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Text { length: Some(n) } => write!(f, "VARCHAR({})", n),
            SqlType::Text { length: None } => write!(f, "TEXT"),
            SqlType::Integer => write!(f, "BIGINT"),
            SqlType::Numeric { precision, scale } => write!(f, "NUMERIC({},{})", precision, scale),
            SqlType::Float => write!(f, "DOUBLE PRECISION"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::Time => write!(f, "TIME"),
            SqlType::Timestamp => write!(f, "TIMESTAMP"),
            SqlType::Other(name) => write!(f, "{}", name.to_uppercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_text_is_unbounded() {
        assert_eq!(SqlType::text(Some(0)), SqlType::Text { length: None });
        assert_eq!(SqlType::text(Some(0)).to_string(), "TEXT");
        assert_eq!(SqlType::text(Some(50)).to_string(), "VARCHAR(50)");
    }

    #[test]
    fn test_families() {
        assert_eq!(SqlType::Integer.family(), TypeFamily::Numeric);
        assert_eq!(SqlType::numeric(38, 16).family(), TypeFamily::Numeric);
        assert_eq!(SqlType::Date.family(), SqlType::Timestamp.family());
        assert_ne!(SqlType::Time.family(), SqlType::Timestamp.family());
    }

    #[test]
    fn test_other_renders_case_insensitively() {
        assert!(SqlType::Other("jsonb".into()).renders_as(&SqlType::Other("JSONB".into())));
    }
}
