//! Mapping of declared field types to concrete column types.

pub mod merge;

pub use merge::{merge_pair, merge_types};

use crate::core::{FieldKind, FieldType, SqlType};

/// Default length for text columns without a declared maximum.
pub const DEFAULT_TEXT_LENGTH: u32 = 2000;

/// Default fixed-point precision and scale for `number` properties.
pub const DEFAULT_NUMERIC: (u32, u32) = (38, 16);

/// Options that vary by target engine and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMapOptions {
    /// Store booleans natively instead of as one-character text.
    pub native_boolean: bool,
    /// Map `number` to double precision instead of fixed-point.
    pub prefer_float: bool,
    /// Length for text columns with no declared maximum.
    pub default_text_length: u32,
}

impl Default for TypeMapOptions {
    fn default() -> Self {
        Self {
            native_boolean: false,
            prefer_float: false,
            default_text_length: DEFAULT_TEXT_LENGTH,
        }
    }
}

/// Maps one declared field type to a column type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaTypeMapper {
    options: TypeMapOptions,
}

impl SchemaTypeMapper {
    pub fn new(options: TypeMapOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TypeMapOptions {
        &self.options
    }

    pub fn map(&self, field: &FieldType) -> SqlType {
        let fallback = SqlType::text(Some(self.options.default_text_length));
        match field.kind {
            FieldKind::DateTime => SqlType::Timestamp,
            FieldKind::Time => SqlType::Time,
            FieldKind::Date => SqlType::Date,
            FieldKind::String => match field.max_length {
                Some(n) if n > 0 => SqlType::text(Some(n)),
                _ => fallback,
            },
            FieldKind::Integer => SqlType::Integer,
            FieldKind::Number if self.options.prefer_float => SqlType::Float,
            FieldKind::Number => SqlType::numeric(DEFAULT_NUMERIC.0, DEFAULT_NUMERIC.1),
            FieldKind::Boolean if self.options.native_boolean => SqlType::Boolean,
            FieldKind::Boolean => SqlType::text(Some(1)),
            // Serialized as JSON text.
            FieldKind::Object | FieldKind::Array | FieldKind::Unknown => fallback,
        }
    }
}
