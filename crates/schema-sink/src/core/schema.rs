//! Batch, schema and table metadata types.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{Result, SinkError};

use super::identifier::IdentifierConformer;
use super::sql_type::SqlType;

/// One record: property name to JSON value.
pub type Record = Map<String, Value>;

/// Kind of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Date,
    Time,
    DateTime,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// No recognized type was declared.
    Unknown,
}

/// Declared type of one schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub kind: FieldKind,
    /// Declared maximum length (strings only).
    pub max_length: Option<u32>,
}

/// Alternatives are tested in this order; the first match wins.
const TYPE_PRIORITY: [(&str, FieldKind); 6] = [
    ("string", FieldKind::String),
    ("integer", FieldKind::Integer),
    ("number", FieldKind::Number),
    ("boolean", FieldKind::Boolean),
    ("object", FieldKind::Object),
    ("array", FieldKind::Array),
];

impl FieldType {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            max_length: None,
        }
    }

    pub fn string(max_length: Option<u32>) -> Self {
        Self {
            kind: FieldKind::String,
            max_length,
        }
    }

    /// Resolve a JSON Schema property descriptor.
    ///
    /// `type` may be a string or a list, and alternatives may also be given
    /// through `anyOf`. `"null"` never matches.
    pub fn from_json_schema(descriptor: &Value) -> Self {
        let alternatives: Vec<&Value> = match descriptor.get("anyOf").and_then(Value::as_array) {
            Some(any_of) if !any_of.is_empty() => any_of.iter().collect(),
            _ => vec![descriptor],
        };

        for (name, kind) in TYPE_PRIORITY {
            let Some(alt) = alternatives.iter().find(|alt| declares_type(alt, name)) else {
                continue;
            };
            if kind != FieldKind::String {
                return Self::new(kind);
            }

            let format = alt
                .get("format")
                .or_else(|| descriptor.get("format"))
                .and_then(Value::as_str);
            let kind = match format {
                Some("date-time") => FieldKind::DateTime,
                Some("time") => FieldKind::Time,
                Some("date") => FieldKind::Date,
                _ => FieldKind::String,
            };
            let max_length = alt
                .get("maxLength")
                .or_else(|| descriptor.get("maxLength"))
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok());
            return Self { kind, max_length };
        }

        Self::new(FieldKind::Unknown)
    }
}

fn declares_type(descriptor: &Value, name: &str) -> bool {
    match descriptor.get("type") {
        Some(Value::String(t)) => t == name,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(name)),
        _ => false,
    }
}

/// Ordered property schema of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    properties: Vec<(String, FieldType)>,
}

impl Schema {
    pub fn new(properties: Vec<(String, FieldType)>) -> Self {
        Self { properties }
    }

    /// Build from a JSON Schema object with a `properties` map.
    pub fn from_json_schema(schema: &Value) -> Result<Self> {
        let properties = match schema.get("properties") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(props)) => props,
            Some(other) => {
                return Err(SinkError::Upstream(format!(
                    "schema 'properties' must be an object, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            properties: properties
                .iter()
                .map(|(name, descriptor)| (name.clone(), FieldType::from_json_schema(descriptor)))
                .collect(),
        })
    }

    pub fn properties(&self) -> &[(String, FieldType)] {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(n, _)| n.as_str())
    }
}

/// Records of one batch.
pub enum Records {
    /// A counted, in-memory sequence.
    Materialized(Vec<Record>),
    /// A one-shot stream whose length is not known up front.
    Streaming(Box<dyn Iterator<Item = Record> + Send>),
}

impl Records {
    pub fn is_countable(&self) -> bool {
        matches!(self, Records::Materialized(_))
    }
}

impl fmt::Debug for Records {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Records::Materialized(rows) => write!(f, "Materialized({} rows)", rows.len()),
            Records::Streaming(_) => write!(f, "Streaming(..)"),
        }
    }
}

impl From<Vec<Record>> for Records {
    fn from(rows: Vec<Record>) -> Self {
        Records::Materialized(rows)
    }
}

/// One schema-versioned group of records destined for one table.
#[derive(Debug)]
pub struct Batch {
    pub stream: String,
    pub schema: Schema,
    pub key_properties: Vec<String>,
    pub records: Records,
}

impl Batch {
    pub fn new(stream: impl Into<String>, schema: Schema, records: impl Into<Records>) -> Self {
        Self {
            stream: stream.into(),
            schema,
            key_properties: Vec::new(),
            records: records.into(),
        }
    }

    pub fn with_keys<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.key_properties = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_keyed(&self) -> bool {
        !self.key_properties.is_empty()
    }
}

/// Optionally schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    /// Derive the target table of a stream.
    ///
    /// `schema-table` stream ids carry their own schema; `default_schema`
    /// overrides it when set. Both parts are conformed.
    pub fn from_stream(
        stream: &str,
        default_schema: Option<&str>,
        conformer: &IdentifierConformer,
    ) -> Self {
        let (stream_schema, table) = match stream.split_once('-') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                (Some(schema), table)
            }
            _ => (None, stream),
        };

        let schema = default_schema
            .or(stream_schema)
            .map(|s| conformer.conform(s));
        Self {
            schema,
            name: conformer.conform(table),
        }
    }

    /// Sibling table in the same schema.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self {
            schema: self.schema.clone(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A column of a table to be created or evolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

/// A column as reported by the engine catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingColumn {
    pub name: String,
    pub sql_type: SqlType,
}

/// Table definition: name, ordered columns and primary-key subset.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    pub name: TableName,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Fails with a schema definition error when there are no columns.
    pub fn new(name: TableName, columns: Vec<ColumnDescriptor>) -> Result<Self> {
        if columns.is_empty() {
            return Err(SinkError::schema(
                name.to_string(),
                "schema declares no properties; no columns to create",
            ));
        }
        Ok(Self { name, columns })
    }

    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}
