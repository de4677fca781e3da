//! Batch sources.
//!
//! [`JsonBatchSource`] reads batches from JSON text. The input is a sequence
//! of JSON values separated by whitespace (a single document, a JSON array,
//! or one batch per line all work). Each batch is an object:
//!
//! ```json
//! {
//!   "stream": "crm-contacts",
//!   "schema": {"properties": {"id": {"type": "integer"}}},
//!   "key_properties": ["id"],
//!   "records": [{"id": 1}]
//! }
//! ```

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::{Batch, BatchSource, Record, Schema};
use crate::error::{Result, SinkError};

/// Batches parsed from JSON text, handed out in input order.
///
/// The text is split into batch documents up front; each document is
/// validated when it is taken, so a malformed batch fails only once the
/// batches before it have been loaded.
#[derive(Debug, Default)]
pub struct JsonBatchSource {
    pending: VecDeque<Value>,
}

impl JsonBatchSource {
    pub fn from_json(text: &str) -> Result<Self> {
        let mut pending = VecDeque::new();
        for value in serde_json::Deserializer::from_str(text).into_iter::<Value>() {
            match value.map_err(|e| SinkError::Upstream(format!("malformed batch input: {}", e)))? {
                Value::Array(items) => pending.extend(items),
                other => pending.push_back(other),
            }
        }
        debug!("Read {} batch documents", pending.len());
        Ok(Self { pending })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Batches not yet taken.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl BatchSource for JsonBatchSource {
    async fn next_batch(&mut self) -> Result<Option<Batch>> {
        self.pending.pop_front().map(parse_batch).transpose()
    }
}

fn parse_batch(document: Value) -> Result<Batch> {
    let mut fields = match document {
        Value::Object(fields) => fields,
        other => {
            return Err(SinkError::Upstream(format!(
                "batch must be a JSON object, got {}",
                kind_of(&other)
            )))
        }
    };

    let stream = match fields.remove("stream") {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => {
            return Err(SinkError::Upstream(
                "batch is missing a non-empty 'stream' string".into(),
            ))
        }
    };

    let schema = match fields.get("schema") {
        Some(schema @ Value::Object(_)) => Schema::from_json_schema(schema)?,
        None | Some(Value::Null) => Schema::default(),
        Some(other) => {
            return Err(SinkError::Upstream(format!(
                "batch '{}': 'schema' must be an object, got {}",
                stream,
                kind_of(other)
            )))
        }
    };

    let key_properties = match fields.remove("key_properties") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(keys)) => keys
            .into_iter()
            .map(|k| match k {
                Value::String(s) => Ok(s),
                other => Err(SinkError::Upstream(format!(
                    "batch '{}': key properties must be strings, got {}",
                    stream,
                    kind_of(&other)
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(SinkError::Upstream(format!(
                "batch '{}': 'key_properties' must be an array, got {}",
                stream,
                kind_of(&other)
            )))
        }
    };

    let records = match fields.remove("records") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(rows)) => rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| match row {
                Value::Object(record) => Ok(record),
                other => Err(SinkError::Upstream(format!(
                    "batch '{}': record {} must be an object, got {}",
                    stream,
                    i,
                    kind_of(&other)
                ))),
            })
            .collect::<Result<Vec<Record>>>()?,
        Some(other) => {
            return Err(SinkError::Upstream(format!(
                "batch '{}': 'records' must be an array, got {}",
                stream,
                kind_of(&other)
            )))
        }
    };

    Ok(Batch::new(stream, schema, records).with_keys(key_properties))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FieldKind;

    #[tokio::test]
    async fn test_reads_array_of_batches() {
        let mut source = JsonBatchSource::from_json(
            r#"[
                {"stream": "users", "schema": {"properties": {"id": {"type": "integer"}}},
                 "key_properties": ["id"], "records": [{"id": 1}, {"id": 2}]},
                {"stream": "events", "schema": {"properties": {"at": {"type": "string", "format": "date-time"}}},
                 "records": []}
            ]"#,
        )
        .unwrap();
        assert_eq!(source.remaining(), 2);

        let users = source.next_batch().await.unwrap().unwrap();
        assert_eq!(users.stream, "users");
        assert_eq!(users.key_properties, vec!["id".to_string()]);
        assert!(matches!(users.records, crate::core::Records::Materialized(ref r) if r.len() == 2));

        let events = source.next_batch().await.unwrap().unwrap();
        assert_eq!(events.schema.get("at").unwrap().kind, FieldKind::DateTime);
        assert!(!events.is_keyed());

        assert!(source.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_one_batch_per_line() {
        let text = "{\"stream\": \"a\", \"records\": [{}]}\n{\"stream\": \"b\"}\n";
        let mut source = JsonBatchSource::from_json(text).unwrap();
        assert_eq!(source.next_batch().await.unwrap().unwrap().stream, "a");
        assert_eq!(source.next_batch().await.unwrap().unwrap().stream, "b");
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batches.json");
        std::fs::write(&path, r#"{"stream": "s", "records": [{"a": 1}]}"#).unwrap();

        let mut source = JsonBatchSource::from_path(&path).unwrap();
        assert_eq!(source.next_batch().await.unwrap().unwrap().stream, "s");
        assert!(matches!(
            JsonBatchSource::from_path(dir.path().join("missing.json")),
            Err(SinkError::Io(_))
        ));
    }

    #[test]
    fn test_syntax_error_is_upstream() {
        let err = JsonBatchSource::from_json("{\"stream\": ").unwrap_err();
        assert!(matches!(err, SinkError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_malformed_batch_fails_when_taken() {
        let mut source =
            JsonBatchSource::from_json(r#"[{"stream": "ok"}, {"records": []}]"#).unwrap();
        assert!(source.next_batch().await.unwrap().is_some());
        let err = source.next_batch().await.unwrap_err();
        assert!(matches!(err, SinkError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_non_object_record_rejected() {
        let mut source =
            JsonBatchSource::from_json(r#"{"stream": "s", "records": [1]}"#).unwrap();
        assert!(matches!(
            source.next_batch().await,
            Err(SinkError::Upstream(_))
        ));
    }
}
