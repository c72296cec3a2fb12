//! Normalization between raw remote values and [`Record`]s.

use serde_json::{Map, Value};

use crate::models::{Record, ID_FIELD, IS_DELETED_FIELD, UPDATED_AT_FIELD};
use crate::util::{iso_from_millis, normalize_text_option};

/// Stateless codec for the wire and cache representation of records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl RecordCodec {
    /// Normalize one raw remote child into a [`Record`].
    ///
    /// `key` is the child key in the remote store; it stands in for a missing
    /// `id`. Non-object payloads and payloads without any usable id are
    /// rejected with `None`.
    pub fn decode(key: &str, raw: Value) -> Option<Record> {
        let Value::Object(mut fields) = raw else {
            tracing::debug!(key, "Skipping non-object remote payload");
            return None;
        };

        let id = fields
            .remove(ID_FIELD)
            .and_then(|value| match value {
                Value::String(id) => normalize_text_option(Some(id)),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .or_else(|| normalize_text_option(Some(key.to_string())));
        let Some(id) = id else {
            tracing::debug!("Skipping remote payload without id");
            return None;
        };

        let updated_at = fields
            .remove(UPDATED_AT_FIELD)
            .map(normalize_timestamp)
            .unwrap_or_default();
        let is_deleted = fields
            .remove(IS_DELETED_FIELD)
            .is_some_and(|value| is_truthy(&value));

        Some(Record {
            id,
            updated_at,
            is_deleted,
            fields,
        })
    }

    /// Decode a whole `id -> value` map, dropping unusable entries.
    pub fn decode_map<I>(raw: I) -> Vec<Record>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        raw.into_iter()
            .filter_map(|(key, value)| Self::decode(&key, value))
            .collect()
    }

    /// The record delivered for a physical remote removal.
    pub fn tombstone(key: &str) -> Record {
        Record::tombstone(key, "")
    }

    /// Wire form of a record.
    pub fn encode(record: &Record) -> Value {
        let mut object = Map::with_capacity(record.fields.len() + 3);
        for (name, value) in &record.fields {
            object.insert(name.clone(), value.clone());
        }
        object.insert(ID_FIELD.to_string(), Value::String(record.id.clone()));
        object.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(record.updated_at.clone()),
        );
        object.insert(IS_DELETED_FIELD.to_string(), Value::Bool(record.is_deleted));
        Value::Object(object)
    }
}

fn normalize_timestamp(value: Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number
            .as_i64()
            .and_then(iso_from_millis)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().is_some_and(|n| n != 0),
        Value::String(text) => text.trim().eq_ignore_ascii_case("true") || text.trim() == "1",
        _ => false,
    }
}
