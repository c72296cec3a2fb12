//! Record model

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::iso_now;

/// Reserved field holding the record id.
pub const ID_FIELD: &str = "id";
/// Reserved field holding the ISO-8601 modification timestamp.
pub const UPDATED_AT_FIELD: &str = "updatedAt";
/// Reserved soft-deletion marker.
pub const IS_DELETED_FIELD: &str = "isDeleted";

/// A domain entity, opaque to the engine apart from its reserved fields.
///
/// Everything that is not `id`, `updatedAt`, or `isDeleted` is carried in
/// `fields` and round-trips unchanged through the cache and the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable unique identifier
    pub id: String,
    /// Last update timestamp (ISO-8601)
    #[serde(default)]
    pub updated_at: String,
    /// Soft delete flag for sync
    #[serde(default)]
    pub is_deleted: bool,
    /// Domain fields owned by the calling feature
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a live record stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            updated_at: iso_now(),
            is_deleted: false,
            fields,
        }
    }

    /// Create a tombstone for `id`.
    #[must_use]
    pub fn tombstone(id: impl Into<String>, updated_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updated_at: updated_at.into(),
            is_deleted: true,
            fields: Map::new(),
        }
    }

    /// Borrow a domain field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Borrow a domain field as a non-empty string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Deserialize the full record (reserved fields included) into a typed model.
    pub fn to_typed<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::to_value(self).and_then(serde_json::from_value)
    }
}
