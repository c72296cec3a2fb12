//! Live records for one collection kind plus lazily derived lookup maps.

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::models::{ChangeAction, Record};
use crate::sync::compare_timestamps;

/// Creation timestamp written by local mutations, used as a tie-breaker.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A mutation the index actually committed.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub action: ChangeAction,
    /// The entry now live (added/updated) or the entry that was removed.
    pub record: Record,
    /// The entry that was replaced or removed, with its position.
    pub previous: Option<(usize, Record)>,
}

/// Count plus newest entry for one foreign-key value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSummary {
    pub count: usize,
    pub latest: Option<Record>,
}

/// The authoritative list of live records, newest first.
///
/// Every mutation bumps `revision`. Derived maps and the read-only snapshot
/// are rebuilt from scratch the first time they are needed at a new revision.
#[derive(Debug, Default)]
pub struct CollectionIndex {
    records: Vec<Record>,
    revision: u64,
    index_fields: Vec<String>,
    derived: OnceCell<Derived>,
    snapshot: OnceCell<Arc<[Record]>>,
}

#[derive(Debug, Default)]
struct Derived {
    by_id: HashMap<String, usize>,
    by_field: HashMap<String, HashMap<String, Vec<usize>>>,
    latest: HashMap<String, HashMap<String, usize>>,
}

impl CollectionIndex {
    pub fn new(index_fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            index_fields: index_fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The single mutation entry point.
    ///
    /// Tombstones remove the entry with the same id; live records replace an
    /// existing entry in place or are inserted at the front. Returns `None`
    /// when nothing changed: a tombstone for an unknown id, a record identical
    /// to the live entry, or a record older than the live entry.
    pub fn upsert(&mut self, incoming: Record) -> Option<AppliedChange> {
        let position = self.position(&incoming.id);

        if let Some(position) = position {
            let existing = &self.records[position];
            if is_older(&incoming, existing) {
                tracing::debug!(
                    id = %incoming.id,
                    incoming = %incoming.updated_at,
                    current = %existing.updated_at,
                    "Ignoring stale record"
                );
                return None;
            }
        }

        if incoming.is_deleted {
            let position = position?;
            let removed = self.records.remove(position);
            self.bump();
            return Some(AppliedChange {
                action: ChangeAction::Removed,
                record: removed.clone(),
                previous: Some((position, removed)),
            });
        }

        match position {
            None => {
                self.records.insert(0, incoming.clone());
                self.bump();
                Some(AppliedChange {
                    action: ChangeAction::Added,
                    record: incoming,
                    previous: None,
                })
            }
            Some(position) if self.records[position] == incoming => None,
            Some(position) => {
                let previous = std::mem::replace(&mut self.records[position], incoming.clone());
                self.bump();
                Some(AppliedChange {
                    action: ChangeAction::Updated,
                    record: incoming,
                    previous: Some((position, previous)),
                })
            }
        }
    }

    /// Put back the pre-mutation state of `id` without the staleness check.
    ///
    /// `previous` is what [`AppliedChange::previous`] reported; `None` means
    /// the entry did not exist before and is removed.
    pub fn restore(&mut self, id: &str, previous: Option<(usize, Record)>) -> Option<AppliedChange> {
        let current = self.position(id);
        let change = match (current, previous) {
            (None, None) => return None,
            (Some(position), None) => {
                let removed = self.records.remove(position);
                AppliedChange {
                    action: ChangeAction::Removed,
                    record: removed.clone(),
                    previous: Some((position, removed)),
                }
            }
            (Some(position), Some((_, record))) => {
                let replaced = std::mem::replace(&mut self.records[position], record.clone());
                AppliedChange {
                    action: ChangeAction::Updated,
                    record,
                    previous: Some((position, replaced)),
                }
            }
            (None, Some((position, record))) => {
                self.records
                    .insert(position.min(self.records.len()), record.clone());
                AppliedChange {
                    action: ChangeAction::Added,
                    record,
                    previous: None,
                }
            }
        };
        self.bump();
        Some(change)
    }

    /// Make the live set equal to `records`.
    ///
    /// Entries missing from `records` are removed; the rest go through
    /// [`upsert`](Self::upsert) back to front so new entries keep the input
    /// order.
    pub fn replace_all(&mut self, records: Vec<Record>) -> Vec<AppliedChange> {
        let incoming: HashSet<&str> = records
            .iter()
            .filter(|record| !record.is_deleted)
            .map(|record| record.id.as_str())
            .collect();
        let missing: Vec<String> = self
            .records
            .iter()
            .filter(|record| !incoming.contains(record.id.as_str()))
            .map(|record| record.id.clone())
            .collect();

        let mut changes = Vec::with_capacity(records.len() + missing.len());
        for id in missing {
            changes.extend(self.upsert(Record::tombstone(id, "")));
        }
        for record in records.into_iter().rev() {
            changes.extend(self.upsert(record));
        }
        changes
    }

    /// Drop everything. Returns how many entries were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        self.bump();
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.derived()
            .by_id
            .get(id)
            .and_then(|position| self.records.get(*position))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.derived().by_id.contains_key(id)
    }

    /// Read-only snapshot, shared until the next mutation.
    pub fn get_all(&self) -> Arc<[Record]> {
        self.snapshot
            .get_or_init(|| Arc::from(self.records.as_slice()))
            .clone()
    }

    /// Entries whose `field` equals `value`, in collection order.
    pub fn by_field(&self, field: &str, value: &str) -> Vec<Record> {
        let value = value.trim();
        if value.is_empty() {
            return Vec::new();
        }
        if let Some(groups) = self.derived().by_field.get(field) {
            return groups
                .get(value)
                .map(|positions| {
                    positions
                        .iter()
                        .map(|position| self.records[*position].clone())
                        .collect()
                })
                .unwrap_or_default();
        }
        self.records
            .iter()
            .filter(|record| field_key(record, field).as_deref() == Some(value))
            .cloned()
            .collect()
    }

    /// Newest entry (by `updatedAt`, falling back to `createdAt`) whose
    /// `field` equals `value`.
    pub fn latest_by_field(&self, field: &str, value: &str) -> Option<Record> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if let Some(latest) = self.derived().latest.get(field) {
            return latest
                .get(value)
                .map(|position| self.records[*position].clone());
        }
        latest_of(
            self.records
                .iter()
                .filter(|record| field_key(record, field).as_deref() == Some(value)),
        )
        .cloned()
    }

    pub fn summary_by_field(&self, field: &str, value: &str) -> FieldSummary {
        FieldSummary {
            count: self.by_field(field, value).len(),
            latest: self.latest_by_field(field, value),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub fn index_fields(&self) -> &[String] {
        &self.index_fields
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.derived = OnceCell::new();
        self.snapshot = OnceCell::new();
    }

    fn derived(&self) -> &Derived {
        self.derived.get_or_init(|| self.rebuild())
    }

    fn rebuild(&self) -> Derived {
        let mut derived = Derived {
            by_id: HashMap::with_capacity(self.records.len()),
            ..Derived::default()
        };
        for field in &self.index_fields {
            derived.by_field.insert(field.clone(), HashMap::new());
            derived.latest.insert(field.clone(), HashMap::new());
        }

        for (position, record) in self.records.iter().enumerate() {
            derived.by_id.insert(record.id.clone(), position);
            for field in &self.index_fields {
                let Some(key) = field_key(record, field) else {
                    continue;
                };
                if let Some(groups) = derived.by_field.get_mut(field) {
                    groups.entry(key.clone()).or_default().push(position);
                }
                if let Some(latest) = derived.latest.get_mut(field) {
                    let newer = latest.get(&key).map_or(true, |current| {
                        recency(record, &self.records[*current]) == Ordering::Greater
                    });
                    if newer {
                        latest.insert(key, position);
                    }
                }
            }
        }
        tracing::trace!(revision = self.revision, "Rebuilt collection index");
        derived
    }
}

/// A record only loses to the live entry when both carry timestamps and
/// the incoming one is strictly older.
fn is_older(incoming: &Record, existing: &Record) -> bool {
    let incoming_at = incoming.updated_at.trim();
    let existing_at = existing.updated_at.trim();
    !incoming_at.is_empty()
        && !existing_at.is_empty()
        && compare_timestamps(incoming_at, existing_at) == Ordering::Less
}

fn field_key(record: &Record, field: &str) -> Option<String> {
    match record.field(field)? {
        Value::String(value) => {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn recency_key(record: &Record) -> &str {
    let updated_at = record.updated_at.trim();
    if updated_at.is_empty() {
        record.field_str(CREATED_AT_FIELD).unwrap_or_default()
    } else {
        updated_at
    }
}

fn recency(left: &Record, right: &Record) -> Ordering {
    compare_timestamps(recency_key(left), recency_key(right))
}

/// First entry wins ties.
fn latest_of<'a>(records: impl Iterator<Item = &'a Record>) -> Option<&'a Record> {
    records.fold(None, |best, record| match best {
        Some(current) if recency(record, current) != Ordering::Greater => Some(current),
        _ => Some(record),
    })
}
