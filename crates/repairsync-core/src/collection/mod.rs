//! The in-memory collection and its derived lookups.

mod index;

pub use index::{AppliedChange, CollectionIndex, FieldSummary, CREATED_AT_FIELD};
