//! Local persistence: key-value slots and the collection cache built on them.

mod cache;
mod local;

pub use cache::{CacheKeys, CacheSnapshot, LocalCacheStore};
pub use local::{FileLocalStore, LocalPersistentStore, MemoryLocalStore};
