//! repairsync-core - Core library for repairsync
//!
//! This crate keeps in-memory record collections consistent with a remote
//! realtime store: cache-first cold loads, delta reads from a bookmarked
//! `updatedAt` watermark, a realtime stream anchored at the same point, and
//! debounced write-back to a local persistent cache.

pub mod codec;
pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod registry;
pub mod remote;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use codec::RecordCodec;
pub use collection::{CollectionIndex, FieldSummary};
pub use config::{EngineConfig, SyncSettings};
pub use engine::{LoadOutcome, SyncEngine};
pub use error::{Error, Result};
pub use models::{ChangeAction, ChangeEvent, ChangeSource, DataChanged, Record, SyncMeta};
pub use notify::{ChangeNotifier, EventBus, ListenerId};
pub use registry::EngineRegistry;
pub use remote::{MemoryRemoteStore, RemoteError, RemoteEvent, RemoteStore};
pub use state::{LifecycleSignal, SyncState};
pub use storage::{FileLocalStore, LocalCacheStore, LocalPersistentStore, MemoryLocalStore};
