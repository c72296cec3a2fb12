//! Data models for repairsync

mod change;
mod record;
mod sync_meta;

pub use change::{ChangeAction, ChangeEvent, ChangeSource, DataChanged};
pub use record::{Record, ID_FIELD, IS_DELETED_FIELD, UPDATED_AT_FIELD};
pub use sync_meta::SyncMeta;
