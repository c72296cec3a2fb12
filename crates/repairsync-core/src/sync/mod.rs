//! Resumable sync: watermark tracking, delta reads, the realtime stream and
//! debounced cache flushing.

mod delta;
mod realtime;
mod scheduler;
mod sync_point;

pub use delta::DeltaLoader;
pub use realtime::RealtimeSubscriber;
pub use scheduler::{PersistenceScheduler, DEFAULT_MIN_SAVE_DELAY};
pub use sync_point::{compare_timestamps, SyncPointTracker, DEFAULT_RESUME_EPSILON};
