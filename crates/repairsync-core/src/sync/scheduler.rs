//! Debounced cache flushing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Lower bound applied to every requested debounce delay.
pub const DEFAULT_MIN_SAVE_DELAY: Duration = Duration::from_millis(250);

type FlushFn = Box<dyn Fn() + Send + Sync>;

/// Coalesces bursts of mutations into a single flush.
///
/// At most one timer is pending at a time; each `schedule_save` restarts it.
/// `flush_now` runs the flush immediately if anything is dirty.
pub struct PersistenceScheduler {
    state: Mutex<SchedulerState>,
    flush: FlushFn,
    min_delay: Duration,
}

#[derive(Default)]
struct SchedulerState {
    timer: Option<JoinHandle<()>>,
    dirty: bool,
    generation: u64,
}

impl PersistenceScheduler {
    pub fn new<F>(min_delay: Duration, flush: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            state: Mutex::default(),
            flush: Box::new(flush),
            min_delay,
        })
    }

    /// Mark dirty and (re)start the debounce timer.
    ///
    /// Outside a Tokio runtime there is nothing to run a timer on, so the
    /// flush happens inline.
    pub fn schedule_save(self: &Arc<Self>, delay: Duration) {
        let delay = delay.max(self.min_delay);
        let mut state = self.lock();
        state.dirty = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;

        let Ok(runtime) = Handle::try_current() else {
            drop(state);
            self.flush_now();
            return;
        };
        let scheduler: Weak<Self> = Arc::downgrade(self);
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.fire(generation);
            }
        }));
    }

    /// Cancel any pending timer and flush right away if dirty.
    ///
    /// Returns whether a flush ran.
    pub fn flush_now(&self) -> bool {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
        self.flush_if_dirty()
    }

    /// Drop any pending save without flushing.
    pub fn cancel(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.dirty = false;
    }

    /// Whether a save is owed.
    pub fn is_pending(&self) -> bool {
        self.lock().dirty
    }

    fn fire(&self, generation: u64) {
        {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.timer = None;
        }
        self.flush_if_dirty();
    }

    fn flush_if_dirty(&self) -> bool {
        {
            let mut state = self.lock();
            if !state.dirty {
                return false;
            }
            state.dirty = false;
        }
        (self.flush)();
        true
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
