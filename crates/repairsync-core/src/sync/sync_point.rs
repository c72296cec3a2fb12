//! High-water mark bookkeeping for resumable sync.

use std::cmp::Ordering;
use std::time::Duration;

use crate::models::{Record, SyncMeta};
use crate::util::{iso_minus, parse_iso};

/// Default backward shift applied to a resume point before querying.
pub const DEFAULT_RESUME_EPSILON: Duration = Duration::from_secs(2);

/// Tracks the `updatedAt` watermark a collection resumes from.
///
/// The watermark only ever moves forward and only to values produced by
/// scanning records that were actually applied.
#[derive(Debug, Clone)]
pub struct SyncPointTracker {
    epsilon: Duration,
    high_water: String,
}

impl Default for SyncPointTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RESUME_EPSILON)
    }
}

impl SyncPointTracker {
    pub const fn new(epsilon: Duration) -> Self {
        Self {
            epsilon,
            high_water: String::new(),
        }
    }

    /// Maximum `updatedAt` among live records, empty when there is none.
    pub fn compute_max_updated_at<'a, I>(records: I) -> String
    where
        I: IntoIterator<Item = &'a Record>,
    {
        records
            .into_iter()
            .filter(|record| !record.is_deleted)
            .map(|record| record.updated_at.trim())
            .filter(|updated_at| !updated_at.is_empty())
            .max_by(|left, right| compare_timestamps(left, right))
            .unwrap_or_default()
            .to_string()
    }

    /// Resolve where to resume: stored metadata first, then a scan of `local`.
    pub fn resume_point(meta: Option<&SyncMeta>, local: &[Record]) -> String {
        meta.and_then(SyncMeta::resume_point)
            .map_or_else(|| Self::compute_max_updated_at(local), str::to_string)
    }

    /// Shift `resume` back by the epsilon to absorb clock skew and equal
    /// timestamps at the boundary. Unparseable values are returned unchanged.
    pub fn shifted(&self, resume: &str) -> String {
        let resume = resume.trim();
        if resume.is_empty() {
            return String::new();
        }
        iso_minus(resume, self.epsilon).unwrap_or_else(|| resume.to_string())
    }

    /// Move the watermark up to `candidate` if it is newer; returns the
    /// watermark after the update.
    pub fn advance(&mut self, candidate: &str) -> &str {
        let candidate = candidate.trim();
        if !candidate.is_empty()
            && (self.high_water.is_empty()
                || compare_timestamps(candidate, &self.high_water) == Ordering::Greater)
        {
            self.high_water = candidate.to_string();
        }
        &self.high_water
    }

    pub fn high_water(&self) -> &str {
        &self.high_water
    }

    pub const fn epsilon(&self) -> Duration {
        self.epsilon
    }

    pub fn reset(&mut self) {
        self.high_water.clear();
    }
}

/// Order two `updatedAt` values, by instant when both parse and lexically
/// otherwise.
pub fn compare_timestamps(left: &str, right: &str) -> Ordering {
    match (parse_iso(left), parse_iso(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}
