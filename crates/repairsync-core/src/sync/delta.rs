//! One-shot range reads of records changed since a sync point.

use std::sync::Arc;

use crate::codec::RecordCodec;
use crate::models::{Record, UPDATED_AT_FIELD};
use crate::remote::{RemoteError, RemoteStore};

/// Reads changed records for one remote path.
#[derive(Clone)]
pub struct DeltaLoader {
    remote: Arc<dyn RemoteStore>,
    path: String,
}

impl DeltaLoader {
    pub fn new(remote: Arc<dyn RemoteStore>, path: impl Into<String>) -> Self {
        Self {
            remote,
            path: path.into(),
        }
    }

    /// All records with `updatedAt >= resume_inclusive`, tombstones included.
    ///
    /// An empty resume point turns this into a full unbounded load.
    pub async fn load_delta(&self, resume_inclusive: &str) -> Result<Vec<Record>, RemoteError> {
        let resume_inclusive = resume_inclusive.trim();
        let raw = if resume_inclusive.is_empty() {
            tracing::debug!(path = %self.path, "Full load");
            self.remote.read_once(&self.path).await?
        } else {
            tracing::debug!(path = %self.path, resume_point = resume_inclusive, "Delta load");
            self.remote
                .read_range(&self.path, UPDATED_AT_FIELD, resume_inclusive)
                .await?
        };
        Ok(RecordCodec::decode_map(raw))
    }
}
