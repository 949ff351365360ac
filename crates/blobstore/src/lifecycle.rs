//! Guarantees the target bucket exists before any data operation runs.
//!
//! ```text
//! Unchecked → HeadChecked → Exists ─────────────────────────→ Ready
//!                         └→ Missing ─(development endpoint)→ Created → Ready
//!                                   └─(production)──────────→ Failed
//! ```
//!
//! Production buckets are never created automatically; a missing bucket there
//! is a misconfiguration and must surface as an error.

use tracing::{debug, info, warn};

use crate::config::BucketConfig;
use crate::error::StoreError;
use crate::session::BlobSession;

/// Where the bucket check currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    /// No check issued yet.
    Unchecked,
    /// Existence check issued.
    HeadChecked,
    /// The bucket answered the existence check.
    Exists,
    /// The existence check failed.
    Missing,
    /// A development bucket was created.
    Created,
    /// Data operations may run.
    Ready,
    /// The bucket is unusable.
    Failed,
}

/// Drives the bucket state machine against a [`BlobSession`].
#[derive(Debug)]
pub struct BucketLifecycleManager<'a, S: ?Sized> {
    session: &'a S,
    state: BucketState,
}

impl<'a, S: BlobSession + ?Sized> BucketLifecycleManager<'a, S> {
    /// A manager in the [`BucketState::Unchecked`] state.
    pub fn new(session: &'a S) -> Self {
        Self {
            session,
            state: BucketState::Unchecked,
        }
    }

    /// Current state.
    pub fn state(&self) -> BucketState {
        self.state
    }

    /// Make sure `config.name` exists, creating it only in development mode.
    ///
    /// Calling this again after reaching [`BucketState::Ready`] is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BucketNotFound`] if the existence check fails and
    /// no development endpoint is configured, or
    /// [`StoreError::BucketCreation`] if creating the development bucket fails.
    pub async fn ensure_bucket(&mut self, config: &BucketConfig) -> Result<(), StoreError> {
        if self.state == BucketState::Ready {
            return Ok(());
        }
        self.transition(BucketState::Unchecked);

        info!(bucket = %config.name, "checking that bucket exists");
        let head = self.session.head_bucket().await;
        self.transition(BucketState::HeadChecked);

        let head_err = match head {
            Ok(()) => {
                self.transition(BucketState::Exists);
                self.transition(BucketState::Ready);
                return Ok(());
            }
            Err(e) => e,
        };
        self.transition(BucketState::Missing);

        if !config.is_development() {
            self.transition(BucketState::Failed);
            warn!(bucket = %config.name, error = %head_err, "bucket is not reachable");
            return Err(StoreError::BucketNotFound {
                bucket: config.name.clone(),
                message: head_err.to_string(),
            });
        }

        info!(bucket = %config.name, "development endpoint and bucket missing; creating it");
        if let Err(e) = self.session.create_bucket().await {
            self.transition(BucketState::Failed);
            warn!(bucket = %config.name, error = %e, "creating bucket failed");
            return Err(StoreError::BucketCreation {
                bucket: config.name.clone(),
                message: e.to_string(),
            });
        }
        self.transition(BucketState::Created);
        info!(bucket = %config.name, "created bucket");

        self.transition(BucketState::Ready);
        Ok(())
    }

    fn transition(&mut self, next: BucketState) {
        debug!(from = ?self.state, to = ?next, "bucket state");
        self.state = next;
    }
}
