//! Error taxonomy of the encrypted object-store client.

use std::time::Duration;

use crypt::CipherError;
use thiserror::Error;

use crate::session::SessionError;

/// Errors returned by [`crate::ObjectStoreClient`] and
/// [`crate::BucketLifecycleManager`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The client was used before [`crate::ObjectStoreClient::initialize`].
    #[error("object store client is not initialized")]
    NotInitialized,

    /// [`crate::ObjectStoreClient::initialize`] was called twice.
    #[error("object store client is already initialized")]
    AlreadyInitialized,

    /// Encryption failed before anything was sent.
    #[error("encryption failed: {0}")]
    Encryption(#[source] CipherError),

    /// The downloaded object could not be decrypted. The cryptographic cause
    /// is deliberately not carried.
    #[error("decryption failed for object {key}")]
    Decryption {
        /// Object key.
        key: String,
    },

    /// The object does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// Object key.
        key: String,
    },

    /// Transport or store failure. Retrying is the caller's decision.
    #[error("{operation} failed: {message}")]
    Network {
        /// Store operation name.
        operation: &'static str,
        /// Error detail.
        message: String,
    },

    /// The bucket does not exist and may not be created.
    #[error("bucket {bucket} not found: {message}")]
    BucketNotFound {
        /// Bucket name.
        bucket: String,
        /// Detail from the failed existence check.
        message: String,
    },

    /// Development-mode bucket creation failed.
    #[error("failed to create bucket {bucket}: {message}")]
    BucketCreation {
        /// Bucket name.
        bucket: String,
        /// Detail from the failed create call.
        message: String,
    },

    /// The store reported more pages without a usable continuation token:
    /// none at all, or one already followed.
    #[error("listing of prefix {prefix:?} is truncated without a usable continuation token")]
    Pagination {
        /// Prefix being listed.
        prefix: String,
    },

    /// The object was still present when the deletion wait ran out.
    #[error("object {key} still exists after waiting {waited:?}")]
    DeleteUnconfirmed {
        /// Object key.
        key: String,
        /// How long the client waited.
        waited: Duration,
    },
}

impl StoreError {
    /// Returns `true` for failures a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Network { .. } | StoreError::DeleteUnconfirmed { .. }
        )
    }
}

impl From<SessionError> for StoreError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(key) => StoreError::NotFound { key },
            SessionError::Request { operation, message } => {
                StoreError::Network { operation, message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_map_to_store_errors() {
        let e: StoreError = SessionError::NotFound("a/b".into()).into();
        assert!(matches!(e, StoreError::NotFound { ref key } if key == "a/b"));

        let e: StoreError = SessionError::Request {
            operation: "GetObject",
            message: "timeout".into(),
        }
        .into();
        assert!(matches!(e, StoreError::Network { operation: "GetObject", .. }));
        assert!(e.to_string().contains("timeout"));
    }

    #[test]
    fn retryable_classification() {
        assert!(StoreError::Network {
            operation: "ListObjectsV2",
            message: "reset".into()
        }
        .is_retryable());
        assert!(StoreError::DeleteUnconfirmed {
            key: "k".into(),
            waited: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!StoreError::NotInitialized.is_retryable());
        assert!(!StoreError::Decryption { key: "k".into() }.is_retryable());
    }

    #[test]
    fn decryption_error_hides_cause() {
        let e = StoreError::Decryption { key: "doc".into() };
        assert_eq!(e.to_string(), "decryption failed for object doc");
        assert!(std::error::Error::source(&e).is_none());
    }
}
