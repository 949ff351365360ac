//! The bucket-scoped blob-store interface consumed by the client.
//!
//! [`BlobSession`] is the seam between the encryption/listing logic and the
//! transport. Production uses [`crate::aws::S3Session`]; tests swap in fakes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by a [`BlobSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The request failed in transport or was rejected by the store.
    #[error("{operation} failed: {message}")]
    Request {
        /// Store operation name, e.g. `"PutObject"`.
        operation: &'static str,
        /// Error detail from the SDK.
        message: String,
    },
}

/// Listing entry: object key plus its last-modified time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object key, unique within the bucket.
    pub key: String,
    /// Last-modified timestamp reported by the store, if any.
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectMetadata {
    /// Convenience constructor.
    pub fn new(key: impl Into<String>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page, in store order.
    pub objects: Vec<ObjectMetadata>,
    /// Continuation token for the next page.
    pub next_token: Option<String>,
    /// Whether more pages follow.
    pub truncated: bool,
}

/// Bucket-scoped blob store.
///
/// Every method is one network round trip. Callers bound them with
/// `tokio::time::timeout` or cancel by dropping the future; implementations do
/// not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobSession: Send + Sync {
    /// Store `body` under `key`, optionally with a URL-encoded tag set.
    /// Returns the object location.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        tagging: Option<String>,
    ) -> Result<String, SessionError>;

    /// Fetch the raw bytes stored under `key`.
    async fn get_object(&self, key: &str) -> Result<Bytes, SessionError>;

    /// Fetch one page of objects under `prefix`.
    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, SessionError>;

    /// Server-side copy within the bucket.
    async fn copy_object(&self, source_key: &str, target_key: &str) -> Result<(), SessionError>;

    /// Delete the object under `key`.
    async fn delete_object(&self, key: &str) -> Result<(), SessionError>;

    /// Returns whether an object exists under exactly `key`.
    async fn object_exists(&self, key: &str) -> Result<bool, SessionError>;

    /// Check that the bucket exists and is reachable.
    async fn head_bucket(&self) -> Result<(), SessionError>;

    /// Create the bucket.
    async fn create_bucket(&self) -> Result<(), SessionError>;
}
