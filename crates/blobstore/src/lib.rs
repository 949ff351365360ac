//! Client-side encrypted object storage on S3.
//!
//! [`ObjectStoreClient`] encrypts every object with AES-GCM before upload and
//! decrypts it after download, so the store only ever holds
//! `ciphertext|$|iv|$|tag` tokens. The bucket is checked (and, against a
//! development endpoint, created) once by [`BucketLifecycleManager`] when the
//! client is initialized.

pub mod aws;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod listing;
pub mod session;
pub mod telemetry;

pub use aws::S3Session;
pub use client::{DecryptWith, DeleteWait, ObjectStoreClient, PLAINTEXT_SUFFIX};
pub use config::{BucketConfig, Config, EncodedKey};
pub use error::StoreError;
pub use lifecycle::{BucketLifecycleManager, BucketState};
pub use listing::TimeWindow;
pub use session::{BlobSession, ListPage, ObjectMetadata, SessionError};
