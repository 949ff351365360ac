//! Transparent client-side encryption on top of a [`BlobSession`].
//!
//! Every object is encrypted with the client's [`CipherCodec`] before it is
//! put, and decrypted after it is fetched. The plaintext never leaves the
//! process and nothing decrypted is cached between calls.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use crypt::{CipherCodec, KeyRing};
use tokio::time;
use tracing::{debug, info, warn};

use crate::aws::S3Session;
use crate::config::{BucketConfig, Config};
use crate::error::StoreError;
use crate::lifecycle::BucketLifecycleManager;
use crate::listing::{collect_keys, TimeWindow};
use crate::session::BlobSession;

/// Keys ending in this suffix hold documents that were never client-side
/// encrypted; they are returned verbatim by [`ObjectStoreClient::download`].
///
/// This is a naming convention, not object metadata. Renaming such an object
/// changes how it is read.
pub const PLAINTEXT_SUFFIX: &str = ".enc.json";

/// Which key decrypts a download.
#[derive(Debug, Clone, Copy)]
pub enum DecryptWith<'a> {
    /// The client's own codec.
    Primary,
    /// Only the given codec, typically the key being rotated out. The primary
    /// codec is not tried.
    Fallback(&'a CipherCodec),
    /// The key ring's current codec, then its previous one.
    Ring(&'a KeyRing),
}

/// How long [`ObjectStoreClient::delete_object`] waits for the store to stop
/// reporting a deleted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteWait {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay between existence checks.
    pub poll_interval: Duration,
}

impl Default for DeleteWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(100),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Encrypted object storage against one bucket.
///
/// The session is installed once by [`ObjectStoreClient::initialize`]; until
/// then every operation fails with [`StoreError::NotInitialized`]. After that
/// the client is read-only and can be shared across tasks behind an `Arc`.
#[derive(Debug)]
pub struct ObjectStoreClient<S = S3Session> {
    bucket: BucketConfig,
    codec: CipherCodec,
    delete_wait: DeleteWait,
    session: OnceLock<S>,
}

impl ObjectStoreClient<S3Session> {
    /// Build an S3-backed client from configuration and initialize it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured key is invalid or the bucket is not
    /// usable.
    pub async fn connect(cfg: &Config) -> anyhow::Result<Self> {
        let codec = cfg
            .encryption_key
            .codec()
            .context("ENCRYPTION_KEY is invalid")?;
        let bucket = cfg.bucket_config();
        let session = S3Session::connect(bucket.clone(), &cfg.aws_region).await;

        let client = Self::new(bucket, codec).with_delete_wait(cfg.delete_wait());
        client
            .initialize(session)
            .await
            .context("failed to initialize object store client")?;
        Ok(client)
    }
}

impl<S: BlobSession> ObjectStoreClient<S> {
    /// An uninitialized client for `bucket` encrypting with `codec`.
    pub fn new(bucket: BucketConfig, codec: CipherCodec) -> Self {
        Self {
            bucket,
            codec,
            delete_wait: DeleteWait::default(),
            session: OnceLock::new(),
        }
    }

    /// Override the deletion-confirmation policy.
    pub fn with_delete_wait(mut self, delete_wait: DeleteWait) -> Self {
        self.delete_wait = delete_wait;
        self
    }

    /// Name of the target bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket.name
    }

    /// Returns `true` once a session is installed.
    pub fn is_initialized(&self) -> bool {
        self.session.get().is_some()
    }

    /// Ensure the bucket exists, then install `session` for all later calls.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyInitialized`] on a second call, or the
    /// lifecycle error from [`BucketLifecycleManager::ensure_bucket`]. On
    /// error the client stays uninitialized.
    pub async fn initialize(&self, session: S) -> Result<(), StoreError> {
        if self.is_initialized() {
            return Err(StoreError::AlreadyInitialized);
        }
        BucketLifecycleManager::new(&session)
            .ensure_bucket(&self.bucket)
            .await?;
        self.session
            .set(session)
            .map_err(|_| StoreError::AlreadyInitialized)?;
        info!(bucket = %self.bucket(), algorithm = self.codec.algorithm(), "object store ready");
        Ok(())
    }

    fn session(&self) -> Result<&S, StoreError> {
        self.session.get().ok_or(StoreError::NotInitialized)
    }

    /// Encrypt `contents` and store the token under `key`.
    ///
    /// Encryption happens before any network call; if it fails nothing is
    /// sent. Returns the object location.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encryption`] or the store error, typically
    /// [`StoreError::Network`].
    pub async fn upload(
        &self,
        key: &str,
        contents: &[u8],
        tags: Option<&str>,
    ) -> Result<String, StoreError> {
        let session = self.session()?;
        let token = self
            .codec
            .encrypt(contents)
            .map_err(StoreError::Encryption)?;

        let location = session
            .put_object(key, Bytes::from(token), tags.map(str::to_owned))
            .await
            .inspect_err(|e| warn!(bucket = %self.bucket(), key = %key, error = %e, "upload failed"))?;
        info!(bucket = %self.bucket(), key = %key, "uploaded object");
        Ok(location)
    }

    /// Upload every `(key, contents)` pair, stopping at the first failure.
    /// Returns the locations in key order.
    ///
    /// # Errors
    ///
    /// See [`ObjectStoreClient::upload`].
    pub async fn upload_all(
        &self,
        files: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Vec<String>, StoreError> {
        let mut locations = Vec::with_capacity(files.len());
        for (key, contents) in files {
            locations.push(self.upload(key, contents, None).await?);
        }
        Ok(locations)
    }

    /// Fetch `key` and decrypt it.
    ///
    /// Keys ending in [`PLAINTEXT_SUFFIX`] are returned without decryption.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Network`] from the
    /// fetch, and [`StoreError::Decryption`] if the selected key cannot
    /// decrypt the object.
    pub async fn download(&self, key: &str, with: DecryptWith<'_>) -> Result<Vec<u8>, StoreError> {
        let session = self.session()?;
        let raw = session.get_object(key).await?;

        if is_plaintext_key(key) {
            debug!(key = %key, "plaintext document; skipping decryption");
            return Ok(raw.to_vec());
        }

        let decryption_failed = || StoreError::Decryption {
            key: key.to_owned(),
        };
        let token = std::str::from_utf8(&raw).map_err(|_| decryption_failed())?;
        let decrypted = match with {
            DecryptWith::Primary => self.codec.decrypt(token),
            DecryptWith::Fallback(codec) => codec.decrypt(token),
            DecryptWith::Ring(ring) => ring.decrypt(token),
        };
        decrypted.map_err(|e| {
            debug!(key = %key, error = %e, "decryption failed");
            decryption_failed()
        })
    }

    /// Download and decrypt every key with the primary codec, stopping at the
    /// first failure.
    ///
    /// # Errors
    ///
    /// See [`ObjectStoreClient::download`].
    pub async fn download_all(
        &self,
        keys: &[String],
    ) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        let mut contents = BTreeMap::new();
        for key in keys {
            let plaintext = self.download(key, DecryptWith::Primary).await?;
            contents.insert(key.clone(), plaintext);
        }
        Ok(contents)
    }

    /// Every key under `prefix`, across all pages, in store order.
    ///
    /// # Errors
    ///
    /// Fails on the first page error; a partial listing is never returned.
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        collect_keys(self.session()?, prefix, |_| true).await
    }

    /// Keys under `prefix` last modified within `[start, end]`, both ends
    /// inclusive.
    ///
    /// # Errors
    ///
    /// See [`ObjectStoreClient::list_objects`].
    pub async fn list_objects_in_time_window(
        &self,
        prefix: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let window = TimeWindow::new(start, end);
        collect_keys(self.session()?, prefix, |obj| window.contains(obj)).await
    }

    /// Server-side copy of `source_key` to `target_key` within the bucket.
    /// The stored token is copied as-is.
    ///
    /// # Errors
    ///
    /// Returns the store error, typically [`StoreError::Network`].
    pub async fn copy_object(&self, source_key: &str, target_key: &str) -> Result<(), StoreError> {
        self.session()?
            .copy_object(source_key, target_key)
            .await
            .inspect_err(|e| warn!(source = %source_key, target = %target_key, error = %e, "copy failed"))?;
        debug!(source = %source_key, target = %target_key, "copied object");
        Ok(())
    }

    /// Delete `key` and wait until the store no longer reports it.
    ///
    /// # Errors
    ///
    /// Returns the store error from the delete or an existence check, or
    /// [`StoreError::DeleteUnconfirmed`] if the object is still present when
    /// the configured wait runs out.
    pub async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let session = self.session()?;
        session
            .delete_object(key)
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "delete failed"))?;

        let wait = self.delete_wait;
        time::timeout(wait.timeout, wait_until_gone(session, key, wait.poll_interval))
            .await
            .map_err(|_| StoreError::DeleteUnconfirmed {
                key: key.to_owned(),
                waited: wait.timeout,
            })??;
        info!(bucket = %self.bucket(), key = %key, "deleted object");
        Ok(())
    }

    /// Returns whether any object exists under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotInitialized`] before
    /// [`ObjectStoreClient::initialize`], or the store error.
    pub async fn exists(&self, prefix: &str) -> Result<bool, StoreError> {
        let page = self.session()?.list_objects(prefix, None).await?;
        Ok(!page.objects.is_empty())
    }
}

async fn wait_until_gone<S: BlobSession + ?Sized>(
    session: &S,
    key: &str,
    poll_interval: Duration,
) -> Result<(), StoreError> {
    while session.object_exists(key).await? {
        time::sleep(poll_interval).await;
    }
    Ok(())
}

fn is_plaintext_key(key: &str) -> bool {
    key.len() > PLAINTEXT_SUFFIX.len() && key.ends_with(PLAINTEXT_SUFFIX)
}
