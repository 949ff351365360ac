//! Configuration loading and validation for the object-store client.
//!
//! All values are read from environment variables. Loading fails with a clear
//! error if a required variable is missing or invalid.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use crypt::CipherCodec;
use serde::Deserialize;

use crate::client::DeleteWait;

/// Target bucket plus optional development endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    /// Bucket name.
    pub name: String,
    /// Alternate endpoint (e.g. a localstack URL). Its presence marks
    /// development mode, the only mode in which a missing bucket is created.
    pub endpoint: Option<String>,
    /// Use path-style addressing (`endpoint/bucket/key`).
    pub force_path_style: bool,
}

impl BucketConfig {
    /// Production bucket on the default AWS endpoint.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: None,
            force_path_style: false,
        }
    }

    /// Development bucket on an alternate endpoint with path-style addressing.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self.force_path_style = true;
        self
    }

    /// Returns `true` if an alternate endpoint is configured.
    pub fn is_development(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// A base64-encoded symmetric key. `Debug` never prints it.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct EncodedKey(String);

impl EncodedKey {
    /// Decode and build a codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not base64 or has the wrong length.
    pub fn codec(&self) -> Result<CipherCodec, crypt::CipherError> {
        CipherCodec::from_base64(&self.0)
    }
}

impl fmt::Debug for EncodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncodedKey([REDACTED])")
    }
}

impl From<&str> for EncodedKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Validated client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Target bucket. **Required.**
    pub s3_bucket: String,

    /// Alternate S3 endpoint for local development.
    #[serde(default)]
    pub s3_endpoint: Option<String>,

    /// Path-style addressing. Defaults to `true` when an endpoint is set.
    #[serde(default)]
    pub s3_force_path_style: Option<bool>,

    /// AWS region.
    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    /// Base64 of the current 16/24/32-byte key. **Required.**
    pub encryption_key: EncodedKey,

    /// Base64 of the key being rotated out, if a rotation is in progress.
    #[serde(default)]
    pub previous_encryption_key: Option<EncodedKey>,

    /// Upper bound on waiting for a deleted object to disappear.
    #[serde(default = "default_delete_wait_secs")]
    pub delete_wait_secs: u64,

    /// Poll interval while waiting for a deletion.
    #[serde(default = "default_delete_poll_millis")]
    pub delete_poll_millis: u64,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_aws_region() -> String {
    "us-east-1".into()
}
fn default_delete_wait_secs() -> u64 {
    100
}
fn default_delete_poll_millis() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.s3_bucket, "S3_BUCKET")?;
        ensure_non_empty(&self.aws_region, "AWS_REGION")?;

        self.encryption_key
            .codec()
            .context("ENCRYPTION_KEY is invalid")?;
        if let Some(previous) = &self.previous_encryption_key {
            previous
                .codec()
                .context("PREVIOUS_ENCRYPTION_KEY is invalid")?;
        }

        if self.delete_wait_secs == 0 {
            anyhow::bail!("DELETE_WAIT_SECS must be > 0");
        }
        if self.delete_poll_millis == 0 {
            anyhow::bail!("DELETE_POLL_MILLIS must be > 0");
        }
        Ok(())
    }

    /// The bucket settings derived from this configuration.
    pub fn bucket_config(&self) -> BucketConfig {
        let endpoint = self
            .s3_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_owned);
        let force_path_style = self.s3_force_path_style.unwrap_or(endpoint.is_some());
        BucketConfig {
            name: self.s3_bucket.clone(),
            endpoint,
            force_path_style,
        }
    }

    /// Deletion-confirmation policy.
    pub fn delete_wait(&self) -> DeleteWait {
        DeleteWait {
            timeout: Duration::from_secs(self.delete_wait_secs),
            poll_interval: Duration::from_millis(self.delete_poll_millis),
        }
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
