//! [`BlobSession`] backed by the AWS S3 SDK.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::Region,
    error::{DisplayErrorContext, SdkError},
    primitives::{ByteStream, DateTime as S3DateTime},
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, info};

use crate::config::BucketConfig;
use crate::session::{BlobSession, ListPage, ObjectMetadata, SessionError};

/// Region in which buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Everything except RFC 3986 unreserved characters is escaped in a key
/// segment.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// S3 client bound to one bucket.
#[derive(Debug, Clone)]
pub struct S3Session {
    client: Client,
    bucket: BucketConfig,
    region: String,
}

impl S3Session {
    /// Wrap an existing SDK client.
    pub fn new(client: Client, bucket: BucketConfig, region: impl Into<String>) -> Self {
        Self {
            client,
            bucket,
            region: region.into(),
        }
    }

    /// Load the default AWS configuration for `region` and build a client for
    /// `bucket`, honouring its alternate endpoint and path-style flag.
    ///
    /// Credentials are resolved through the standard AWS credential chain.
    pub async fn connect(bucket: BucketConfig, region: &str) -> Self {
        let sdk = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk).force_path_style(bucket.force_path_style);
        if bucket.is_development() {
            if let Some(endpoint) = &bucket.endpoint {
                info!(endpoint = %endpoint, "S3 client pointing at alternate endpoint");
                builder = builder.endpoint_url(endpoint);
            }
        }

        Self::new(Client::from_conf(builder.build()), bucket, region)
    }

    /// Bucket this session operates on.
    pub fn bucket(&self) -> &BucketConfig {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        object_url(&self.bucket, &self.region, key)
    }
}

#[async_trait]
impl BlobSession for S3Session {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        tagging: Option<String>,
    ) -> Result<String, SessionError> {
        self.client
            .put_object()
            .bucket(&self.bucket.name)
            .key(key)
            .body(ByteStream::from(body))
            .set_tagging(tagging)
            .send()
            .await
            .map_err(|e| request_error("PutObject", e))?;
        Ok(self.object_url(key))
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, SessionError> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket.name)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    SessionError::NotFound(key.to_owned())
                } else {
                    request_error("GetObject", e)
                }
            })?;

        let body = out.body.collect().await.map_err(|e| SessionError::Request {
            operation: "GetObject",
            message: format!("failed to read body: {e}"),
        })?;
        Ok(body.into_bytes())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, SessionError> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket.name)
            .prefix(prefix)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| request_error("ListObjectsV2", e))?;

        let objects = out
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                Some(ObjectMetadata::new(
                    key,
                    obj.last_modified().and_then(to_chrono),
                ))
            })
            .collect();

        Ok(ListPage {
            objects,
            next_token: out.next_continuation_token().map(str::to_owned),
            truncated: out.is_truncated().unwrap_or(false),
        })
    }

    async fn copy_object(&self, source_key: &str, target_key: &str) -> Result<(), SessionError> {
        // CopySource is "<source bucket>/<source key>".
        self.client
            .copy_object()
            .bucket(&self.bucket.name)
            .key(target_key)
            .copy_source(format!("{}/{source_key}", self.bucket.name))
            .send()
            .await
            .map_err(|e| request_error("CopyObject", e))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), SessionError> {
        self.client
            .delete_object()
            .bucket(&self.bucket.name)
            .key(key)
            .send()
            .await
            .map_err(|e| request_error("DeleteObject", e))?;
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, SessionError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket.name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(request_error("HeadObject", e)),
        }
    }

    async fn head_bucket(&self) -> Result<(), SessionError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket.name)
            .send()
            .await
            .map_err(|e| request_error("HeadBucket", e))?;
        Ok(())
    }

    async fn create_bucket(&self) -> Result<(), SessionError> {
        let mut req = self.client.create_bucket().bucket(&self.bucket.name);
        if self.region != DEFAULT_REGION {
            req = req.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        req.send()
            .await
            .map_err(|e| request_error("CreateBucket", e))?;
        debug!(bucket = %self.bucket.name, region = %self.region, "bucket created");
        Ok(())
    }
}

fn request_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> SessionError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    SessionError::Request {
        operation,
        message: DisplayErrorContext(&err).to_string(),
    }
}

fn to_chrono(t: &S3DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}

/// Location URL of `key`, mirroring how the bucket is addressed. Each `/`
/// separated segment of the key is percent-encoded.
fn object_url(bucket: &BucketConfig, region: &str, key: &str) -> String {
    let key = key
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");

    let endpoint = bucket
        .endpoint
        .as_deref()
        .map(|e| e.trim_end_matches('/').to_owned())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));

    if bucket.force_path_style {
        return format!("{endpoint}/{}/{key}", bucket.name);
    }
    match endpoint.split_once("://") {
        Some((scheme, host)) => format!("{scheme}://{}.{host}/{key}", bucket.name),
        None => format!("{}.{endpoint}/{key}", bucket.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_hosted_url_on_aws() {
        let b = BucketConfig::new("documents");
        assert_eq!(
            object_url(&b, "us-east-1", "a/b.txt"),
            "https://documents.s3.us-east-1.amazonaws.com/a/b.txt"
        );
    }

    #[test]
    fn path_style_url_on_alternate_endpoint() {
        let b = BucketConfig::new("documents").with_endpoint("http://localhost:4566/");
        assert_eq!(
            object_url(&b, "us-east-1", "k"),
            "http://localhost:4566/documents/k"
        );
    }

    #[test]
    fn path_style_url_on_aws() {
        let b = BucketConfig {
            force_path_style: true,
            ..BucketConfig::new("documents")
        };
        assert_eq!(
            object_url(&b, "eu-west-1", "k"),
            "https://s3.eu-west-1.amazonaws.com/documents/k"
        );
    }

    #[test]
    fn key_segments_are_percent_encoded() {
        let b = BucketConfig::new("documents");
        assert_eq!(
            object_url(&b, "us-east-1", "a b/ü/x+y~z.txt"),
            "https://documents.s3.us-east-1.amazonaws.com/a%20b/%C3%BC/x%2By~z.txt"
        );

        let dev = BucketConfig::new("documents").with_endpoint("http://localhost:4566");
        assert_eq!(
            object_url(&dev, "us-east-1", "reports/q1 2006.enc.json"),
            "http://localhost:4566/documents/reports/q1%202006.enc.json"
        );
    }

    #[tokio::test]
    async fn session_exposes_its_bucket() {
        let sdk = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .build();
        let session = S3Session::new(
            Client::from_conf(sdk),
            BucketConfig::new("documents"),
            "us-east-1",
        );
        assert_eq!(session.bucket().name, "documents");
        assert_eq!(session.object_url("k"), "https://documents.s3.us-east-1.amazonaws.com/k");
    }

    #[test]
    fn chrono_conversion_keeps_subseconds() {
        let t = S3DateTime::from_secs_and_nanos(1_136_127_845, 500);
        let c = to_chrono(&t).unwrap();
        assert_eq!(c.to_rfc3339(), "2006-01-01T15:04:05.000000500+00:00");
    }
}
