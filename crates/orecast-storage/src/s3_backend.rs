//! S3-compatible storage backend.
//!
//! Talks to any endpoint that speaks the S3 API (`MinIO`, Ceph RGW, AWS).
//! Sessions use static credentials and path-style addressing, which is what
//! self-hosted endpoints expect. Every call is bounded by the connector's
//! timeout.

use std::time::Duration;

use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::error::DisplayErrorContext;
use tracing::debug;

use crate::{BucketInfo, ObjectInfo, StorageConnector, StorageCredentials, StorageError, StorageSession};

/// Region reported to endpoints that do not care about regions.
const DEFAULT_REGION: &str = "us-east-1";

/// Builds [`S3Session`]s from plaintext credentials.
#[derive(Debug, Clone)]
pub struct S3Connector {
    region: String,
    timeout: Duration,
}

impl S3Connector {
    /// Create a connector whose sessions bound each call by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            region: DEFAULT_REGION.to_owned(),
            timeout,
        }
    }

    /// Override the signing region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

impl Default for S3Connector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait::async_trait]
impl StorageConnector for S3Connector {
    async fn connect(
        &self,
        credentials: StorageCredentials,
    ) -> Result<Box<dyn StorageSession>, StorageError> {
        let host = credentials
            .endpoint
            .split_once("://")
            .map_or(credentials.endpoint.as_str(), |(_, host)| host);
        let endpoint = credentials.endpoint_url();
        if host.trim().trim_end_matches('/').is_empty() {
            return Err(StorageError::Connect {
                endpoint,
                reason: "empty endpoint".to_owned(),
            });
        }

        let creds = Credentials::new(
            credentials.access_key.as_str(),
            credentials.access_secret.as_str(),
            None,
            None,
            "orecast",
        );
        let config = aws_sdk_s3::Config::builder()
            .region(aws_sdk_s3::config::Region::new(self.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(creds))
            .endpoint_url(endpoint.as_str())
            .force_path_style(true)
            .behavior_version_latest()
            .build();

        debug!(endpoint = %endpoint, "opened S3 session");
        Ok(Box::new(S3Session {
            client: aws_sdk_s3::Client::from_conf(config),
            timeout: self.timeout,
        }))
    }
}

/// A live session against one S3-compatible endpoint.
#[derive(Debug)]
pub struct S3Session {
    client: aws_sdk_s3::Client,
    timeout: Duration,
}

#[async_trait::async_trait]
impl StorageSession for S3Session {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        let resp = tokio::time::timeout(self.timeout, self.client.list_buckets().send())
            .await
            .map_err(|_| StorageError::Timeout {
                operation: "list_buckets",
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| StorageError::ListBuckets {
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(resp
            .buckets()
            .iter()
            .map(|b| BucketInfo {
                name: b.name().unwrap_or_default().to_owned(),
                creation_date: b.creation_date().map(ToString::to_string),
            })
            .collect())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        // No delimiter, so the listing already descends into every prefix.
        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }

            let resp = tokio::time::timeout(self.timeout, req.send())
                .await
                .map_err(|_| StorageError::Timeout {
                    operation: "list_objects",
                    secs: self.timeout.as_secs(),
                })?
                .map_err(|e| StorageError::ListObjects {
                    bucket: bucket.to_owned(),
                    reason: DisplayErrorContext(&e).to_string(),
                })?;

            objects.extend(resp.contents().iter().map(|obj| ObjectInfo {
                name: obj.key().unwrap_or_default().to_owned(),
                etag: obj.e_tag().unwrap_or_default().trim_matches('"').to_owned(),
                size: obj.size().unwrap_or(0),
                last_modified: obj
                    .last_modified()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            }));

            continuation = match (resp.is_truncated(), resp.next_continuation_token()) {
                (Some(true), Some(next)) => Some(next.to_owned()),
                _ => break,
            };
        }

        debug!(bucket = %bucket, count = objects.len(), "listed bucket objects");
        Ok(objects)
    }
}
