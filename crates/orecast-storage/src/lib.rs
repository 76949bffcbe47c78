//! Object-storage abstraction for the `OreCast` frontend.
//!
//! This crate defines the [`StorageConnector`] and [`StorageSession`] traits:
//! a connector turns plaintext [`StorageCredentials`] into a live session,
//! and a session can enumerate buckets and the objects inside them. Nothing
//! here knows about sites, discovery, or how the credentials were stored.
//!
//! Two implementations are provided:
//!
//! - [`S3Connector`]: S3-compatible endpoints such as `MinIO` (feature `s3-backend`)
//! - [`MemoryConnector`]: in-memory, for testing only

mod error;
mod memory;
#[cfg(feature = "s3-backend")]
mod s3_backend;

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

pub use error::StorageError;
pub use memory::{MemoryConnector, MemoryStorage};
#[cfg(feature = "s3-backend")]
pub use s3_backend::S3Connector;

/// Plaintext credentials for one storage session.
///
/// Built immediately before [`StorageConnector::connect`] and consumed by it.
/// The key and secret are zeroized when the value is dropped and never
/// appear in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageCredentials {
    /// Storage endpoint, either `host:port` or a full URL.
    #[zeroize(skip)]
    pub endpoint: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub access_secret: String,
    /// Whether to talk TLS to a bare `host:port` endpoint.
    #[zeroize(skip)]
    pub use_ssl: bool,
}

impl StorageCredentials {
    /// Endpoint as a URL, adding the scheme implied by `use_ssl` when the
    /// endpoint is a bare `host:port`.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.use_ssl {
            format!("https://{}", self.endpoint)
        } else {
            format!("http://{}", self.endpoint)
        }
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("endpoint", &self.endpoint)
            .field("access_key", &"[REDACTED]")
            .field("access_secret", &"[REDACTED]")
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

/// A bucket as reported by the storage endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    /// Creation timestamp as reported by the endpoint, if any.
    pub creation_date: Option<String>,
}

/// One object inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full object key.
    pub name: String,
    pub etag: String,
    /// Size in bytes.
    pub size: i64,
    pub last_modified: String,
}

/// An open session against one storage endpoint.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait StorageSession: Send + Sync {
    /// List every bucket visible to the session's credentials.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ListBuckets`] or [`StorageError::Timeout`].
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError>;

    /// List every object in `bucket`, descending into all prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ListObjects`], [`StorageError::BucketNotFound`]
    /// or [`StorageError::Timeout`].
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError>;
}

/// Opens storage sessions from plaintext credentials.
#[async_trait::async_trait]
pub trait StorageConnector: Send + Sync + 'static {
    /// Open a session. The credentials are consumed and dropped (and
    /// therefore zeroized) once the session has been built.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connect`] if the session cannot be built.
    async fn connect(
        &self,
        credentials: StorageCredentials,
    ) -> Result<Box<dyn StorageSession>, StorageError>;
}
