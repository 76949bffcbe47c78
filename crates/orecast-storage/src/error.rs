//! Storage error types.
//!
//! Every variant names the endpoint or bucket involved. None of them ever
//! carry access keys or secrets.

/// Errors that can occur while opening or using an object-storage session.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The session could not be constructed for the given endpoint.
    #[error("failed to open storage session at '{endpoint}': {reason}")]
    Connect { endpoint: String, reason: String },

    /// Listing buckets failed.
    #[error("failed to list buckets: {reason}")]
    ListBuckets { reason: String },

    /// Listing the objects of a bucket failed.
    #[error("failed to list objects in bucket '{bucket}': {reason}")]
    ListObjects { bucket: String, reason: String },

    /// The named bucket does not exist.
    #[error("bucket '{bucket}' not found")]
    BucketNotFound { bucket: String },

    /// A storage operation did not finish within the configured bound.
    #[error("storage operation '{operation}' timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
}
