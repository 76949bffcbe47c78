//! In-memory storage backend for testing.
//!
//! Buckets and their objects live in a `BTreeMap` behind a `RwLock`, so
//! listings come back sorted. A [`MemoryConnector`] can be told which
//! credentials to accept, which lets tests prove that the caller decrypted
//! the right key and secret before opening a session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::{BucketInfo, ObjectInfo, StorageConnector, StorageCredentials, StorageError, StorageSession};

/// Shared in-memory object store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    buckets: Arc<RwLock<BTreeMap<String, Vec<ObjectInfo>>>>,
    fail_listing: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bucket (no-op if it already exists).
    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_owned())
            .or_default();
    }

    /// Add an object to a bucket, creating the bucket if needed.
    pub async fn put_object(&self, bucket: &str, object: ObjectInfo) {
        let mut buckets = self.buckets.write().await;
        let objects = buckets.entry(bucket.to_owned()).or_default();
        objects.retain(|o| o.name != object.name);
        objects.push(object);
        objects.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Make every subsequent listing fail, to exercise error paths.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl StorageSession for MemoryStorage {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>, StorageError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StorageError::ListBuckets {
                reason: "listing disabled".to_owned(),
            });
        }
        let buckets = self.buckets.read().await;
        Ok(buckets
            .keys()
            .map(|name| BucketInfo {
                name: name.clone(),
                creation_date: None,
            })
            .collect())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectInfo>, StorageError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StorageError::ListObjects {
                bucket: bucket.to_owned(),
                reason: "listing disabled".to_owned(),
            });
        }
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .cloned()
            .ok_or_else(|| StorageError::BucketNotFound {
                bucket: bucket.to_owned(),
            })
    }
}

/// Connector handing out sessions over a shared [`MemoryStorage`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    storage: MemoryStorage,
    accepted: Option<(String, String)>,
    connections: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Accept any credentials.
    #[must_use]
    pub fn new(storage: MemoryStorage) -> Self {
        Self {
            storage,
            accepted: None,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Only accept this exact access key and secret.
    #[must_use]
    pub fn with_credentials(mut self, access_key: &str, access_secret: &str) -> Self {
        self.accepted = Some((access_key.to_owned(), access_secret.to_owned()));
        self
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StorageConnector for MemoryConnector {
    async fn connect(
        &self,
        credentials: StorageCredentials,
    ) -> Result<Box<dyn StorageSession>, StorageError> {
        if let Some((key, secret)) = &self.accepted {
            if credentials.access_key != *key || credentials.access_secret != *secret {
                return Err(StorageError::Connect {
                    endpoint: credentials.endpoint.clone(),
                    reason: "access denied".to_owned(),
                });
            }
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.storage.clone()))
    }
}
