//! Site resolution: from a site name to the datasets in its storage.
//!
//! The discovery service publishes one record per site with the storage
//! endpoint and an access key pair encrypted by the credential vault.
//! [`SiteResolver::resolve`] finds the record, decrypts the pair, opens a
//! storage session and lists either the buckets of the site or the objects
//! of one bucket. Decrypted credentials only live inside
//! [`StorageCredentials`], which is zeroized once the session is open.

use std::fmt;
use std::sync::Arc;

use orecast_storage::{ObjectInfo, StorageConnector, StorageCredentials};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::client::DownstreamClient;
use crate::crypto::CredentialVault;
use crate::error::SiteError;
use crate::services::join;

/// One site as published by the discovery service.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SiteRecord {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub endpoint: String,
    /// Hex ciphertext from the credential vault.
    #[serde(default)]
    pub access_key: String,
    /// Hex ciphertext from the credential vault.
    #[serde(default)]
    pub access_secret: String,
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default)]
    pub description: String,
}

impl fmt::Debug for SiteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteRecord")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("endpoint", &self.endpoint)
            .field("access_key", &"[ENCRYPTED]")
            .field("access_secret", &"[ENCRYPTED]")
            .field("use_ssl", &self.use_ssl)
            .finish_non_exhaustive()
    }
}

/// Public view of a site. Carries no credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteSummary {
    pub name: String,
    pub url: String,
    pub description: String,
    pub use_ssl: bool,
}

impl From<&SiteRecord> for SiteSummary {
    fn from(record: &SiteRecord) -> Self {
        Self {
            name: record.name.clone(),
            url: record.url.clone(),
            description: record.description.clone(),
            use_ssl: record.use_ssl,
        }
    }
}

/// Result of resolving a site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteObject {
    pub name: String,
    /// Bucket names when no bucket was asked for, object names otherwise.
    pub datasets: Vec<String>,
    /// Object details. Empty when listing buckets.
    pub objects: Vec<ObjectInfo>,
}

/// A site to register, with its storage credentials in plaintext.
///
/// The credentials are encrypted before they leave the frontend and the
/// plaintext is zeroized on drop.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct NewSite {
    #[zeroize(skip)]
    pub name: String,
    #[zeroize(skip)]
    #[serde(default)]
    pub url: String,
    #[zeroize(skip)]
    #[serde(default)]
    pub endpoint: String,
    pub access_key: String,
    pub access_secret: String,
    #[zeroize(skip)]
    #[serde(default)]
    pub use_ssl: bool,
    #[zeroize(skip)]
    #[serde(default)]
    pub description: String,
}

impl fmt::Debug for NewSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSite")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("access_key", &"[REDACTED]")
            .field("access_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Looks sites up in discovery and lists their storage.
pub struct SiteResolver {
    client: Arc<DownstreamClient>,
    vault: Arc<CredentialVault>,
    connector: Arc<dyn StorageConnector>,
    discovery_url: String,
}

impl SiteResolver {
    #[must_use]
    pub fn new(
        client: Arc<DownstreamClient>,
        vault: Arc<CredentialVault>,
        connector: Arc<dyn StorageConnector>,
        discovery_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            vault,
            connector,
            discovery_url: discovery_url.into(),
        }
    }

    /// Every site known to discovery, without credentials.
    ///
    /// # Errors
    ///
    /// [`SiteError::Discovery`] if discovery cannot be queried.
    pub async fn sites(&self) -> Result<Vec<SiteSummary>, SiteError> {
        Ok(self.records().await?.iter().map(SiteSummary::from).collect())
    }

    /// Summary of a single site.
    ///
    /// # Errors
    ///
    /// [`SiteError::NotFound`] if no record carries `site`, or
    /// [`SiteError::Discovery`].
    pub async fn site(&self, site: &str) -> Result<SiteSummary, SiteError> {
        self.records()
            .await?
            .iter()
            .find(|r| r.name == site)
            .map(SiteSummary::from)
            .ok_or_else(|| SiteError::NotFound {
                site: site.to_owned(),
            })
    }

    /// List the buckets of `site`, or the objects of `bucket` when it is not
    /// empty.
    ///
    /// # Errors
    ///
    /// - [`SiteError::Discovery`] if discovery cannot be queried.
    /// - [`SiteError::NotFound`] if no record carries `site` exactly.
    /// - [`SiteError::CredentialDecryption`] if either credential fails to
    ///   decrypt. No storage session is attempted.
    /// - [`SiteError::StorageSession`] or [`SiteError::StorageListing`] if
    ///   storage cannot be reached or listed.
    pub async fn resolve(&self, site: &str, bucket: &str) -> Result<SiteObject, SiteError> {
        let records = self.records().await?;
        let Some(record) = records.iter().find(|r| r.name == site) else {
            warn!(site = %site, "site not found in discovery records");
            return Err(SiteError::NotFound {
                site: site.to_owned(),
            });
        };
        info!(site = %record.name, url = %record.url, "found site in discovery records");

        let decryption = |source| SiteError::CredentialDecryption {
            site: site.to_owned(),
            source,
        };
        let mut credentials = StorageCredentials {
            endpoint: record.endpoint.clone(),
            access_key: String::new(),
            access_secret: String::new(),
            use_ssl: record.use_ssl,
        };
        credentials.access_key = self.vault.decrypt(&record.access_key).map_err(decryption)?;
        credentials.access_secret = self
            .vault
            .decrypt(&record.access_secret)
            .map_err(decryption)?;

        let session = self
            .connector
            .connect(credentials)
            .await
            .map_err(|source| SiteError::StorageSession {
                site: site.to_owned(),
                source,
            })?;
        let listing = |source| SiteError::StorageListing {
            site: site.to_owned(),
            source,
        };

        if bucket.is_empty() {
            let buckets = session.list_buckets().await.map_err(listing)?;
            debug!(site = %site, count = buckets.len(), "listed site buckets");
            Ok(SiteObject {
                name: site.to_owned(),
                datasets: buckets.into_iter().map(|b| b.name).collect(),
                objects: Vec::new(),
            })
        } else {
            let objects = session.list_objects(bucket).await.map_err(listing)?;
            debug!(site = %site, bucket = %bucket, count = objects.len(), "listed bucket objects");
            Ok(SiteObject {
                name: site.to_owned(),
                datasets: objects.iter().map(|o| o.name.clone()).collect(),
                objects,
            })
        }
    }

    /// Encrypt the credentials of `new_site` and publish it to discovery.
    ///
    /// # Errors
    ///
    /// [`SiteError::CredentialEncryption`] or [`SiteError::Discovery`].
    pub async fn register(&self, new_site: &NewSite) -> Result<(), SiteError> {
        let encryption = |source| SiteError::CredentialEncryption {
            site: new_site.name.clone(),
            source,
        };
        let record = SiteRecord {
            name: new_site.name.clone(),
            url: new_site.url.clone(),
            endpoint: new_site.endpoint.clone(),
            access_key: self.vault.encrypt(&new_site.access_key).map_err(encryption)?,
            access_secret: self
                .vault
                .encrypt(&new_site.access_secret)
                .map_err(encryption)?,
            use_ssl: new_site.use_ssl,
            description: new_site.description.clone(),
        };

        let url = join(&self.discovery_url, &["sites"]);
        self.client
            .post_json(&url, &record)
            .await?
            .error_for_status()?;
        info!(site = %record.name, "registered site with discovery");
        Ok(())
    }

    async fn records(&self) -> Result<Vec<SiteRecord>, SiteError> {
        let url = join(&self.discovery_url, &["sites"]);
        let records: Vec<SiteRecord> = self.client.get(&url).await?.error_for_status()?.json()?;
        debug!(count = records.len(), "fetched discovery records");
        Ok(records)
    }
}

impl fmt::Debug for SiteResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteResolver")
            .field("discovery_url", &self.discovery_url)
            .finish_non_exhaustive()
    }
}
