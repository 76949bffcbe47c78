//! Typed clients for the metadata, data-management and bookkeeping services.
//!
//! All calls go through [`DownstreamClient`], so they carry the service
//! bearer token. Metadata and data-management answer with a result
//! [`Envelope`]; bookkeeping answers with a bare JSON array.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::client::{DownstreamClient, DownstreamResponse};
use crate::error::ClientError;

/// Base URLs of the protected services.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub discovery: String,
    pub metadata: String,
    pub data_management: String,
    pub bookkeeping: String,
}

/// `{status, data, error}` wrapper returned by most `OreCast` services.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub error: String,
}

impl<T> Envelope<T> {
    /// Unwrap the payload of an `ok` envelope.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] if the status is not `ok`.
    /// [`ClientError::Decode`] if an `ok` envelope has no data.
    pub fn into_data(self, url: &str) -> Result<T, ClientError> {
        if !self.status.eq_ignore_ascii_case("ok") {
            let reason = if self.error.is_empty() {
                format!("status '{}'", self.status)
            } else {
                self.error
            };
            return Err(ClientError::Rejected {
                url: url.to_owned(),
                reason,
            });
        }
        self.data.ok_or_else(|| ClientError::Decode {
            url: url.to_owned(),
            reason: "envelope has no data".to_owned(),
        })
    }
}

impl<T: Default> Envelope<T> {
    /// Like [`into_data`](Self::into_data) but treats missing data as empty.
    fn data_or_empty(mut self, url: &str) -> Result<T, ClientError> {
        if self.data.is_none() {
            self.data = Some(T::default());
        }
        self.into_data(url)
    }
}

/// Services may send `null` for an absent string, number or list.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One metadata record describing a dataset bucket at a site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub site: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bucket: String,
}

/// Bucket as reported by the data-management service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BucketRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, rename = "creationDate", deserialize_with = "null_as_default")]
    pub creation_date: String,
}

/// Buckets of one site.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteBuckets {
    #[serde(default, deserialize_with = "null_as_default")]
    pub site: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub buckets: Vec<BucketRecord>,
}

/// Object as reported by the data-management service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StorageObject {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub etag: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: i64,
    #[serde(default, rename = "lastModified", deserialize_with = "null_as_default")]
    pub last_modified: String,
}

/// Objects of one bucket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketObjects {
    #[serde(default, deserialize_with = "null_as_default")]
    pub site: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bucket: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub objects: Vec<StorageObject>,
}

/// Bookkeeping record of one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub dataset: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parent: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub processing: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub site: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub create_by: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub creation_date: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_modified_by: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_modification_date: i64,
}

/// Client for the metadata, data-management and bookkeeping services.
#[derive(Debug)]
pub struct Services {
    client: Arc<DownstreamClient>,
    endpoints: ServiceEndpoints,
}

impl Services {
    #[must_use]
    pub fn new(client: Arc<DownstreamClient>, endpoints: ServiceEndpoints) -> Self {
        Self { client, endpoints }
    }

    #[must_use]
    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    /// Metadata records of `site`.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidRequest`] for an empty site name, plus any
    /// [`ClientError`] from the call or the envelope.
    pub async fn meta_records(&self, site: &str) -> Result<Vec<MetaRecord>, ClientError> {
        let url = join(&self.endpoints.metadata, &["meta", site]);
        if site.trim().is_empty() {
            return Err(ClientError::InvalidRequest {
                url,
                reason: "site name is empty".to_owned(),
            });
        }
        let resp = self.client.get(&url).await?.error_for_status()?;
        let records = resp
            .json::<Envelope<Vec<MetaRecord>>>()?
            .data_or_empty(&url)?;
        debug!(site = %site, count = records.len(), "fetched meta records");
        Ok(records)
    }

    /// A single metadata record by id.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] if the service has no such record, plus any
    /// error from the call.
    pub async fn meta_record(&self, id: &str) -> Result<MetaRecord, ClientError> {
        let url = join(&self.endpoints.metadata, &["meta", "record", id]);
        let resp = self.client.get(&url).await?.error_for_status()?;
        resp.json::<Envelope<Vec<MetaRecord>>>()?
            .into_data(&url)?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Rejected {
                url,
                reason: format!("no meta record with id '{id}'"),
            })
    }

    /// Buckets of `site`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`] from the call or the envelope.
    pub async fn site_buckets(&self, site: &str) -> Result<SiteBuckets, ClientError> {
        let url = join(&self.endpoints.data_management, &["storage", site]);
        let resp = self.client.get(&url).await?.error_for_status()?;
        resp.json::<Envelope<SiteBuckets>>()?.into_data(&url)
    }

    /// Objects of `bucket` at `site`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`] from the call or the envelope.
    pub async fn bucket_objects(&self, site: &str, bucket: &str) -> Result<BucketObjects, ClientError> {
        let url = join(&self.endpoints.data_management, &["storage", site, bucket]);
        let resp = self.client.get(&url).await?.error_for_status()?;
        resp.json::<Envelope<BucketObjects>>()?.into_data(&url)
    }

    /// Ask data-management to create `bucket` at `site`.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnexpectedStatus`] unless the service answers 2xx.
    pub async fn create_bucket(&self, site: &str, bucket: &str) -> Result<(), ClientError> {
        let url = join(&self.endpoints.data_management, &["storage", site, bucket]);
        self.client
            .post_form(&url, &[("site", site), ("bucket", bucket)])
            .await?
            .error_for_status()?;
        debug!(site = %site, bucket = %bucket, "bucket created");
        Ok(())
    }

    /// Ask data-management to delete `bucket` at `site`.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnexpectedStatus`] unless the service answers 2xx.
    pub async fn delete_bucket(&self, site: &str, bucket: &str) -> Result<(), ClientError> {
        let url = join(&self.endpoints.data_management, &["storage", site, bucket]);
        self.client.delete(&url).await?.error_for_status()?;
        debug!(site = %site, bucket = %bucket, "bucket deleted");
        Ok(())
    }

    /// Every dataset known to bookkeeping.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`] from the call or decoding.
    pub async fn datasets(&self) -> Result<Vec<DatasetRecord>, ClientError> {
        let url = join(&self.endpoints.bookkeeping, &["datasets"]);
        decode_list(self.client.get(&url).await?)
    }

    /// Bookkeeping records matching dataset `name`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`] from the call or decoding.
    pub async fn dataset(&self, name: &str) -> Result<Vec<DatasetRecord>, ClientError> {
        let url = join(&self.endpoints.bookkeeping, &["dataset", name]);
        decode_list(self.client.get(&url).await?)
    }
}

fn decode_list(resp: DownstreamResponse) -> Result<Vec<DatasetRecord>, ClientError> {
    let resp = resp.error_for_status()?;
    // An empty body means no records.
    if resp.body().iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    resp.json()
}

/// `base/seg1/seg2/...` with each segment percent-encoded. Empty trailing
/// segments are dropped.
pub(crate) fn join(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_owned();
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::token::{AuthzSettings, Claims, TokenManager, encode_hs256};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_ID: &str = "frontend-client";
    const NOW: u64 = 1_700_000_000;

    async fn setup() -> (MockServer, MockServer, Services) {
        let authz = MockServer::start().await;
        let token = encode_hs256(
            &Claims {
                exp: Some(NOW + 3_600),
                ..Claims::default()
            },
            CLIENT_ID.as_bytes(),
        )
        .unwrap();
        Mock::given(method("GET"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": token })),
            )
            .mount(&authz)
            .await;

        let svc = MockServer::start().await;
        let tokens = TokenManager::new(
            reqwest::Client::new(),
            AuthzSettings {
                url: authz.uri(),
                client_id: CLIENT_ID.to_owned(),
                client_secret: "secret".to_owned(),
            },
            Arc::new(MockClock::at(NOW)),
        );
        let client = DownstreamClient::new(reqwest::Client::new(), Arc::new(tokens), 0);
        let services = Services::new(
            Arc::new(client),
            ServiceEndpoints {
                discovery: svc.uri(),
                metadata: svc.uri(),
                data_management: svc.uri(),
                bookkeeping: svc.uri(),
            },
        );
        (authz, svc, services)
    }

    #[test]
    fn join_encodes_segments() {
        assert_eq!(join("http://m/", &["meta", "cornell"]), "http://m/meta/cornell");
        assert_eq!(join("http://m", &["meta", ""]), "http://m/meta");
        assert_eq!(
            join("http://b", &["dataset", "/a/b c"]),
            "http://b/dataset/%2Fa%2Fb%20c"
        );
    }

    #[tokio::test]
    async fn meta_records_unwraps_envelope() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("GET"))
            .and(path("/meta/cornell"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": [
                    {"id": "m1", "site": "cornell", "description": "raw", "tags": ["x"], "bucket": "raw"},
                    {"id": "m2", "site": "cornell", "bucket": "processed"}
                ]
            })))
            .mount(&svc)
            .await;

        let records = services.meta_records("cornell").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tags, vec!["x".to_owned()]);
        assert_eq!(records[1].bucket, "processed");
    }

    #[tokio::test]
    async fn meta_records_without_data_are_empty() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("GET"))
            .and(path("/meta/nowhere"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
            .mount(&svc)
            .await;
        assert!(services.meta_records("nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_envelope_is_rejected() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("GET"))
            .and(path("/meta/record/m9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "fail", "error": "no such record"
            })))
            .mount(&svc)
            .await;

        let err = services.meta_record("m9").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { ref reason, .. } if reason == "no such record"));
    }

    #[tokio::test]
    async fn buckets_and_objects_decode() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("GET"))
            .and(path("/storage/cornell"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": {"site": "cornell", "buckets": [{"name": "raw", "creationDate": "2023-01-01"}]}
            })))
            .mount(&svc)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/cornell/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "data": {"site": "cornell", "bucket": "raw", "objects": [
                    {"name": "a.dat", "etag": "e1", "size": 42, "lastModified": "2023-01-02"}
                ]}
            })))
            .mount(&svc)
            .await;

        let buckets = services.site_buckets("cornell").await.unwrap();
        assert_eq!(buckets.buckets[0].creation_date, "2023-01-01");
        let objects = services.bucket_objects("cornell", "raw").await.unwrap();
        assert_eq!(objects.objects[0].size, 42);
        assert_eq!(objects.objects[0].last_modified, "2023-01-02");
    }

    #[tokio::test]
    async fn create_bucket_requires_success_status() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("POST"))
            .and(path("/storage/cornell/fresh"))
            .and(body_string_contains("bucket=fresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&svc)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/cornell/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&svc)
            .await;

        services.create_bucket("cornell", "fresh").await.unwrap();
        let err = services.create_bucket("cornell", "broken").await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn delete_bucket_uses_delete() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/cornell/old"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&svc)
            .await;
        services.delete_bucket("cornell", "old").await.unwrap();
    }

    #[tokio::test]
    async fn datasets_decode_bare_array() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("GET"))
            .and(path("/datasets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"dataset": "/a/b/c", "meta_id": "m1", "site": "cornell", "creation_date": 1_700_000_000}
            ])))
            .mount(&svc)
            .await;
        Mock::given(method("GET"))
            .and(path("/dataset/none"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&svc)
            .await;

        let all = services.datasets().await.unwrap();
        assert_eq!(all[0].dataset, "/a/b/c");
        assert_eq!(all[0].creation_date, 1_700_000_000);
        assert!(services.dataset("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_site_is_not_sent() {
        let (_authz, svc, services) = setup().await;

        let err = services.meta_records(" ").await.unwrap_err();

        assert!(matches!(err, ClientError::InvalidRequest { .. }));
        assert!(svc.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn null_fields_decode_as_defaults() {
        let body = br#"[{"create_by":"OreCast-workflow","creation_date":1696853600,"dataset":"/a/b/c","last_modification_date":1696853600,"last_modified_by":"OreCast-workflow","meta_id":"123xyz","parent":null,"processing":"glibc","site":"Cornell"}]"#;
        let records: Vec<DatasetRecord> = serde_json::from_slice(body).unwrap();
        assert_eq!(records[0].parent, "");
        assert_eq!(records[0].meta_id, "123xyz");
        assert_eq!(records[0].creation_date, 1_696_853_600);

        let body = br#"{"status":"ok","data":[{"id":"m1","site":"cornell","tags":null,"description":null,"bucket":"raw"}]}"#;
        let envelope: Envelope<Vec<MetaRecord>> = serde_json::from_slice(body).unwrap();
        let records = envelope.into_data("http://m/meta/cornell").unwrap();
        assert!(records[0].tags.is_empty());
        assert_eq!(records[0].bucket, "raw");

        let body = br#"{"site":"cornell","bucket":null,"objects":[{"name":"a.dat","etag":null,"size":null,"lastModified":null}]}"#;
        let objects: BucketObjects = serde_json::from_slice(body).unwrap();
        assert_eq!(objects.objects[0].size, 0);
        assert!(objects.bucket.is_empty());

        let buckets: SiteBuckets = serde_json::from_slice(br#"{"site":"cornell","buckets":null}"#).unwrap();
        assert!(buckets.buckets.is_empty());
    }

    #[tokio::test]
    async fn datasets_accept_null_parent() {
        let (_authz, svc, services) = setup().await;
        Mock::given(method("GET"))
            .and(path("/datasets"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"[{"dataset":"/a/b/c","meta_id":"123xyz","parent":null,"processing":"glibc","site":"Cornell"}]"#,
                "application/json",
            ))
            .mount(&svc)
            .await;

        let records = services.datasets().await.unwrap();
        assert_eq!(records[0].processing, "glibc");
        assert!(records[0].parent.is_empty());
    }
}
