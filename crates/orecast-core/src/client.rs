//! Authenticated HTTP client for the protected `OreCast` services.
//!
//! Every request goes through [`TokenManager::bearer`] first, so a request
//! is only sent once a currently valid token exists. Responses are read in
//! full and handed back as [`DownstreamResponse`] whatever their status.
//!
//! With verbose level 2 or higher, requests and responses are logged with
//! the `Authorization` header redacted.

use std::borrow::Cow;
use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Request, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::ClientError;
use crate::token::TokenManager;

/// Longest body excerpt kept in errors and logs.
const BODY_EXCERPT_LEN: usize = 512;

/// A fully read downstream response.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    url: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl DownstreamResponse {
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Turn a non-2xx response into [`ClientError::UnexpectedStatus`].
    ///
    /// # Errors
    ///
    /// Returns the error when the status is not a success.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ClientError::UnexpectedStatus {
                status: self.status.as_u16(),
                body: excerpt(&self.text()),
                url: self.url,
            })
        }
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// Read a response from the wire.
    pub(crate) async fn read(url: &str, resp: reqwest::Response) -> Result<Self, ClientError> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| classify(url, &e))?
            .to_vec();
        Ok(Self {
            url: url.to_owned(),
            status,
            headers,
            body,
        })
    }
}

/// HTTP client that attaches the service bearer token to every request.
pub struct DownstreamClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    verbose: u8,
}

impl DownstreamClient {
    /// `http` should already carry the configured request timeout.
    #[must_use]
    pub fn new(http: reqwest::Client, tokens: Arc<TokenManager>, verbose: u8) -> Self {
        Self {
            http,
            tokens,
            verbose,
        }
    }

    /// The token manager backing this client.
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// `GET url`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Token`] if no valid token can be obtained (nothing is
    /// sent), [`ClientError::Network`] or [`ClientError::Timeout`] if the
    /// request does not complete.
    pub async fn get(&self, url: &str) -> Result<DownstreamResponse, ClientError> {
        self.send(Method::GET, url, |rb| rb).await
    }

    /// `POST url` with a raw body.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<DownstreamResponse, ClientError> {
        let content_type = HeaderValue::from_str(content_type).map_err(|e| {
            ClientError::InvalidRequest {
                url: url.to_owned(),
                reason: format!("invalid content type: {e}"),
            }
        })?;
        self.send(Method::POST, url, move |rb| {
            rb.header(header::CONTENT_TYPE, content_type)
                .header(header::ACCEPT, "application/json")
                .body(body)
        })
        .await
    }

    /// `POST url` with `body` serialized as JSON.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidRequest`] if `body` cannot be serialized,
    /// otherwise same as [`get`](Self::get).
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<DownstreamResponse, ClientError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ClientError::InvalidRequest {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        self.post(url, "application/json", bytes).await
    }

    /// `POST url` with form-encoded `values`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn post_form(
        &self,
        url: &str,
        values: &[(&str, &str)],
    ) -> Result<DownstreamResponse, ClientError> {
        self.send(Method::POST, url, |rb| rb.form(values)).await
    }

    /// `DELETE url`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub async fn delete(&self, url: &str) -> Result<DownstreamResponse, ClientError> {
        self.send(Method::DELETE, url, |rb| rb).await
    }

    async fn send<F>(&self, method: Method, url: &str, build: F) -> Result<DownstreamResponse, ClientError>
    where
        F: FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    {
        let bearer = self.tokens.bearer().await?;

        let request = build(self.http.request(method, url))
            .bearer_auth(bearer.as_str())
            .build()
            .map_err(|e| ClientError::InvalidRequest {
                url: url.to_owned(),
                reason: e.without_url().to_string(),
            })?;
        drop(bearer);

        if self.verbose > 1 {
            log_request(&request);
        }

        let resp = self
            .http
            .execute(request)
            .await
            .map_err(|e| classify(url, &e))?;
        let response = DownstreamResponse::read(url, resp).await?;

        if self.verbose > 1 {
            info!(
                url = %response.url,
                status = response.status.as_u16(),
                headers = ?redacted_headers(&response.headers),
                body = %excerpt(&response.text()),
                "downstream response"
            );
        }
        Ok(response)
    }
}

impl std::fmt::Debug for DownstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamClient")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

pub(crate) fn classify(url: &str, err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout {
            url: url.to_owned(),
        }
    } else {
        ClientError::Network {
            url: url.to_owned(),
            reason: error_chain(err),
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

fn log_request(request: &Request) {
    let headers = redacted_headers(request.headers());
    let body = request
        .body()
        .and_then(reqwest::Body::as_bytes)
        .map(|b| excerpt(&String::from_utf8_lossy(b)))
        .unwrap_or_default();
    info!(
        method = %request.method(),
        url = %request.url(),
        headers = ?headers,
        body = %body,
        "downstream request"
    );
}

fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == header::AUTHORIZATION {
                "Bearer [REDACTED]".to_owned()
            } else if name == header::COOKIE
                || name == header::SET_COOKIE
                || name == header::PROXY_AUTHORIZATION
            {
                "[REDACTED]".to_owned()
            } else {
                value.to_str().unwrap_or("<binary>").to_owned()
            };
            (name.as_str().to_owned(), shown)
        })
        .collect()
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::TokenError;
    use crate::token::{AuthzSettings, Claims, encode_hs256};
    use wiremock::matchers::{body_string, header as has_header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_ID: &str = "frontend-client";
    const NOW: u64 = 1_700_000_000;

    fn service_token() -> String {
        let claims = Claims {
            exp: Some(NOW + 3_600),
            ..Claims::default()
        };
        encode_hs256(&claims, CLIENT_ID.as_bytes()).unwrap()
    }

    async fn authz() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": service_token() })),
            )
            .mount(&server)
            .await;
        server
    }

    fn client(authz_url: &str) -> DownstreamClient {
        let tokens = TokenManager::new(
            reqwest::Client::new(),
            AuthzSettings {
                url: authz_url.to_owned(),
                client_id: CLIENT_ID.to_owned(),
                client_secret: "secret".to_owned(),
            },
            Arc::new(MockClock::at(NOW)),
        );
        DownstreamClient::new(reqwest::Client::new(), Arc::new(tokens), 2)
    }

    #[tokio::test]
    async fn get_carries_bearer_token() {
        let authz = authz().await;
        let svc = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sites"))
            .and(has_header("authorization", format!("Bearer {}", service_token()).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&svc)
            .await;

        let resp = client(&authz.uri())
            .get(&format!("{}/sites", svc.uri()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.text(), "[]");
    }

    #[tokio::test]
    async fn nothing_is_sent_without_a_token() {
        let svc = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&svc)
            .await;

        let err = client("http://127.0.0.1:9")
            .get(&format!("{}/sites", svc.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Token(TokenError::Acquisition { .. })));
    }

    #[tokio::test]
    async fn post_form_and_delete_use_expected_shapes() {
        let authz = authz().await;
        let svc = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/cornell/raw"))
            .and(has_header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("kind=bucket"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&svc)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/storage/cornell/raw"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&svc)
            .await;

        let c = client(&authz.uri());
        let url = format!("{}/storage/cornell/raw", svc.uri());
        c.post_form(&url, &[("kind", "bucket")]).await.unwrap();
        let resp = c.delete(&url).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn post_json_sets_content_type() {
        let authz = authz().await;
        let svc = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sites"))
            .and(has_header("content-type", "application/json"))
            .and(body_string(r#"{"name":"cornell"}"#))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&svc)
            .await;

        client(&authz.uri())
            .post_json(
                &format!("{}/sites", svc.uri()),
                &serde_json::json!({ "name": "cornell" }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_returned_then_surfaced() {
        let authz = authz().await;
        let svc = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&svc)
            .await;

        let resp = client(&authz.uri()).get(&svc.uri()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let err = resp.error_for_status().unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedStatus { status: 503, ref body, .. } if body == "down"
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_network_error() {
        let authz = authz().await;
        let err = client(&authz.uri())
            .get("http://127.0.0.1:9/sites")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Network { .. }));
    }

    #[test]
    fn authorization_header_is_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let shown = redacted_headers(&headers);
        assert!(shown.iter().all(|(_, v)| !v.contains("abc")));
        assert!(shown.contains(&("accept".to_owned(), "application/json".to_owned())));
    }

    #[test]
    fn cookies_are_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::SET_COOKIE, HeaderValue::from_static("session=s3cr3t; HttpOnly"));
        headers.insert(header::COOKIE, HeaderValue::from_static("session=s3cr3t"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let shown = redacted_headers(&headers);

        assert!(shown.iter().all(|(_, v)| !v.contains("s3cr3t")));
        assert!(shown.contains(&("set-cookie".to_owned(), "[REDACTED]".to_owned())));
        assert!(shown.contains(&("content-type".to_owned(), "application/json".to_owned())));
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let long = "é".repeat(BODY_EXCERPT_LEN + 10);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), BODY_EXCERPT_LEN + 3);
        assert_eq!(excerpt("short"), "short");
    }
}
