//! Shared harness for router tests: wiremock stand-ins for authz and the
//! protected services, an in-memory storage endpoint, and a frozen clock.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::COOKIE;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use orecast_core::clock::{Clock, MockClock};
use orecast_core::crypto::CredentialVault;
use orecast_core::token::{encode_hs256, Claims};
use orecast_server::captcha::{CaptchaError, CaptchaVerifier};
use orecast_server::config::ServerConfig;
use orecast_server::routes::build_router;
use orecast_server::state::AppState;
use orecast_storage::{MemoryConnector, MemoryStorage};

pub const CLIENT_ID: &str = "frontend-client";
pub const PASSPHRASE: &str = "vault-passphrase";
pub const NOW: u64 = 1_700_000_000;
pub const ACCESS_KEY: &str = "AKIACORNELL";
pub const ACCESS_SECRET: &str = "cornell-secret";

/// Accepts exactly one captcha solution.
pub struct StubCaptcha;

#[async_trait::async_trait]
impl CaptchaVerifier for StubCaptcha {
    fn public_key(&self) -> Option<&str> {
        Some("stub-site-key")
    }

    async fn verify(&self, response: &str, _remote_ip: Option<&str>) -> Result<bool, CaptchaError> {
        Ok(response == "solved")
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
    pub authz: MockServer,
    pub services: MockServer,
    pub storage: MemoryStorage,
    pub clock: MockClock,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::start_with(&[]).await
    }

    /// Start with extra configuration variables. `ORECAST_AUTHZ_URL` may be
    /// overridden to point at an unreachable address.
    pub async fn start_with(extra: &[(&str, &str)]) -> Self {
        let authz = MockServer::start().await;
        let services = MockServer::start().await;

        let mut vars: HashMap<String, String> = [
            ("ORECAST_AUTHZ_URL", authz.uri()),
            ("ORECAST_CLIENT_ID", CLIENT_ID.to_owned()),
            ("ORECAST_CLIENT_SECRET", "client-secret".to_owned()),
            ("ORECAST_DISCOVERY_URL", services.uri()),
            ("ORECAST_METADATA_URL", services.uri()),
            ("ORECAST_DATAMANAGEMENT_URL", services.uri()),
            ("ORECAST_BOOKKEEPING_URL", services.uri()),
            ("ORECAST_PASSPHRASE", PASSPHRASE.to_owned()),
            ("ORECAST_TIMEOUT", "5".to_owned()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect();
        for (k, v) in extra {
            vars.insert((*k).to_owned(), (*v).to_owned());
        }
        let config = ServerConfig::from_lookup(|key| vars.get(key).cloned());

        let storage = MemoryStorage::new();
        let connector = MemoryConnector::new(storage.clone()).with_credentials(ACCESS_KEY, ACCESS_SECRET);
        let clock = MockClock::at(NOW);

        let state = Arc::new(
            AppState::from_config(
                &config,
                Arc::new(connector),
                Arc::new(StubCaptcha),
                Arc::new(clock.clone()),
            )
            .unwrap(),
        );
        let app = build_router(Arc::clone(&state), None, config.form_concurrency);

        Self {
            app,
            state,
            authz,
            services,
            storage,
            clock,
        }
    }

    /// Serve the token endpoint with a token valid for `ttl` seconds from
    /// now, expecting exactly `times` acquisitions.
    pub async fn mount_token(&self, ttl: u64, times: u64) {
        let mut mock = Mock::given(method("GET"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": token(self.clock.now_unix() + ttl),
                "token_type": "bearer",
                "scope": "read",
            })));
        if times > 0 {
            mock = mock.up_to_n_times(times);
        }
        mock.expect(times).mount(&self.authz).await;
    }

    /// Discovery answers with one site, `cornell`, whose keys are encrypted
    /// with the test passphrase.
    pub async fn mount_discovery(&self) {
        self.mount_sites(&[("cornell", "Cornell CHESS")]).await;
    }

    /// Discovery answers with the given `(name, description)` sites, all
    /// sharing the test storage keys.
    pub async fn mount_sites(&self, sites: &[(&str, &str)]) {
        let vault = CredentialVault::new(PASSPHRASE, "aes").unwrap();
        let records: Vec<serde_json::Value> = sites
            .iter()
            .map(|(name, description)| {
                serde_json::json!({
                    "name": name,
                    "url": format!("https://{name}.example"),
                    "endpoint": format!("minio.{name}.example:9000"),
                    "access_key": vault.encrypt(ACCESS_KEY).unwrap(),
                    "access_secret": vault.encrypt(ACCESS_SECRET).unwrap(),
                    "use_ssl": true,
                    "description": description,
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/sites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(records))
            .mount(&self.services)
            .await;
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, user: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header(COOKIE, format!("user={user}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, user: Option<&str>, form: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(user) = user {
            builder = builder.header(COOKIE, format!("user={user}"));
        }
        self.send(builder.body(Body::from(form.to_owned())).unwrap()).await
    }

    /// Requests that reached the protected services.
    pub async fn service_calls(&self) -> usize {
        self.services.received_requests().await.unwrap().len()
    }
}

/// HS256 token signed with the client id, expiring at `exp`.
pub fn token(exp: u64) -> String {
    let claims = Claims {
        exp: Some(exp),
        iat: Some(NOW),
        sub: Some(CLIENT_ID.to_owned()),
        ..Claims::default()
    };
    encode_hs256(&claims, CLIENT_ID.as_bytes()).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}
