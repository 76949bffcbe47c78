//! Service bearer token: acquisition, validation and caching.
//!
//! The frontend calls every protected service with one process-wide token
//! obtained from the authorization service through the OAuth2
//! client-credentials grant. [`TokenManager`] keeps that token in a
//! read-write slot and re-acquires it only when it no longer validates.
//!
//! Tokens are HS256 JWTs signed with the frontend's client id. Validation
//! checks the signature and the `exp`, `nbf` and `iat` claims against a
//! [`Clock`].
//!
//! # Concurrency
//!
//! Readers validate under the shared lock. A reader that finds the slot
//! empty or stale upgrades to the exclusive lock, re-checks, and only then
//! acquires. Concurrent callers that arrive during an acquisition wait for
//! the lock and reuse the result, so at most one acquisition is in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clock::Clock;
use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Tolerated clock difference for `nbf` and `iat`.
const CLOCK_SKEW_SECS: u64 = 30;

/// The only signing algorithm accepted.
const ALGORITHM: &str = "HS256";

/// Registered claims checked by the frontend. Other claims are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Not-before, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Issued-at, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    fn check(&self, now: u64) -> Result<(), TokenError> {
        if let Some(exp) = self.exp {
            if now >= exp {
                return Err(TokenError::InvalidClaims {
                    reason: format!("token expired at {exp}"),
                });
            }
        }
        if let Some(nbf) = self.nbf {
            if now + CLOCK_SKEW_SECS < nbf {
                return Err(TokenError::InvalidClaims {
                    reason: format!("token not valid before {nbf}"),
                });
            }
        }
        if let Some(iat) = self.iat {
            if now + CLOCK_SKEW_SECS < iat {
                return Err(TokenError::InvalidClaims {
                    reason: format!("token issued in the future at {iat}"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Sign `claims` as an HS256 JWT.
///
/// # Errors
///
/// Returns [`TokenError::Malformed`] if the claims cannot be serialized.
pub fn encode_hs256(claims: &Claims, key: &[u8]) -> Result<String, TokenError> {
    let header = Header {
        alg: ALGORITHM.to_owned(),
        typ: Some("JWT".to_owned()),
    };
    let header = encode_segment(&header)?;
    let payload = encode_segment(claims)?;
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| TokenError::Malformed {
        reason: e.to_string(),
    })?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{header}.{payload}.{signature}"))
}

/// Verify an HS256 JWT and return its claims.
///
/// # Errors
///
/// - [`TokenError::Malformed`] if the token is not three base64url segments
///   of JSON.
/// - [`TokenError::InvalidSignature`] if the algorithm is not HS256 or the
///   signature does not match `key`.
/// - [`TokenError::InvalidClaims`] if the token is expired or not yet valid
///   at `now`.
pub fn verify_hs256(token: &str, key: &[u8], now: u64) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed {
            reason: "expected three dot-separated segments".to_owned(),
        });
    };

    let parsed: Header = decode_segment(header)?;
    if parsed.alg != ALGORITHM {
        return Err(TokenError::InvalidSignature);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| TokenError::Malformed {
            reason: format!("signature is not base64url: {e}"),
        })?;
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| TokenError::InvalidSignature)?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let claims: Claims = decode_segment(payload)?;
    claims.check(now)?;
    Ok(claims)
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Malformed {
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed {
            reason: format!("segment is not base64url: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed {
        reason: format!("segment is not valid JSON: {e}"),
    })
}

/// Where and as whom the frontend asks for its service token.
#[derive(Clone)]
pub struct AuthzSettings {
    /// Base URL of the authorization service.
    pub url: String,
    /// OAuth client id. Also the HS256 verification key.
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for AuthzSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthzSettings")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// A copy of the current access token, ready for an `Authorization` header.
///
/// Zeroized on drop and redacted in `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BearerToken(String);

impl BearerToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct CachedToken {
    access_token: String,
    #[zeroize(skip)]
    claims: Claims,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
}

/// Process-wide cache of the service bearer token.
pub struct TokenManager {
    http: reqwest::Client,
    settings: AuthzSettings,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<CachedToken>>,
    acquisitions: AtomicU64,
}

impl TokenManager {
    /// Create an empty manager. No request is made until the first call.
    #[must_use]
    pub fn new(http: reqwest::Client, settings: AuthzSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            settings,
            clock,
            slot: RwLock::new(None),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Guarantee that a currently valid token is cached.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Acquisition`] if the cached token is missing or
    /// stale and a fresh one cannot be obtained and validated. The slot is
    /// left empty in that case.
    pub async fn ensure_valid(&self) -> Result<(), TokenError> {
        self.bearer().await.map(|_| ())
    }

    /// Return the current token, acquiring one first if needed.
    ///
    /// # Errors
    ///
    /// Same as [`ensure_valid`](Self::ensure_valid).
    pub async fn bearer(&self) -> Result<BearerToken, TokenError> {
        {
            let slot = self.slot.read().await;
            if let Some(cached) = slot.as_ref() {
                match self.validate(&cached.access_token) {
                    Ok(_) => return Ok(BearerToken(cached.access_token.clone())),
                    Err(e) => debug!(error = %e, "cached service token no longer valid"),
                }
            }
        }

        let mut slot = self.slot.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(cached) = slot.as_ref() {
            if self.validate(&cached.access_token).is_ok() {
                return Ok(BearerToken(cached.access_token.clone()));
            }
        }
        *slot = None;

        let fresh = self.acquire().await?;
        let bearer = BearerToken(fresh.access_token.clone());
        *slot = Some(fresh);
        Ok(bearer)
    }

    /// Drop the cached token so the next call acquires a new one.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    /// Claims of the cached token, if any. Does not validate.
    pub async fn cached_claims(&self) -> Option<Claims> {
        self.slot.read().await.as_ref().map(|c| c.claims.clone())
    }

    /// Number of successful acquisitions since startup.
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        verify_hs256(
            token,
            self.settings.client_id.as_bytes(),
            self.clock.now_unix(),
        )
    }

    async fn acquire(&self) -> Result<CachedToken, TokenError> {
        let url = format!("{}/oauth/token", self.settings.url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("grant_type", "client_credentials"),
                ("scope", "read"),
            ])
            .send()
            .await
            // The URL carries the client secret in its query string.
            .map_err(|e| TokenError::Acquisition {
                reason: format!("authorization service unreachable: {}", e.without_url()),
            })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "authorization service refused token request");
            return Err(TokenError::Acquisition {
                reason: format!("authorization service returned HTTP {status}"),
            });
        }

        let body: TokenResponse = resp.json().await.map_err(|e| TokenError::Acquisition {
            reason: format!("unable to decode token response: {}", e.without_url()),
        })?;

        let claims = self
            .validate(&body.access_token)
            .map_err(|e| TokenError::Acquisition {
                reason: format!("issued token rejected: {e}"),
            })?;

        let count = self.acquisitions.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            token_type = %body.token_type,
            scope = %body.scope,
            expires = ?claims.exp,
            acquisitions = count,
            "acquired service token"
        );
        Ok(CachedToken {
            access_token: body.access_token.clone(),
            claims,
        })
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("settings", &self.settings)
            .field("acquisitions", &self.acquisitions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CLIENT_ID: &str = "frontend-client";
    const NOW: u64 = 1_700_000_000;

    fn claims(exp: u64) -> Claims {
        Claims {
            exp: Some(exp),
            iat: Some(NOW),
            sub: Some("frontend".to_owned()),
            ..Claims::default()
        }
    }

    fn token(exp: u64) -> String {
        encode_hs256(&claims(exp), CLIENT_ID.as_bytes()).unwrap()
    }

    fn manager(url: &str, clock: MockClock) -> TokenManager {
        TokenManager::new(
            reqwest::Client::new(),
            AuthzSettings {
                url: url.to_owned(),
                client_id: CLIENT_ID.to_owned(),
                client_secret: "s3cr3t".to_owned(),
            },
            Arc::new(clock),
        )
    }

    async fn mount_token(server: &MockServer, token: String, times: u64) {
        Mock::given(method("GET"))
            .and(path("/oauth/token"))
            .and(query_param("grant_type", "client_credentials"))
            .and(query_param("client_id", CLIENT_ID))
            .and(query_param("scope", "read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": token,
                "token_type": "bearer",
                "scope": "read",
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn verify_accepts_own_signature() {
        let got = verify_hs256(&token(NOW + 60), CLIENT_ID.as_bytes(), NOW).unwrap();
        assert_eq!(got, claims(NOW + 60));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let err = verify_hs256(&token(NOW + 60), b"another-client", NOW).unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let t = token(NOW + 60);
        let forged = encode_segment(&claims(NOW + 100_000)).unwrap();
        let mut parts: Vec<&str> = t.split('.').collect();
        parts[1] = &forged;
        let err = verify_hs256(&parts.join("."), CLIENT_ID.as_bytes(), NOW).unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[test]
    fn verify_rejects_alg_none() {
        let header = encode_segment(&Header {
            alg: "none".to_owned(),
            typ: None,
        })
        .unwrap();
        let payload = encode_segment(&claims(NOW + 60)).unwrap();
        let err = verify_hs256(&format!("{header}.{payload}."), CLIENT_ID.as_bytes(), NOW)
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidSignature));
    }

    #[test]
    fn verify_rejects_expired_and_premature() {
        let err = verify_hs256(&token(NOW), CLIENT_ID.as_bytes(), NOW).unwrap_err();
        assert!(matches!(err, TokenError::InvalidClaims { .. }));

        let early = Claims {
            nbf: Some(NOW + 3_600),
            ..claims(NOW + 7_200)
        };
        let t = encode_hs256(&early, CLIENT_ID.as_bytes()).unwrap();
        let err = verify_hs256(&t, CLIENT_ID.as_bytes(), NOW).unwrap_err();
        assert!(matches!(err, TokenError::InvalidClaims { .. }));
    }

    #[test]
    fn verify_rejects_garbage() {
        for input in ["", "abc", "a.b", "a.b.c.d", "!!!.@@@.###"] {
            assert!(matches!(
                verify_hs256(input, CLIENT_ID.as_bytes(), NOW),
                Err(TokenError::Malformed { .. })
            ));
        }
    }

    #[tokio::test]
    async fn first_call_acquires_then_reuses() {
        let server = MockServer::start().await;
        mount_token(&server, token(NOW + 3_600), 1).await;
        let tm = manager(&server.uri(), MockClock::at(NOW));

        tm.ensure_valid().await.unwrap();
        tm.ensure_valid().await.unwrap();
        let bearer = tm.bearer().await.unwrap();

        assert_eq!(bearer.as_str(), token(NOW + 3_600));
        assert_eq!(tm.acquisitions(), 1);
        assert_eq!(tm.cached_claims().await.unwrap().exp, Some(NOW + 3_600));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_acquisition() {
        let server = MockServer::start().await;
        mount_token(&server, token(NOW + 3_600), 1).await;
        let tm = Arc::new(manager(&server.uri(), MockClock::at(NOW)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tm = Arc::clone(&tm);
                tokio::spawn(async move { tm.ensure_valid().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(tm.acquisitions(), 1);
    }

    #[tokio::test]
    async fn expiry_triggers_exactly_one_reacquisition() {
        let server = MockServer::start().await;
        mount_token(&server, token(NOW + 60), 2).await;
        let clock = MockClock::at(NOW);
        let tm = manager(&server.uri(), clock.clone());

        tm.ensure_valid().await.unwrap();
        clock.advance(30);
        tm.ensure_valid().await.unwrap();
        assert_eq!(tm.acquisitions(), 1);

        // Past expiry. The mock hands out the same token again, which is
        // already expired, so the single re-acquisition fails.
        clock.advance(31);
        assert!(tm.ensure_valid().await.is_err());
        assert!(tm.cached_claims().await.is_none());
    }

    #[tokio::test]
    async fn stale_token_replaced_by_fresh_one() {
        let server = MockServer::start().await;
        let clock = MockClock::at(NOW);
        let tm = manager(&server.uri(), clock.clone());

        mount_token(&server, token(NOW + 60), 1).await;
        tm.ensure_valid().await.unwrap();
        server.reset().await;

        mount_token(&server, token(NOW + 3_600), 1).await;
        clock.advance(120);
        tm.ensure_valid().await.unwrap();
        tm.ensure_valid().await.unwrap();

        assert_eq!(tm.acquisitions(), 2);
        assert_eq!(tm.cached_claims().await.unwrap().exp, Some(NOW + 3_600));
    }

    #[tokio::test]
    async fn unreachable_authz_fails_and_leaves_slot_empty() {
        let tm = manager("http://127.0.0.1:9", MockClock::at(NOW));
        let err = tm.ensure_valid().await.unwrap_err();
        assert!(matches!(err, TokenError::Acquisition { .. }));
        assert!(!err.to_string().contains("s3cr3t"));
        assert!(tm.cached_claims().await.is_none());
    }

    #[tokio::test]
    async fn refused_request_is_an_acquisition_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let tm = manager(&server.uri(), MockClock::at(NOW));
        assert!(matches!(
            tm.ensure_valid().await,
            Err(TokenError::Acquisition { .. })
        ));
    }

    #[tokio::test]
    async fn badly_signed_token_is_never_cached() {
        let server = MockServer::start().await;
        let forged = encode_hs256(&claims(NOW + 3_600), b"not-the-client-id").unwrap();
        mount_token(&server, forged, 2).await;
        let tm = manager(&server.uri(), MockClock::at(NOW));

        assert!(tm.ensure_valid().await.is_err());
        assert!(tm.ensure_valid().await.is_err());
        assert_eq!(tm.acquisitions(), 0);
        assert!(tm.cached_claims().await.is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_reacquisition() {
        let server = MockServer::start().await;
        mount_token(&server, token(NOW + 3_600), 2).await;
        let tm = manager(&server.uri(), MockClock::at(NOW));

        tm.ensure_valid().await.unwrap();
        tm.invalidate().await;
        tm.ensure_valid().await.unwrap();
        assert_eq!(tm.acquisitions(), 2);
    }

    #[test]
    fn debug_output_is_redacted() {
        let tm = manager("http://authz", MockClock::at(NOW));
        let debug = format!("{tm:?} {:?}", BearerToken("abc.def.ghi".to_owned()));
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("abc.def.ghi"));
    }
}
