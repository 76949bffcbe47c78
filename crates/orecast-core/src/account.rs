//! User login and registration against the authorization service.
//!
//! Passwords are encrypted with the credential vault before they are sent.
//! These calls identify a person, not the frontend, so they do not carry
//! the service bearer token.

use std::fmt;
use std::sync::Arc;

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::client::{DownstreamResponse, classify};
use crate::crypto::CredentialVault;
use crate::error::{AccountError, ClientError};
use crate::services::join;

/// Body of a login request. Field names are what authz expects.
#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "Login")]
    login: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

/// A new user account, with the password in plaintext.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Registration {
    #[zeroize(skip)]
    pub login: String,
    pub password: String,
    #[zeroize(skip)]
    #[serde(default)]
    pub first_name: String,
    #[zeroize(skip)]
    #[serde(default)]
    pub last_name: String,
    #[zeroize(skip)]
    #[serde(default)]
    pub email: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct AuthzResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: String,
}

/// Client for the user-facing endpoints of the authorization service.
pub struct AccountService {
    http: reqwest::Client,
    vault: Arc<CredentialVault>,
    authz_url: String,
    client_id: String,
}

impl AccountService {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        vault: Arc<CredentialVault>,
        authz_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            vault,
            authz_url: authz_url.into(),
            client_id: client_id.into(),
        }
    }

    /// Check `user` and `password` with the authorization service.
    ///
    /// # Errors
    ///
    /// - [`AccountError::Encryption`] if the password cannot be encrypted.
    /// - [`AccountError::Client`] if authz cannot be reached or its answer
    ///   cannot be decoded.
    /// - [`AccountError::Rejected`] if authz does not answer `ok`.
    pub async fn login(&self, user: &str, password: &str) -> Result<(), AccountError> {
        let encrypted = self.vault.encrypt(password)?;
        let url = format!(
            "{}?client_id={}&response_type=code",
            join(&self.authz_url, &["oauth", "authorize"]),
            urlencoding::encode(&self.client_id)
        );
        let body = LoginRequest {
            login: user,
            password: &encrypted,
        };
        let resp = self.post_json(&url, &body).await?;
        self.expect_ok(user, &resp)?;
        info!(user = %user, "user logged in");
        Ok(())
    }

    /// Create a new account with the authorization service.
    ///
    /// # Errors
    ///
    /// Same as [`login`](Self::login).
    pub async fn register(&self, registration: &Registration) -> Result<(), AccountError> {
        let mut outgoing = registration.clone();
        outgoing.password = self.vault.encrypt(&registration.password)?;
        let url = join(&self.authz_url, &["user"]);
        let resp = self.post_json(&url, &outgoing).await?;
        self.expect_ok(&registration.login, &resp)?;
        info!(user = %registration.login, "user registered");
        Ok(())
    }

    async fn post_json<T: Serialize>(&self, url: &str, body: &T) -> Result<DownstreamResponse, ClientError> {
        let resp = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| classify(url, &e))?;
        DownstreamResponse::read(url, resp).await
    }

    fn expect_ok(&self, user: &str, resp: &DownstreamResponse) -> Result<(), AccountError> {
        let answer: AuthzResponse = resp.json()?;
        debug!(
            url = %resp.url(),
            http_status = resp.status().as_u16(),
            status = %answer.status,
            "authz response"
        );
        if answer.status == "ok" {
            return Ok(());
        }
        warn!(user = %user, error = %answer.error, client_id = %self.client_id, "authz rejected user");
        Err(AccountError::Rejected {
            user: user.to_owned(),
        })
    }
}

impl fmt::Debug for AccountService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountService")
            .field("authz_url", &self.authz_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
