//! Captcha verification for user registration.
//!
//! The registration form carries a reCAPTCHA-style response token.
//! [`HttpCaptchaVerifier`] posts it to the configured verify URL together
//! with the secret key and trusts the `success` field of the answer.

use std::fmt;

use serde::Deserialize;
use tracing::{debug, warn};

/// Errors from captcha verification.
#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    /// The verification service could not be reached or answered badly.
    #[error("captcha verification unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Checks a captcha solution submitted with a form.
#[async_trait::async_trait]
pub trait CaptchaVerifier: Send + Sync + 'static {
    /// Public key the page embeds, if the verifier needs one.
    fn public_key(&self) -> Option<&str> {
        None
    }

    /// `Ok(true)` if the solution is accepted.
    async fn verify(&self, response: &str, remote_ip: Option<&str>) -> Result<bool, CaptchaError>;
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifies solutions against a reCAPTCHA-compatible HTTP endpoint.
pub struct HttpCaptchaVerifier {
    http: reqwest::Client,
    verify_url: String,
    secret_key: String,
    public_key: String,
}

impl HttpCaptchaVerifier {
    #[must_use]
    pub fn new(http: reqwest::Client, verify_url: String, secret_key: String, public_key: String) -> Self {
        Self {
            http,
            verify_url,
            secret_key,
            public_key,
        }
    }
}

#[async_trait::async_trait]
impl CaptchaVerifier for HttpCaptchaVerifier {
    fn public_key(&self) -> Option<&str> {
        Some(&self.public_key)
    }

    async fn verify(&self, response: &str, remote_ip: Option<&str>) -> Result<bool, CaptchaError> {
        if response.is_empty() {
            return Ok(false);
        }
        let mut form = vec![("secret", self.secret_key.as_str()), ("response", response)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let answer: VerifyResponse = self
            .http
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| CaptchaError::Unavailable {
                reason: e.without_url().to_string(),
            })?
            .json()
            .await
            .map_err(|e| CaptchaError::Unavailable {
                reason: e.without_url().to_string(),
            })?;

        if !answer.success {
            debug!(errors = ?answer.error_codes, "captcha solution rejected");
        }
        Ok(answer.success)
    }
}

impl fmt::Debug for HttpCaptchaVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCaptchaVerifier")
            .field("verify_url", &self.verify_url)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Used when no captcha is configured. Rejects every solution, which
/// disables registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCaptcha;

#[async_trait::async_trait]
impl CaptchaVerifier for DisabledCaptcha {
    async fn verify(&self, _response: &str, _remote_ip: Option<&str>) -> Result<bool, CaptchaError> {
        warn!("registration attempted but no captcha is configured");
        Ok(false)
    }
}
