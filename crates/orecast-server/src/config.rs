//! Server configuration for the `OreCast` frontend.
//!
//! Loads configuration from environment variables with defaults that match a
//! single-host development deployment. All settings can be overridden via
//! `ORECAST_*` environment variables.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use orecast_core::services::ServiceEndpoints;
use orecast_core::token::AuthzSettings;

/// Default listening port.
const DEFAULT_PORT: u16 = 8344;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// `0` quiet, `1` request summaries, `2` and above log downstream
    /// requests and responses.
    pub verbose: u8,
    /// URL prefix the frontend is mounted under, without trailing slash.
    pub base: String,
    /// Directory served under `{base}/static`, if any.
    pub static_dir: Option<String>,
    /// `Domain` attribute of the user cookie, if any.
    pub cookie_domain: Option<String>,
    /// Timeout for every outbound HTTP and storage call.
    pub request_timeout: Duration,
    /// Authorization service and OAuth client credentials.
    pub authz: AuthzSettings,
    /// Protected service base URLs.
    pub services: ServiceEndpoints,
    /// Cipher name for the credential vault.
    pub vault_cipher: String,
    /// Passphrase for the credential vault.
    pub vault_passphrase: String,
    /// reCAPTCHA settings. Registration is refused when absent.
    pub captcha: Option<CaptchaConfig>,
    /// Concurrent login and registration submissions allowed.
    pub form_concurrency: usize,
}

/// reCAPTCHA-style verification settings.
#[derive(Clone)]
pub struct CaptchaConfig {
    pub verify_url: String,
    pub secret_key: String,
    pub public_key: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT` binds `0.0.0.0:$PORT`
    /// - `ORECAST_BIND_ADDR` full bind address (overrides `PORT`, default: `127.0.0.1:8344`)
    /// - `ORECAST_LOG_LEVEL` log filter (default: `info`)
    /// - `ORECAST_VERBOSE` verbosity level (default: `0`)
    /// - `ORECAST_BASE` URL prefix (default: empty)
    /// - `ORECAST_STATIC_DIR` static files directory (optional)
    /// - `ORECAST_COOKIE_DOMAIN` user cookie domain (optional)
    /// - `ORECAST_TIMEOUT` outbound call timeout in seconds (default: `30`)
    /// - `ORECAST_AUTHZ_URL` (default: `http://localhost:8380`)
    /// - `ORECAST_CLIENT_ID`, `ORECAST_CLIENT_SECRET` OAuth client credentials
    /// - `ORECAST_DISCOVERY_URL` (default: `http://localhost:8320`)
    /// - `ORECAST_METADATA_URL` (default: `http://localhost:8300`)
    /// - `ORECAST_DATAMANAGEMENT_URL` (default: `http://localhost:8340`)
    /// - `ORECAST_BOOKKEEPING_URL` (default: `http://localhost:8310`)
    /// - `ORECAST_CIPHER` vault cipher (default: `aes`)
    /// - `ORECAST_PASSPHRASE` vault passphrase
    /// - `ORECAST_CAPTCHA_VERIFY_URL`, `ORECAST_CAPTCHA_SECRET`, `ORECAST_CAPTCHA_PUBLIC_KEY`
    /// - `ORECAST_FORM_CONCURRENCY` (default: `16`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        // ORECAST_BIND_ADDR > PORT > default
        let bind_addr = if let Some(addr) = lookup("ORECAST_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
        } else if let Some(port) = lookup("PORT") {
            SocketAddr::from(([0, 0, 0, 0], port.parse().unwrap_or(DEFAULT_PORT)))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let request_timeout = Duration::from_secs(
            lookup("ORECAST_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(30),
        );

        let captcha = lookup("ORECAST_CAPTCHA_SECRET")
            .filter(|s| !s.is_empty())
            .map(|secret_key| CaptchaConfig {
                verify_url: var(
                    "ORECAST_CAPTCHA_VERIFY_URL",
                    "https://www.google.com/recaptcha/api/siteverify",
                ),
                secret_key,
                public_key: var("ORECAST_CAPTCHA_PUBLIC_KEY", ""),
            });

        Self {
            bind_addr,
            log_level: var("ORECAST_LOG_LEVEL", "info"),
            verbose: lookup("ORECAST_VERBOSE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            base: normalize_base(&var("ORECAST_BASE", "")),
            static_dir: lookup("ORECAST_STATIC_DIR").filter(|s| !s.is_empty()),
            cookie_domain: lookup("ORECAST_COOKIE_DOMAIN").filter(|s| !s.is_empty()),
            request_timeout,
            authz: AuthzSettings {
                url: var("ORECAST_AUTHZ_URL", "http://localhost:8380"),
                client_id: var("ORECAST_CLIENT_ID", "orecast-frontend"),
                client_secret: var("ORECAST_CLIENT_SECRET", ""),
            },
            services: ServiceEndpoints {
                discovery: var("ORECAST_DISCOVERY_URL", "http://localhost:8320"),
                metadata: var("ORECAST_METADATA_URL", "http://localhost:8300"),
                data_management: var("ORECAST_DATAMANAGEMENT_URL", "http://localhost:8340"),
                bookkeeping: var("ORECAST_BOOKKEEPING_URL", "http://localhost:8310"),
            },
            vault_cipher: var("ORECAST_CIPHER", "aes"),
            vault_passphrase: var("ORECAST_PASSPHRASE", ""),
            captcha,
            form_concurrency: lookup("ORECAST_FORM_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(16),
        }
    }
}

/// `/prefix` without trailing slash, or empty for the root.
fn normalize_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("verbose", &self.verbose)
            .field("base", &self.base)
            .field("static_dir", &self.static_dir)
            .field("cookie_domain", &self.cookie_domain)
            .field("request_timeout", &self.request_timeout)
            .field("authz", &self.authz)
            .field("services", &self.services)
            .field("vault_cipher", &self.vault_cipher)
            .field("vault_passphrase", &"[REDACTED]")
            .field("captcha", &self.captcha)
            .field("form_concurrency", &self.form_concurrency)
            .finish()
    }
}

impl fmt::Debug for CaptchaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptchaConfig")
            .field("verify_url", &self.verify_url)
            .field("secret_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .finish()
    }
}
