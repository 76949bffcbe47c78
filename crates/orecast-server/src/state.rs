//! Shared application state for the frontend.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It owns the one [`TokenManager`] of the process,
//! so every handler and the auth gate see the same cached bearer token.

use std::sync::Arc;

use anyhow::Context;

use orecast_core::account::AccountService;
use orecast_core::client::DownstreamClient;
use orecast_core::clock::Clock;
use orecast_core::crypto::CredentialVault;
use orecast_core::services::Services;
use orecast_core::site::SiteResolver;
use orecast_core::token::TokenManager;
use orecast_storage::StorageConnector;

use crate::captcha::CaptchaVerifier;
use crate::config::ServerConfig;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Cached service bearer token.
    pub tokens: Arc<TokenManager>,
    /// Authenticated client for the protected services.
    pub client: Arc<DownstreamClient>,
    /// Site lookup and storage listing.
    pub sites: Arc<SiteResolver>,
    /// Metadata, data-management and bookkeeping calls.
    pub services: Arc<Services>,
    /// User login and registration.
    pub accounts: Arc<AccountService>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    /// URL prefix of every page and redirect.
    pub base: String,
    pub cookie_domain: Option<String>,
}

impl AppState {
    /// Wire up every subsystem from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the vault cipher is unknown or the HTTP client cannot be
    /// built.
    pub fn from_config(
        config: &ServerConfig,
        connector: Arc<dyn StorageConnector>,
        captcha: Arc<dyn CaptchaVerifier>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let vault = Arc::new(
            CredentialVault::new(&config.vault_passphrase, &config.vault_cipher)
                .context("failed to initialize credential vault")?,
        );

        let tokens = Arc::new(TokenManager::new(http.clone(), config.authz.clone(), clock));
        let client = Arc::new(DownstreamClient::new(
            http.clone(),
            Arc::clone(&tokens),
            config.verbose,
        ));
        let sites = Arc::new(SiteResolver::new(
            Arc::clone(&client),
            Arc::clone(&vault),
            connector,
            config.services.discovery.clone(),
        ));
        let services = Arc::new(Services::new(Arc::clone(&client), config.services.clone()));
        let accounts = Arc::new(AccountService::new(
            http,
            vault,
            config.authz.url.clone(),
            config.authz.client_id.clone(),
        ));

        Ok(Self {
            tokens,
            client,
            sites,
            services,
            accounts,
            captcha,
            base: config.base.clone(),
            cookie_domain: config.cookie_domain.clone(),
        })
    }

    /// `path` under the configured URL prefix.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("tokens", &self.tokens)
            .field("base", &self.base)
            .field("cookie_domain", &self.cookie_domain)
            .finish_non_exhaustive()
    }
}
