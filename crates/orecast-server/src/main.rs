//! `OreCast` frontend entry point.
//!
//! Loads configuration, wires the token manager, downstream client, site
//! resolver and account service together, then serves the pages with
//! graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use orecast_core::clock::SystemClock;
use orecast_server::captcha::{CaptchaVerifier, DisabledCaptcha, HttpCaptchaVerifier};
use orecast_server::config::ServerConfig;
use orecast_server::routes;
use orecast_server::state::AppState;
use orecast_storage::S3Connector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        authz = %config.authz.url,
        discovery = %config.services.discovery,
        metadata = %config.services.metadata,
        data_management = %config.services.data_management,
        bookkeeping = %config.services.bookkeeping,
        base = %config.base,
        "OreCast frontend starting"
    );

    let captcha: Arc<dyn CaptchaVerifier> = match &config.captcha {
        Some(captcha) => Arc::new(HttpCaptchaVerifier::new(
            reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .context("failed to build captcha HTTP client")?,
            captcha.verify_url.clone(),
            captcha.secret_key.clone(),
            captcha.public_key.clone(),
        )),
        None => {
            warn!("no captcha configured, user registration is disabled");
            Arc::new(DisabledCaptcha)
        }
    };
    if config.vault_passphrase.is_empty() {
        warn!("ORECAST_PASSPHRASE is empty, site credentials will not decrypt");
    }

    let state = Arc::new(AppState::from_config(
        &config,
        Arc::new(S3Connector::new(config.request_timeout)),
        captcha,
        Arc::new(SystemClock),
    )?);

    let app = routes::build_router(
        state,
        config.static_dir.as_deref(),
        config.form_concurrency,
    );

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "OreCast frontend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("OreCast frontend stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
