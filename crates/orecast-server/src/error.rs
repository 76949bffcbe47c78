//! HTTP error types for the frontend.
//!
//! Maps domain errors from `orecast-core` into HTTP responses. Every error
//! renders the standard page with an error panel, so the browser always
//! gets HTML. The router's [`error_pages`](crate::middleware::error_pages)
//! layer re-renders that page with the mount path and the signed-in user.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use orecast_core::error::{AccountError, ClientError, SiteError, TokenError};

use crate::captcha::CaptchaError;
use crate::views::{self, Page};

/// Message of an [`AppError`] response, left in the response extensions.
#[derive(Debug, Clone)]
pub struct ErrorMessage(pub String);

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// No valid service token could be obtained.
    Unauthorized(String),
    /// The form or query was invalid, or a user was rejected.
    BadRequest(String),
    /// The requested site or record does not exist.
    NotFound(String),
    /// A downstream service failed.
    BadGateway(String),
    /// Internal server error.
    Internal(String),
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Unauthorized(msg)
            | Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::BadGateway(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.message(), "request failed");
        }
        let page = Page {
            title: "Error",
            user: None,
            base: "",
        };
        let mut response =
            (status, views::render(page, &views::error_panel(self.message()))).into_response();
        response
            .extensions_mut()
            .insert(ErrorMessage(self.message().to_owned()));
        response
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        Self::Unauthorized(err.to_string())
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Token(inner) => inner.into(),
            ClientError::InvalidRequest { .. } => Self::BadRequest(err.to_string()),
            ClientError::Network { .. }
            | ClientError::Timeout { .. }
            | ClientError::UnexpectedStatus { .. }
            | ClientError::Decode { .. }
            | ClientError::Rejected { .. } => Self::BadGateway(err.to_string()),
        }
    }
}

impl From<SiteError> for AppError {
    fn from(err: SiteError) -> Self {
        match err {
            SiteError::Discovery(inner) => inner.into(),
            SiteError::NotFound { .. } => Self::NotFound(err.to_string()),
            SiteError::CredentialEncryption { .. } => Self::BadRequest(err.to_string()),
            SiteError::CredentialDecryption { .. } => Self::Internal(err.to_string()),
            SiteError::StorageSession { .. } | SiteError::StorageListing { .. } => {
                Self::BadGateway(err.to_string())
            }
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Rejected { .. } => Self::BadRequest(err.to_string()),
            AccountError::Encryption(_) => Self::Internal(err.to_string()),
            AccountError::Client(inner) => inner.into(),
        }
    }
}

impl From<CaptchaError> for AppError {
    fn from(err: CaptchaError) -> Self {
        Self::BadGateway(err.to_string())
    }
}
