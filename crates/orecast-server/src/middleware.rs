//! Request-scoped identity middleware.
//!
//! [`auth_gate`] guards every page that talks to a protected service.
//! [`optional_identity`] only reads the cookie, for public pages that show
//! the signed-in user when there is one. [`error_pages`] wraps the whole
//! router.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use crate::error::{AppError, ErrorMessage};
use crate::routes::page;
use crate::session::{self, Identity};
use crate::state::AppState;
use crate::views;

/// Auth gate for identity-requiring routes.
///
/// 1. A `user` cookie puts an [`Identity`] into request extensions and
///    forces a valid service token; failure answers 401.
/// 2. Without a cookie, an `Identity` already in extensions is accepted.
/// 3. Without any identity the caller is redirected to the login page and
///    no downstream call is made.
///
/// Every request that gets past these steps has its token checked once more
/// right before the handler runs.
///
/// # Errors
///
/// [`AppError::Unauthorized`] when no valid service token can be obtained.
pub async fn auth_gate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(user) = session::user_from_headers(req.headers()) {
        debug!(user = %user, "identity from cookie");
        req.extensions_mut().insert(Identity { user });
        state.tokens.ensure_valid().await?;
    } else if let Some(identity) = req.extensions().get::<Identity>() {
        debug!(user = %identity.user, "identity from request context");
    } else {
        info!(path = %req.uri().path(), "no identity, redirecting to login");
        return Ok(found(state.url("/login")));
    }

    state.tokens.ensure_valid().await?;
    Ok(next.run(req).await)
}

/// Attach an [`Identity`] when the `user` cookie is set. Never rejects.
pub async fn optional_identity(mut req: Request, next: Next) -> Response {
    if let Some(user) = session::user_from_headers(req.headers()) {
        req.extensions_mut().insert(Identity { user });
    }
    next.run(req).await
}

/// Render [`AppError`] pages inside the mount path, for the signed-in user.
pub async fn error_pages(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let identity = session::user_from_headers(req.headers())
        .map(|user| Identity { user })
        .or_else(|| req.extensions().get::<Identity>().cloned());

    let response = next.run(req).await;
    let Some(ErrorMessage(message)) = response.extensions().get::<ErrorMessage>().cloned() else {
        return response;
    };
    let status = response.status();
    let content = views::error_panel(&message);
    (status, page(&state, "Error", identity.as_ref(), &content)).into_response()
}

/// `302 Found` to `location`.
pub fn found(location: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}
