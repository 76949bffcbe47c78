//! HTTP routes for the frontend.
//!
//! Public pages (home, login, logout, registration) only read the identity
//! cookie. Everything else sits behind [`auth_gate`].

pub mod datasets;
pub mod meta;
pub mod sites;
pub mod storage;
pub mod ui;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header;
use axum::middleware as axum_mw;
use axum::response::Html;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{auth_gate, error_pages, optional_identity};
use crate::session::Identity;
use crate::state::AppState;
use crate::views::{self, Page};

/// Build the full application router.
///
/// `form_concurrency` bounds simultaneous login and registration
/// submissions. `static_dir`, when set, is served under `/static`.
pub fn build_router(state: Arc<AppState>, static_dir: Option<&str>, form_concurrency: usize) -> Router {
    let protected = Router::new()
        .merge(sites::router())
        .merge(meta::router())
        .merge(datasets::router())
        .merge(storage::router())
        .route_layer(axum_mw::from_fn_with_state(Arc::clone(&state), auth_gate));

    let public = ui::router(form_concurrency).route_layer(axum_mw::from_fn(optional_identity));

    let mut app = Router::new().merge(public).merge(protected);
    if let Some(dir) = static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }
    if !state.base.is_empty() {
        app = Router::new().nest(&state.base, app);
    }

    app.layer(axum_mw::from_fn_with_state(Arc::clone(&state), error_pages))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Render `content` inside the page chrome for the current user.
pub(crate) fn page(state: &AppState, title: &str, identity: Option<&Identity>, content: &str) -> Html<String> {
    views::render(
        Page {
            title,
            user: identity.map(|i| i.user.as_str()),
            base: &state.base,
        },
        content,
    )
}
