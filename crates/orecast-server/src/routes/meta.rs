//! Metadata pages.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::routes::page;
use crate::session::Identity;
use crate::state::AppState;
use crate::views;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/meta/{site}", get(site_records))
        .route("/meta/record/{mid}", get(record))
}

/// Site summary followed by its metadata records.
async fn site_records(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(site): Path<String>,
) -> Result<Html<String>, AppError> {
    let summary = state.sites.site(&site).await?;
    let records = state.services.meta_records(&site).await?;
    Ok(page(
        &state,
        &site,
        Some(&identity),
        &views::meta_records(&state.base, &summary, &records),
    ))
}

async fn record(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(mid): Path<String>,
) -> Result<Html<String>, AppError> {
    let record = state.services.meta_record(&mid).await?;
    Ok(page(
        &state,
        "Meta record",
        Some(&identity),
        &views::meta_record(&state.base, &record),
    ))
}
