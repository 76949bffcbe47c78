//! Bookkeeping pages.

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
        .route("/datasets", get(all_datasets))
        .route("/datasets/{name}", get(dataset))
}

async fn all_datasets(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Html<String>, AppError> {
    let records = state.services.datasets().await?;
    Ok(page(
        &state,
        "Datasets",
        Some(&identity),
        &views::datasets(&state.base, &records),
    ))
}

async fn dataset(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Html<String>, AppError> {
    let records = state.services.dataset(&name).await?;
    if records.is_empty() {
        return Err(AppError::NotFound(format!("dataset '{name}' not found")));
    }
    Ok(page(
        &state,
        &name,
        Some(&identity),
        &views::datasets(&state.base, &records),
    ))
}
