//! Site pages: the site list, storage resolution and site registration.

use std::sync::Arc;

use axum::extract::{Extension, Form, Path, Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{info, warn};

use orecast_core::site::NewSite;

use crate::error::AppError;
use crate::routes::page;
use crate::session::Identity;
use crate::state::AppState;
use crate::views::{self, SiteRow};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sites", get(list_sites))
        .route("/sites/{site}", get(site_storage))
        .route(
            "/site/registration",
            get(registration_page).post(register_site),
        )
}

/// Every site from discovery, with the number of metadata records each has.
async fn list_sites(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Html<String>, AppError> {
    let sites = state.sites.sites().await?;

    let mut rows = Vec::with_capacity(sites.len());
    for site in sites {
        // A site whose metadata cannot be read is listed with no records.
        let records = match state.services.meta_records(&site.name).await {
            Ok(records) => records.len(),
            Err(e) => {
                warn!(site = %site.name, error = %e, "meta records unavailable");
                0
            }
        };
        rows.push(SiteRow { site, records });
    }

    Ok(page(&state, "Sites", Some(&identity), &views::sites(&state.base, &rows)))
}

#[derive(Deserialize)]
struct BucketQuery {
    #[serde(default)]
    bucket: String,
}

/// Buckets of a site, or the objects of `?bucket=`, read straight from the
/// site's storage.
async fn site_storage(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(site): Path<String>,
    Query(query): Query<BucketQuery>,
) -> Result<Html<String>, AppError> {
    let object = state.sites.resolve(&site, &query.bucket).await?;
    Ok(page(
        &state,
        &site,
        Some(&identity),
        &views::site_object(&query.bucket, &object),
    ))
}

async fn registration_page(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Html<String> {
    page(
        &state,
        "Site registration",
        Some(&identity),
        &views::site_registration_form(&state.base),
    )
}

async fn register_site(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Form(new_site): Form<NewSite>,
) -> Result<Html<String>, AppError> {
    if new_site.name.trim().is_empty() || new_site.endpoint.trim().is_empty() {
        return Err(AppError::BadRequest("site name and endpoint are required".to_owned()));
    }
    state.sites.register(&new_site).await?;
    info!(site = %new_site.name, user = %identity.user, "site registered");

    let content = views::success_panel(&format!("site {} is registered", new_site.name));
    Ok(page(&state, "Site registration", Some(&identity), &content))
}
