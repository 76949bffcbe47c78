//! Data-management pages: buckets, objects, and bucket create/delete.

use std::sync::Arc;

use axum::extract::{Extension, Form, Path, Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::routes::page;
use crate::session::Identity;
use crate::state::AppState;
use crate::views::{self, BucketAction};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/storage/create", get(create_form).post(create_bucket))
        .route("/storage/delete", get(delete_form).post(delete_bucket))
        .route("/storage/{site}", get(buckets))
        .route("/storage/{site}/{bucket}", get(objects))
}

async fn buckets(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(site): Path<String>,
) -> Result<Html<String>, AppError> {
    let data = state.services.site_buckets(&site).await?;
    Ok(page(&state, &site, Some(&identity), &views::buckets(&state.base, &data)))
}

async fn objects(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((site, bucket)): Path<(String, String)>,
) -> Result<Html<String>, AppError> {
    let data = state.services.bucket_objects(&site, &bucket).await?;
    Ok(page(&state, &bucket, Some(&identity), &views::objects(&data)))
}

#[derive(Deserialize)]
struct SiteQuery {
    #[serde(default)]
    site: String,
}

async fn create_form(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<SiteQuery>,
) -> Html<String> {
    let form = views::bucket_form(&state.base, &query.site, BucketAction::Create);
    page(&state, "Create bucket", Some(&identity), &form)
}

async fn delete_form(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<SiteQuery>,
) -> Html<String> {
    let form = views::bucket_form(&state.base, &query.site, BucketAction::Delete);
    page(&state, "Delete bucket", Some(&identity), &form)
}

#[derive(Deserialize)]
struct BucketForm {
    site: String,
    bucket: String,
}

impl BucketForm {
    fn validate(&self) -> Result<(), AppError> {
        if self.site.trim().is_empty() || self.bucket.trim().is_empty() {
            return Err(AppError::BadRequest("site and bucket are required".to_owned()));
        }
        Ok(())
    }
}

async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Form(form): Form<BucketForm>,
) -> Result<Html<String>, AppError> {
    form.validate()?;
    state.services.create_bucket(&form.site, &form.bucket).await?;
    info!(site = %form.site, bucket = %form.bucket, user = %identity.user, "bucket created");
    let content = views::success_panel(&format!("bucket {} is created at {}", form.bucket, form.site));
    Ok(page(&state, "Create bucket", Some(&identity), &content))
}

async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Form(form): Form<BucketForm>,
) -> Result<Html<String>, AppError> {
    form.validate()?;
    state.services.delete_bucket(&form.site, &form.bucket).await?;
    info!(site = %form.site, bucket = %form.bucket, user = %identity.user, "bucket deleted");
    let content = views::success_panel(&format!("bucket {} is deleted at {}", form.bucket, form.site));
    Ok(page(&state, "Delete bucket", Some(&identity), &content))
}
