//! Public pages: home, login, logout and user registration.

use std::sync::Arc;

use axum::extract::{Extension, Form, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::{info, warn};

use orecast_core::account::Registration;

use crate::error::AppError;
use crate::middleware::found;
use crate::routes::page;
use crate::session::{self, Identity};
use crate::state::AppState;
use crate::views;

/// Build the public router. Login and registration submissions share one
/// concurrency limit of `form_concurrency`.
pub fn router(form_concurrency: usize) -> Router<Arc<AppState>> {
    let limit = GlobalConcurrencyLimitLayer::new(form_concurrency);
    Router::new()
        .route("/", get(index))
        .route(
            "/login",
            get(login_page).merge(axum::routing::post(login).layer(limit.clone())),
        )
        .route("/logout", get(logout))
        .route(
            "/registry",
            get(registry_page).merge(axum::routing::post(register).layer(limit)),
        )
}

async fn index(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<Identity>>,
) -> Html<String> {
    let identity = identity.map(|Extension(i)| i);
    let user = identity.as_ref().map(|i| i.user.as_str());
    page(&state, "OreCast", identity.as_ref(), &views::index(user, &state.base))
}

async fn login_page(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<Identity>>,
) -> Html<String> {
    let identity = identity.map(|Extension(i)| i);
    page(&state, "Login", identity.as_ref(), &views::login_form(&state.base))
}

#[derive(Deserialize)]
struct LoginForm {
    user: String,
    password: String,
}

/// Check the credentials with authz, then set the `user` cookie and go home.
async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let user = form.user.trim();
    if user.is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest("user and password are required".to_owned()));
    }

    state.accounts.login(user, &form.password).await?;
    info!(user = %user, "user logged in");

    let mut response = found(state.url("/"));
    response.headers_mut().insert(
        SET_COOKIE,
        session::login_cookie(user, state.cookie_domain.as_deref()),
    );
    Ok(response)
}

async fn logout(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<Identity>>,
) -> Response {
    if let Some(Extension(identity)) = identity {
        info!(user = %identity.user, "user logged out");
    }
    let mut response = found(state.url("/"));
    response.headers_mut().insert(
        SET_COOKIE,
        session::logout_cookie(state.cookie_domain.as_deref()),
    );
    response
}

async fn registry_page(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<Identity>>,
) -> Html<String> {
    let identity = identity.map(|Extension(i)| i);
    let form = views::registration_form(&state.base, state.captcha.public_key());
    page(&state, "Registration", identity.as_ref(), &form)
}

#[derive(Deserialize)]
struct RegistryForm {
    login: String,
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default, rename = "g-recaptcha-response")]
    captcha: String,
}

/// Verify the captcha, create the account, and sign the new user in.
async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<RegistryForm>,
) -> Result<Response, AppError> {
    let login = form.login.trim().to_owned();
    if login.is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest("login and password are required".to_owned()));
    }

    let remote_ip = forwarded_for(&headers);
    if !state.captcha.verify(&form.captcha, remote_ip.as_deref()).await? {
        warn!(user = %login, "registration refused by captcha");
        return Err(AppError::BadRequest("captcha verification failed".to_owned()));
    }

    let registration = Registration {
        login,
        password: form.password,
        first_name: form.first_name,
        last_name: form.last_name,
        email: form.email,
    };
    state.accounts.register(&registration).await?;
    info!(user = %registration.login, "user registered");

    let identity = Identity {
        user: registration.login.clone(),
    };
    let content = views::success_panel(&format!("user {} is registered", registration.login));
    let html = page(&state, "Registration", Some(&identity), &content);
    let cookie = session::login_cookie(&registration.login, state.cookie_domain.as_deref());
    Ok((StatusCode::OK, [(SET_COOKIE, cookie)], html).into_response())
}

/// First address of `X-Forwarded-For`, if any.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_owned())
        .filter(|ip| !ip.is_empty())
}
