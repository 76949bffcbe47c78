//! `OreCast` web frontend.
//!
//! Serves the HTML pages of the `OreCast` platform. Public pages (home,
//! login, registration) are open to anyone. Every other page goes through
//! the auth gate, which requires a signed-in user and a valid service token
//! before the handler talks to the discovery, metadata, data-management and
//! bookkeeping services.

pub mod captcha;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod views;
