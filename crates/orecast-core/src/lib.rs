//! Core library for the `OreCast` frontend.
//!
//! Contains the authenticated-access layer that every protected page relies
//! on: the credential vault that encrypts site storage keys, the shared
//! service-token cache, the downstream HTTP client that injects that token,
//! and the site resolver that turns a site name into a storage listing. It
//! also carries the typed clients for the metadata, data-management,
//! bookkeeping and authorization services. Nothing here renders HTML.

pub mod account;
pub mod client;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod services;
pub mod site;
pub mod token;
