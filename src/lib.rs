//! Folio Backend Library
//!
//! API server of a personal portfolio site: published content, a contact
//! form and the accounts that manage them. Exposes every module for use by
//! the binary and the integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod mailer;
pub mod middleware;
pub mod validation;

pub use api::{create_router, AppState};
pub use config::AppConfig;
