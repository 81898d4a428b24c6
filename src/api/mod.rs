//! HTTP surface
//!
//! Every route follows the same order: rate limit (router layer), then
//! authorize, then parse and validate, then one store call, then the
//! response envelope.

pub mod contact;
pub mod content;
pub mod response;
pub mod routes;

use crate::{
    auth::{AuthGuard, JwtHandler, UserStore},
    config::AppConfig,
    content::{Collection, Document},
    db::Database,
    mailer::Mailer,
    middleware::{RateLimitGate, RateLimitPolicy, RateLimiter},
};
use axum::body::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub use response::{ApiError, ApiResponse, Pagination};
pub use routes::create_router;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub users: Arc<UserStore>,
    pub jwt: Arc<JwtHandler>,
    pub auth: AuthGuard,
    pub limiter: RateLimiter,
    pub mailer: Mailer,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        jwt: Arc<JwtHandler>,
        limiter: RateLimiter,
        mailer: Mailer,
        config: Arc<AppConfig>,
    ) -> Self {
        let users = Arc::new(UserStore::new(db.clone(), config.bcrypt_cost));
        let auth = AuthGuard::new(jwt.clone(), users.clone());
        Self {
            db,
            users,
            jwt,
            auth,
            limiter,
            mailer,
            config,
        }
    }

    pub fn gate(&self, policy: RateLimitPolicy) -> RateLimitGate {
        RateLimitGate::new(self.limiter.clone(), policy)
    }

    pub fn collection<T: Document>(&self) -> Collection<T> {
        Collection::new(self.db.clone())
    }
}

/// Decode a JSON request body, mapping failures to a 400.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::validation("Request body is required"));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::validation(format!("Invalid request body: {e}")))
}

/// Run blocking store or hashing work off the async runtime.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Server(anyhow::anyhow!("Blocking task failed: {e}")))?
        .map_err(ApiError::from)
}
