use axum::{
    middleware::{self, from_fn_with_state},
    response::Json,
    routing::{get, patch, post, put},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use super::{contact, content::resource_router, AppState};
use crate::auth::api as auth_api;
use crate::content::{BlogPost, Experience, Project, Service, Testimonial};
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitPolicy};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(auth_routes(&state))
        .merge(resource_router::<BlogPost>(&state))
        .merge(resource_router::<Project>(&state))
        .merge(resource_router::<Service>(&state))
        .merge(resource_router::<Testimonial>(&state))
        .merge(resource_router::<Experience>(&state))
        .merge(contact::router(&state))
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Credential endpoints get the strict budget, account endpoints the API one.
fn auth_routes(state: &AppState) -> Router<AppState> {
    let credentials = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/register", post(auth_api::register))
        .route_layer(from_fn_with_state(
            state.gate(RateLimitPolicy::AUTH),
            rate_limit_middleware,
        ));

    let account = Router::new()
        .route("/api/auth/me", get(auth_api::me))
        .route("/api/auth/password", put(auth_api::change_password))
        .route("/api/admin/users", get(auth_api::list_users))
        .route("/api/admin/users/:id", patch(auth_api::update_user))
        .route_layer(from_fn_with_state(
            state.gate(RateLimitPolicy::API),
            rate_limit_middleware,
        ));

    credentials.merge(account)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
