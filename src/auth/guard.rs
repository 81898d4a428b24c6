//! Authentication Guard
//!
//! Resolves the bearer credential on a request to a freshly loaded user and
//! checks role membership. Token claims only identify the user; role and
//! active status always come from the store, so a deactivation or role change
//! applies to the very next request.

use crate::auth::{
    jwt::JwtHandler,
    models::{User, UserRole},
    user_store::UserStore,
};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Why a request was not authenticated. Only used for logging; every variant
/// answers the same 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unauthenticated {
    MissingToken,
    InvalidToken,
    UnknownUser,
    Inactive,
}

/// Guard outcome when a request is turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    Unauthorized(Unauthenticated),
    Forbidden,
    /// The user store could not be read.
    Internal,
}

impl AuthFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthFailure::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthFailure::Forbidden => StatusCode::FORBIDDEN,
            AuthFailure::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::Unauthorized(_) => "Unauthorized",
            AuthFailure::Forbidden => "Forbidden - Insufficient permissions",
            AuthFailure::Internal => "Internal server error",
        }
    }
}

/// Bearer token from the `Authorization` header, if present and well formed
pub fn extract_credential(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

#[derive(Clone)]
pub struct AuthGuard {
    jwt: Arc<JwtHandler>,
    users: Arc<UserStore>,
}

impl AuthGuard {
    pub fn new(jwt: Arc<JwtHandler>, users: Arc<UserStore>) -> Self {
        Self { jwt, users }
    }

    pub fn jwt(&self) -> &JwtHandler {
        &self.jwt
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Resolve the request's credential to an active user.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<User, AuthFailure> {
        let token = extract_credential(headers)
            .ok_or(AuthFailure::Unauthorized(Unauthenticated::MissingToken))?;

        let claims = self
            .jwt
            .verify(token)
            .ok_or(AuthFailure::Unauthorized(Unauthenticated::InvalidToken))?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthFailure::Unauthorized(Unauthenticated::InvalidToken))?;

        let user = self
            .users
            .find_by_id(&user_id)
            .map_err(|e| {
                error!(user_id = %user_id, error = %e, "User lookup failed during authentication");
                AuthFailure::Internal
            })?
            .ok_or(AuthFailure::Unauthorized(Unauthenticated::UnknownUser))?;

        if !user.is_active {
            debug!(user_id = %user.id, "Rejected credential of inactive user");
            return Err(AuthFailure::Unauthorized(Unauthenticated::Inactive));
        }

        Ok(user)
    }

    /// Authenticate, then require the user's current role to be in `allowed`.
    pub fn authorize(&self, headers: &HeaderMap, allowed: &[UserRole]) -> Result<User, AuthFailure> {
        let user = self.authenticate(headers)?;

        if !allowed.contains(&user.role) {
            debug!(
                user_id = %user.id,
                role = user.role.as_str(),
                "Rejected request for insufficient role"
            );
            return Err(AuthFailure::Forbidden);
        }

        Ok(user)
    }
}
