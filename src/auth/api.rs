//! Authentication API Endpoints
//! Mission: Provide login, registration and account management endpoints

use crate::api::{
    parse_json,
    response::{created, ok},
    run_blocking, ApiError, ApiResponse, AppState,
};
use crate::auth::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest, UpdateUserRequest, User,
    UserResponse, UserRole, SUPER_ADMIN_ROLES,
};
use crate::auth::user_store::Registration;
use crate::validation::{is_valid_email, FieldErrors};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
};
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const REGISTRATION_CLOSED: &str = "Registration is disabled";

/// Login endpoint - POST /api/auth/login
pub async fn login(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: LoginRequest = parse_json(&body)?;

    let mut errors = FieldErrors::new();
    if payload.email.trim().is_empty() {
        errors.add("email", "Email is required");
    }
    if payload.password.is_empty() {
        errors.add("password", "Password is required");
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let users = state.users.clone();
    let email = payload.email.clone();
    let user = run_blocking(move || users.verify_password(&email, &payload.password)).await?;

    let user = match user {
        Some(user) if user.is_active => user,
        Some(user) => {
            warn!(user_id = %user.id, "Login attempt on inactive account");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        None => {
            warn!(email = %payload.email.trim(), "Failed login attempt");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
    };

    state.users.record_login(&user.id)?;
    let (token, expires_in) = state.jwt.issue(&user)?;

    info!(user_id = %user.id, role = user.role.as_str(), "Login successful");

    Ok(ok(ApiResponse::data(LoginResponse {
        token,
        expires_in,
        user: UserResponse::from_user(&user),
    })
    .with_message("Login successful")))
}

/// Registration endpoint - POST /api/auth/register
///
/// Open while no account exists (the first account becomes the super admin),
/// afterwards only when registration is enabled.
pub async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let payload: RegisterRequest = parse_json(&body)?;

    let mut errors = FieldErrors::new();
    errors.require_text("name", "Name", &payload.name, 100);
    if payload.email.trim().is_empty() {
        errors.add("email", "Email is required");
    } else if !is_valid_email(&payload.email) {
        errors.add("email", "Email is invalid");
    }
    check_password(&mut errors, "password", &payload.password);
    if !errors.is_empty() {
        return Err(errors.into());
    }

    // Cheap early exit; the store re-checks inside its transaction.
    let allow_open = state.config.allow_registration;
    if !allow_open && state.users.count()? > 0 {
        return Err(ApiError::Forbidden(REGISTRATION_CLOSED.to_string()));
    }

    let users = state.users.clone();
    let outcome = run_blocking(move || {
        users.register(&payload.name, &payload.email, &payload.password, allow_open)
    })
    .await?;

    let user = match outcome {
        Registration::Created(user) => user,
        Registration::Closed => {
            return Err(ApiError::Forbidden(REGISTRATION_CLOSED.to_string()))
        }
        Registration::EmailTaken => {
            return Err(ApiError::field("email", "Email is already registered"))
        }
    };

    let (token, expires_in) = state.jwt.issue(&user)?;

    Ok(created(
        ApiResponse::data(LoginResponse {
            token,
            expires_in,
            user: UserResponse::from_user(&user),
        })
        .with_message("Registration successful"),
    ))
}

/// Current account - GET /api/auth/me
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let user = state.auth.authenticate(&headers)?;
    Ok(ok(ApiResponse::data(UserResponse::from_user(&user))))
}

/// Change own password - PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let user = state.auth.authenticate(&headers)?;
    let payload: ChangePasswordRequest = parse_json(&body)?;

    let mut errors = FieldErrors::new();
    if payload.current_password.is_empty() {
        errors.add("currentPassword", "Current password is required");
    }
    check_password(&mut errors, "newPassword", &payload.new_password);
    if !errors.is_empty() {
        return Err(errors.into());
    }

    let users = state.users.clone();
    let user_id = user.id;
    let email = user.email.clone();
    let changed = run_blocking(move || {
        if users.verify_password(&email, &payload.current_password)?.is_none() {
            return Ok(false);
        }
        users.update_password(&user_id, &payload.new_password)
    })
    .await?;

    if !changed {
        return Err(ApiError::field(
            "currentPassword",
            "Current password is incorrect",
        ));
    }

    info!(user_id = %user.id, "Password changed");
    Ok(ok(ApiResponse::message("Password updated successfully")))
}

/// List accounts - GET /api/admin/users (super admin only)
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.auth.authorize(&headers, SUPER_ADMIN_ROLES)?;

    let users: Vec<UserResponse> = state
        .users
        .list_users()?
        .iter()
        .map(UserResponse::from_user)
        .collect();

    Ok(ok(ApiResponse::data(users)))
}

/// Change role or active flag - PATCH /api/admin/users/:id (super admin only)
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let actor = state.auth.authorize(&headers, SUPER_ADMIN_ROLES)?;
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found("User"))?;
    let payload: UpdateUserRequest = parse_json(&body)?;

    if payload.role.is_none() && payload.is_active.is_none() {
        return Err(ApiError::validation("Nothing to update"));
    }
    if is_self_lockout(&actor, &id, &payload) {
        return Err(ApiError::validation(
            "You cannot demote or deactivate your own account",
        ));
    }

    let user = state
        .users
        .update_account(&id, payload.role, payload.is_active)?
        .ok_or_else(|| ApiError::not_found("User"))?;

    info!(
        actor = %actor.id,
        user_id = %user.id,
        role = user.role.as_str(),
        is_active = user.is_active,
        "Account updated"
    );

    Ok(ok(ApiResponse::data(UserResponse::from_user(&user))
        .with_message("User updated successfully")))
}

fn check_password(errors: &mut FieldErrors, field: &str, password: &str) {
    let length = password.chars().count();
    if length == 0 {
        errors.add(field, "Password is required");
    } else if length < MIN_PASSWORD_LEN {
        errors.add(
            field,
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    } else if length > MAX_PASSWORD_LEN {
        errors.add(
            field,
            format!("Password must be at most {MAX_PASSWORD_LEN} characters"),
        );
    }
}

fn is_self_lockout(actor: &User, target: &Uuid, update: &UpdateUserRequest) -> bool {
    if actor.id != *target {
        return false;
    }
    let demoted = update.role.is_some_and(|role| role != actor.role);
    let deactivated = update.is_active == Some(false);
    demoted || deactivated
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn actor() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Owner".to_string(),
            email: "owner@example.com".to_string(),
            password_hash: String::new(),
            role: UserRole::SuperAdmin,
            is_active: true,
            avatar: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_rules() {
        let mut errors = FieldErrors::new();
        check_password(&mut errors, "password", "short");
        assert_eq!(
            errors.get("password"),
            Some("Password must be at least 8 characters")
        );

        let mut errors = FieldErrors::new();
        check_password(&mut errors, "password", "long enough");
        assert!(errors.is_empty());

        let mut errors = FieldErrors::new();
        check_password(&mut errors, "newPassword", "");
        assert_eq!(errors.get("newPassword"), Some("Password is required"));
    }

    #[test]
    fn test_self_lockout() {
        let owner = actor();
        let demote = UpdateUserRequest {
            role: Some(UserRole::Editor),
            is_active: None,
        };
        let deactivate = UpdateUserRequest {
            role: None,
            is_active: Some(false),
        };
        let same_role = UpdateUserRequest {
            role: Some(UserRole::SuperAdmin),
            is_active: Some(true),
        };

        assert!(is_self_lockout(&owner, &owner.id, &demote));
        assert!(is_self_lockout(&owner, &owner.id, &deactivate));
        assert!(!is_self_lockout(&owner, &owner.id, &same_role));
        assert!(!is_self_lockout(&owner, &Uuid::new_v4(), &demote));
    }
}
