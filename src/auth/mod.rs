//! Authentication Module
//! Mission: Secure API access with JWT tokens and role checks

pub mod api;
pub mod guard;
pub mod jwt;
pub mod models;
pub mod user_store;

pub use guard::{AuthFailure, AuthGuard};
pub use jwt::JwtHandler;
pub use models::{Claims, User, UserRole};
pub use user_store::UserStore;
