//! Middleware for observability and rate limiting.
//!
//! This module provides:
//! - Request logging with latency tracking
//! - Fixed-window rate limiting per client identifier

pub mod logging;
pub mod rate_limit;

pub use logging::request_logging;
pub use rate_limit::{
    client_identifier, rate_limit_middleware, RateLimitDecision, RateLimitGate, RateLimitPolicy,
    RateLimiter, SweepTask,
};
