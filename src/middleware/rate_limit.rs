//! Rate limiting middleware.
//!
//! In-memory fixed-window counters keyed by policy and client identifier.
//! Every request counts against the window, including the ones that are
//! rejected, so sustained overload keeps the client locked out until the
//! window resets.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::oneshot, task::JoinHandle, time::interval};
use tracing::{debug, info, warn};

use crate::api::ApiError;

/// Identifier shared by every client that sends neither forwarding header.
pub const FALLBACK_CLIENT_ID: &str = "unknown";

/// Default period of the background sweep.
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Window length and budget for one class of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitPolicy {
    pub const fn new(name: &'static str, window: Duration, max_requests: u32) -> Self {
        Self {
            name,
            window,
            max_requests,
        }
    }

    /// Login and registration: 5 per 15 minutes.
    pub const AUTH: Self = Self::new("auth", Duration::from_secs(15 * 60), 5);
    /// Authenticated API calls: 60 per minute.
    pub const API: Self = Self::new("api", Duration::from_secs(60), 60);
    /// Anonymous reads: 100 per minute.
    pub const PUBLIC: Self = Self::new("public", Duration::from_secs(60), 100);
    /// Contact form submissions: 3 per hour.
    pub const CONTACT: Self = Self::new("contact", Duration::from_secs(60 * 60), 3);

    pub fn presets() -> [Self; 4] {
        [Self::AUTH, Self::API, Self::PUBLIC, Self::CONTACT]
    }

    fn window_delta(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.window.as_millis() as i64)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: DateTime<Utc>,
}

/// Outcome of a single `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Time left until the window resets, rounded up to whole seconds.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        Duration::from_secs(millis.div_ceil(1000))
    }
}

/// Process-wide token store. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct RateLimiter {
    entries: Arc<Mutex<HashMap<(&'static str, String), RateLimitEntry>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request from `client_id` against `policy`.
    pub fn check(
        &self,
        policy: &RateLimitPolicy,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let mut entries = self.entries.lock();

        let entry = entries
            .entry((policy.name, client_id.to_string()))
            .or_insert(RateLimitEntry {
                count: 0,
                window_reset_at: now + policy.window_delta(),
            });

        if entry.window_reset_at <= now {
            *entry = RateLimitEntry {
                count: 0,
                window_reset_at: now + policy.window_delta(),
            };
        }

        entry.count = entry.count.saturating_add(1);

        RateLimitDecision {
            allowed: entry.count <= policy.max_requests,
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(entry.count),
            reset_at: entry.window_reset_at,
        }
    }

    /// Drop every entry whose window has already ended. Returns the number removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.window_reset_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic sweep. The task runs until the returned handle is
    /// stopped or dropped.
    pub fn start_sweeper(&self, period: Duration) -> SweepTask {
        let limiter = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep(Utc::now());
                        if removed > 0 {
                            debug!(removed, remaining = limiter.len(), "Swept expired rate-limit entries");
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        info!(period_secs = period.as_secs(), "Rate-limit sweeper started");

        SweepTask {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Handle to the background sweep started by [`RateLimiter::start_sweeper`].
pub struct SweepTask {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SweepTask {
    /// Signal the sweep loop to exit and wait for it.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Rate-limit sweeper stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Client identifier for rate limiting: first `x-forwarded-for` hop, then
/// `x-real-ip`, then [`FALLBACK_CLIENT_ID`].
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(FALLBACK_CLIENT_ID)
        .to_string()
}

/// Middleware state: the shared limiter plus the policy for one route group.
#[derive(Clone)]
pub struct RateLimitGate {
    pub limiter: RateLimiter,
    pub policy: RateLimitPolicy,
}

impl RateLimitGate {
    pub fn new(limiter: RateLimiter, policy: RateLimitPolicy) -> Self {
        Self { limiter, policy }
    }
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(gate): State<RateLimitGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_id = client_identifier(request.headers());
    let now = Utc::now();
    let decision = gate.limiter.check(&gate.policy, &client_id, now);

    if !decision.allowed {
        let retry_after = decision.retry_after(now);
        warn!(
            client_id = %client_id,
            policy = gate.policy.name,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );

        let mut response = ApiError::RateLimited.into_response();
        apply_headers(response.headers_mut(), &decision);
        response.headers_mut().insert(
            "Retry-After",
            HeaderValue::from(retry_after.as_secs()),
        );
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}
