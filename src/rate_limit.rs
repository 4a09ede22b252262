//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::api::ApiError;
use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REGISTER_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Request budgets per client IP.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitQuotas {
    pub login_per_second: NonZeroU32,
    pub login_burst: NonZeroU32,
    pub register_per_minute: NonZeroU32,
}

impl Default for RateLimitQuotas {
    fn default() -> Self {
        Self {
            login_per_second: LOGIN_PER_SEC,
            login_burst: LOGIN_BURST,
            register_per_minute: REGISTER_PER_MIN,
        }
    }
}

impl RateLimitQuotas {
    /// Budgets large enough that tests never hit them.
    pub fn unlimited() -> Self {
        let high = NonZeroU32::new(10_000).unwrap_or(NonZeroU32::MAX);
        Self {
            login_per_second: high,
            login_burst: high,
            register_per_minute: high,
        }
    }
}

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login (burst, then steady refill)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for registration
    pub register: Arc<IpLimiter>,
    /// Key on `X-Forwarded-For` instead of the socket peer
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    pub fn new(quotas: RateLimitQuotas, trust_forwarded_for: bool) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(quotas.login_per_second).allow_burst(quotas.login_burst),
            )),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(
                quotas.register_per_minute,
            ))),
            trust_forwarded_for,
        }
    }
}

async fn limit(
    limiter: &IpLimiter,
    trust_forwarded_for: bool,
    request: Request,
    next: Next,
    message: &'static str,
) -> Response {
    let ip = match extract_client_ip(&request, trust_forwarded_for) {
        Ok(ip) => ip,
        Err(_) => {
            return ApiError::forbidden("Unable to determine client IP.").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Rate limit exceeded");
            ApiError::too_many_requests(message).into_response()
        }
    }
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    limit(
        &config.login,
        config.trust_forwarded_for,
        request,
        next,
        "Too many authentication attempts. Please wait before trying again.",
    )
    .await
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    limit(
        &config.register,
        config.trust_forwarded_for,
        request,
        next,
        "Too many signup attempts. Please wait before trying again.",
    )
    .await
}
