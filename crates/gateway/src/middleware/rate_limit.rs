//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use niibot_common::errors::{AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Token bucket shared by every API request
pub struct GlobalRateLimit {
    limiter: GlobalRateLimiter,
    requests_per_second: u32,
}

impl GlobalRateLimit {
    /// Take one token, or report the configured limit
    pub fn check(&self) -> Result<()> {
        self.limiter.check().map_err(|_| AppError::RateLimited {
            limit: self.requests_per_second,
        })
    }
}

/// Create a new rate limiter
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Result<Arc<GlobalRateLimit>> {
    let non_zero = |value: u32, field: &str| {
        NonZeroU32::new(value).ok_or_else(|| AppError::Configuration {
            message: format!("rate_limit.{} must be greater than zero", field),
        })
    };

    let quota = Quota::per_second(non_zero(requests_per_second, "requests_per_second")?)
        .allow_burst(non_zero(burst, "burst")?);

    Ok(Arc::new(GlobalRateLimit {
        limiter: RateLimiter::direct(quota),
        requests_per_second,
    }))
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<Arc<GlobalRateLimit>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Err(e) = limit.check() {
        tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
        return Err(e);
    }
    Ok(next.run(request).await)
}
