//! Per-client token buckets in front of the `/mcp` routes.
//!
//! Each client IP gets its own bucket holding up to `burst` tokens, refilled at
//! `refill_per_sec`. An empty bucket answers `429 Too Many Requests` with a
//! `Retry-After` header.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tracing::warn;

use playbook_config::schema::RateLimitConfig;

use crate::AppState;

/// Buckets idle for longer than this are dropped by [`RateLimiter::cleanup`].
const IDLE_EVICTION: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(burst: u32) -> Self {
        Self {
            tokens: burst as f64,
            last_refill: Instant::now(),
        }
    }

    /// Refill for the elapsed time, then try to take one token.
    fn try_consume(&mut self, burst: u32, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(burst as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn retry_after(&self, refill_per_sec: f64) -> u64 {
        if refill_per_sec <= 0.0 {
            return 60;
        }
        let needed = 1.0 - self.tokens;
        (needed / refill_per_sec).ceil().max(1.0) as u64
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    burst: u32,
    refill_per_sec: f64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            burst: config.burst,
            refill_per_sec: config.refill_per_sec,
        }
    }

    /// `Err(retry_after_secs)` when `ip` is out of tokens.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut bucket = self
            .buckets
            .entry(ip)
            .or_insert_with(|| Bucket::new(self.burst));
        if bucket.try_consume(self.burst, self.refill_per_sec) {
            Ok(())
        } else {
            Err(bucket.retry_after(self.refill_per_sec))
        }
    }

    /// Drop idle buckets. Run periodically from a background task.
    pub fn cleanup(&self) {
        let Some(cutoff) = Instant::now().checked_sub(IDLE_EVICTION) else {
            return;
        };
        self.buckets.retain(|_, bucket| bucket.last_refill > cutoff);
    }
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(req).await;
    };
    let ip = extract_client_ip(&req);

    match limiter.check(ip) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            warn!(client_ip = %ip, retry_after, "rate limited");
            state.metrics.inc_rate_limit_rejections();
            state.metrics.inc_http_errors();
            let mut resp = (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Rate limit exceeded. Retry after {retry_after} seconds."),
            )
                .into_response();
            resp.headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
            resp
        }
    }
}

/// Client IP from `x-forwarded-for`, then `x-real-ip`, then the socket peer.
fn extract_client_ip(req: &Request<axum::body::Body>) -> IpAddr {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return ip;
    }
    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(val) = real_ip.to_str()
        && let Ok(ip) = val.trim().parse::<IpAddr>()
    {
        return ip;
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
