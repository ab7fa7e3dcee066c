use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::Mutex;
use tracing::warn;

use scriptshop_shared::protocol::ErrorBody;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_seen: Instant,
}

impl TokenBucket {
    fn full(burst: f64) -> Self {
        Self {
            tokens: burst,
            last_seen: Instant::now(),
        }
    }

    /// Take one token, or report how many seconds until one is available.
    fn take(&mut self, per_sec: f64, burst: f64) -> Result<(), f64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_seen).as_secs_f64();
        self.last_seen = now;
        self.tokens = (self.tokens + elapsed * per_sec).min(burst);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else if per_sec > 0.0 {
            Err((1.0 - self.tokens) / per_sec)
        } else {
            Err(f64::INFINITY)
        }
    }
}

/// Per-client-IP token buckets shared by every request.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, TokenBucket>>>,
    per_sec: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(per_sec: f64, burst: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            per_sec,
            burst: burst.max(1.0),
        }
    }

    /// `Err(retry_after_secs)` when the client is over its budget.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::full(self.burst))
            .take(self.per_sec, self.burst)
            .map_err(|wait| wait.ceil().min(3600.0) as u64)
    }

    /// Drop buckets untouched for `max_idle_secs`.
    pub async fn purge_stale(&self, max_idle_secs: f64) -> usize {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, b| now.duration_since(b.last_seen).as_secs_f64() < max_idle_secs);
        before - buckets.len()
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Some(ip) = client_ip(&req) {
        if let Err(retry_after) = limiter.check(ip).await {
            warn!(ip = %ip, retry_after, "Rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody {
                    error: "Too many requests".to_string(),
                }),
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.max(1)));
            return response;
        }
    }

    next.run(req).await
}

/// Proxy headers win over the socket address, since the service normally
/// sits behind a reverse proxy.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    let header_ip = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip())
        })
}
