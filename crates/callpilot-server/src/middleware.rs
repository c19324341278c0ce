//! Request middleware: rate limiting and API-key auth.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::AppState;

/// In-memory rate limiter using a fixed 60-second window per client IP.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if the request is allowed.
    ///
    /// Returns `true` if allowed, `false` if the limit is exceeded.
    pub fn check(&self, ip: IpAddr, limit: u32) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Recover with stale state rather than refusing every
                // request over a poisoned counter map.
                tracing::error!("rate limiter lock poisoned, recovering with stale state");
                poisoned.into_inner()
            }
        };
        let now = Instant::now();

        // Evict only expired windows so active limits survive the sweep.
        if state.len() > 10_000 {
            state.retain(|_, (_, start)| now.duration_since(*start) <= Duration::from_secs(60));
        }

        let (count, start) = state.entry(ip).or_insert((0, now));

        if now.duration_since(*start) > Duration::from_secs(60) {
            *count = 1;
            *start = now;
            true
        } else {
            *count += 1;
            *count <= limit
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limiting middleware, keyed by client IP.
pub async fn rate_limit_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() else {
        // Router tests drive the service without a socket; skip limiting
        // rather than failing every request.
        return Ok(next.run(req).await);
    };

    if !state.rate_limiter.check(addr.ip(), state.rate_limit_per_minute) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            axum::http::HeaderValue::from_static("60"),
        );
        return Ok(response);
    }

    Ok(next.run(req).await)
}

/// API-key middleware for mutating routes.
///
/// Accepts the key via `X-Api-Key` or `Authorization: Bearer`. When no key
/// is configured the routes are open (the startup log warns about it).
pub async fn require_api_key(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    let Some(expected) = state.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let presented = if let Some(val) = req.headers().get("X-Api-Key") {
        val.to_str().ok()
    } else if let Some(val) = req.headers().get("Authorization") {
        val.to_str().ok().and_then(|v| v.strip_prefix("Bearer "))
    } else {
        None
    };

    match presented {
        Some(key) if key == expected => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check(ip, 5));
        }
        assert!(!limiter.check(ip, 5));
    }

    #[test]
    fn rate_limiter_keys_are_independent() {
        let limiter = RateLimiter::new();
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check(a, 3));
        }
        assert!(!limiter.check(a, 3));
        assert!(limiter.check(b, 3));
    }

    #[test]
    fn eviction_preserves_active_windows() {
        let limiter = RateLimiter::new();

        for i in 0..10_001u32 {
            let ip: IpAddr = std::net::Ipv4Addr::from(i.to_be_bytes()).into();
            limiter.check(ip, 100);
        }

        // The most recent IP's window is still live, so its counter should
        // have survived the sweep.
        let recent: IpAddr = std::net::Ipv4Addr::from(10_000u32.to_be_bytes()).into();
        for _ in 0..99 {
            assert!(limiter.check(recent, 100));
        }
        assert!(!limiter.check(recent, 100));
    }
}
