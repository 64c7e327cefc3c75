use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use moka::future::Cache;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::GovernorError;

use crate::config::RateLimit;
use crate::errors::{describe_window, AppError};

/// Hits counted in one client's current window.
#[derive(Debug)]
struct WindowHits {
    started: Instant,
    count: AtomicU32,
}

/// Fixed-window quota on lead submissions per client.
///
/// Each client key gets a cache entry living exactly one window; its counter
/// resets when the entry expires.
#[derive(Clone)]
pub struct SubmissionLimiter {
    windows: Cache<String, Arc<WindowHits>>,
    limit: RateLimit,
}

impl SubmissionLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let windows = Cache::builder()
            .time_to_live(limit.window)
            .max_capacity(100_000)
            .build();
        Self { windows, limit }
    }

    /// Counts one hit for `key`. Over quota, returns the time left in the window.
    pub async fn check(&self, key: &str) -> Result<(), Duration> {
        let hits = self
            .windows
            .get_with(key.to_string(), async {
                Arc::new(WindowHits {
                    started: Instant::now(),
                    count: AtomicU32::new(0),
                })
            })
            .await;

        let count = hits.count.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        if count > self.limit.max_requests {
            return Err(self.limit.window.saturating_sub(hits.started.elapsed()));
        }
        Ok(())
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }
}

/// Client identity for rate limiting: first `X-Forwarded-For` entry, else the peer IP.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rejects a submission with 429 once its client has spent the window's quota.
pub async fn enforce_submission_limit(
    State(limiter): State<SubmissionLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    if let Err(retry_after) = limiter.check(&key).await {
        let window = limiter.limit().window;
        tracing::warn!("Submission rate limit exceeded for {}", key);
        return AppError::RateLimited {
            message: format!(
                "Too many form submissions from this IP. Please try again after {}.",
                article_window(window)
            ),
            retry_after,
            window,
        }
        .into_response();
    }

    next.run(request).await
}

/// Renders a general limiter rejection with the uniform error body.
pub fn general_limit_response(err: GovernorError, window: Duration) -> Response {
    match err {
        GovernorError::TooManyRequests { wait_time, .. } => {
            tracing::warn!("General rate limit exceeded; retry in {}s", wait_time);
            AppError::RateLimited {
                message: "Too many requests from this IP, please try again later.".to_string(),
                retry_after: Duration::from_secs(wait_time),
                window,
            }
            .into_response()
        }
        other => AppError::InternalError(format!("rate limiter: {}", other)).into_response(),
    }
}

/// "an hour", "a minute", otherwise the plain window description.
fn article_window(window: Duration) -> String {
    match describe_window(window).as_str() {
        "1 hour" => "an hour".to_string(),
        "1 minute" => "a minute".to_string(),
        "1 second" => "a second".to_string(),
        other => other.to_string(),
    }
}
