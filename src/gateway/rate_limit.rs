//! Per-client sliding-window rate limiting for the API and the login route.

use super::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Sliding window used by every limiter.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// How often the limiter sweeps idle clients from its map.
const RATE_LIMITER_SWEEP_INTERVAL_SECS: u64 = 300; // 5 minutes

#[derive(Debug)]
struct ClientHits {
    /// Request instants per client, oldest first.
    by_client: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

/// One bucket: at most `limit` requests per client inside `window`.
#[derive(Debug)]
struct SlidingWindow {
    limit: usize,
    window: Duration,
    hits: Mutex<ClientHits>,
}

impl SlidingWindow {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            hits: Mutex::new(ClientHits {
                by_client: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    fn allow(&self, client: &str) -> bool {
        if self.limit == 0 {
            return true;
        }
        let now = Instant::now();
        let mut hits = self.hits.lock();

        let sweep_every = Duration::from_secs(RATE_LIMITER_SWEEP_INTERVAL_SECS);
        if now.duration_since(hits.last_sweep) >= sweep_every {
            let window = self.window;
            hits.by_client.retain(|_, seen| {
                seen.back().is_some_and(|last| now.duration_since(*last) < window)
            });
            hits.last_sweep = now;
        }

        let seen = hits.by_client.entry(client.to_owned()).or_default();
        while seen.front().is_some_and(|first| now.duration_since(*first) >= self.window) {
            seen.pop_front();
        }
        if seen.len() >= self.limit {
            return false;
        }
        seen.push_back(now);
        true
    }
}

/// Independent buckets for login attempts and general API traffic.
#[derive(Debug)]
pub struct GatewayRateLimiter {
    login: SlidingWindow,
    api: SlidingWindow,
}

impl GatewayRateLimiter {
    /// A limit of `0` disables that bucket.
    pub fn new(login_per_minute: u32, api_per_minute: u32) -> Self {
        let window = Duration::from_secs(RATE_LIMIT_WINDOW_SECS);
        Self {
            login: SlidingWindow::new(login_per_minute, window),
            api: SlidingWindow::new(api_per_minute, window),
        }
    }

    pub fn allow_login(&self, key: &str) -> bool {
        self.login.allow(key)
    }

    pub fn allow_api(&self, key: &str) -> bool {
        self.api.allow(key)
    }
}

fn client_key_from_headers(headers: &HeaderMap) -> Option<String> {
    for header_name in ["X-Forwarded-For", "X-Real-IP"] {
        if let Some(value) = headers.get(header_name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or("").trim();
            if !first.is_empty() {
                return Some(first.to_owned());
            }
        }
    }
    None
}

/// Peer IP when the server exposes it, else forwarding headers, else `unknown`.
fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    client_key_from_headers(request.headers()).unwrap_or_else(|| "unknown".into())
}

fn too_many_requests(message: &str) -> Response {
    let body = serde_json::json!({
        "success": false,
        "message": message,
        "retry_after": RATE_LIMIT_WINDOW_SECS,
    });
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

/// Applied to every `/api` route.
pub async fn limit_api(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    if !state.rate_limiter.allow_api(&key) {
        tracing::warn!(client = %key, "API rate limit exceeded");
        return too_many_requests("Too many requests, please slow down.");
    }
    next.run(request).await
}

/// Applied to `POST /api/auth/login` on top of [`limit_api`].
pub async fn limit_login(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    if !state.rate_limiter.allow_login(&key) {
        tracing::warn!(client = %key, "Login rate limit exceeded");
        return too_many_requests("Too many login attempts, please try again later.");
    }
    next.run(request).await
}
