//! Per-client rate limiting for credential endpoints.
//!
//! Limits how many register and login attempts one client address can make
//! within a sliding time window. Clients are keyed by the socket peer unless
//! the server runs behind a trusted proxy, in which case the first
//! `x-forwarded-for` entry is used.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::logging::log_security_event;

/// Attempts allowed per client within [`CREDENTIAL_WINDOW`]
pub const CREDENTIAL_MAX_REQUESTS: usize = 5;

/// Window for credential endpoints
pub const CREDENTIAL_WINDOW: Duration = Duration::from_secs(60);

/// Most clients tracked at once; new clients beyond this are rejected
pub const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Example
    ///
    /// ```
    /// use recipe_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Allow 5 requests per minute
    /// let limiter = RateLimiter::new(5, Duration::from_secs(60));
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// Check if a request should be allowed
    ///
    /// Returns `true` if the request is allowed, `false` if rate limit exceeded.
    ///
    /// # Example
    ///
    /// ```
    /// # use recipe_server::api::rate_limiter::RateLimiter;
    /// # use std::time::Duration;
    /// let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
    ///
    /// for _ in 0..5 {
    ///     assert!(limiter.check());
    /// }
    ///
    /// assert!(!limiter.check());
    /// ```
    pub fn check(&mut self) -> bool {
        self.evict_expired(Instant::now());

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(Instant::now());
        true
    }

    /// Number of remaining requests allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    /// Time until the oldest request leaves the window
    ///
    /// Returns `None` if there are no requests in the current window.
    pub fn reset_in(&self) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = Instant::now().duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_idle(&mut self, now: Instant) -> bool {
        self.evict_expired(now);
        self.timestamps.is_empty()
    }
}

/// Sliding-window limiters keyed by client address
#[derive(Debug)]
pub struct ClientRateLimiter {
    clients: Mutex<HashMap<String, RateLimiter>>,
    max_requests: usize,
    window: Duration,
    max_clients: usize,
    trust_proxy_headers: bool,
}

/// Client address resolved by [`rate_limit_middleware`], available to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub Option<IpAddr>);

impl ClientAddr {
    /// Key the client is limited under
    pub fn key(&self) -> String {
        self.0
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Outcome of a rejected check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter(pub Duration);

impl ClientRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            max_requests,
            window,
            max_clients: MAX_TRACKED_CLIENTS,
            trust_proxy_headers: false,
        }
    }

    /// Cap on simultaneously tracked clients
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Key clients on `x-forwarded-for` rather than the socket peer
    pub fn with_trusted_proxy(mut self, trust_proxy_headers: bool) -> Self {
        self.trust_proxy_headers = trust_proxy_headers;
        self
    }

    pub fn trusts_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }

    /// Limiter for register and login: 5 attempts per minute
    pub fn credentials() -> Self {
        Self::new(CREDENTIAL_MAX_REQUESTS, CREDENTIAL_WINDOW)
    }

    /// Record an attempt by `client`
    pub fn check(&self, client: &str) -> Result<(), RetryAfter> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !clients.contains_key(client) && clients.len() >= self.max_clients {
            let now = Instant::now();
            clients.retain(|_, limiter| !limiter.is_idle(now));

            if clients.len() >= self.max_clients {
                return Err(RetryAfter(self.window));
            }
        }

        let limiter = clients
            .entry(client.to_string())
            .or_insert_with(|| RateLimiter::new(self.max_requests, self.window));

        if limiter.check() {
            Ok(())
        } else {
            Err(RetryAfter(limiter.reset_in().unwrap_or(self.window)))
        }
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .map(|clients| clients.len())
            .unwrap_or_default()
    }
}

/// Resolve the client address of a request
///
/// The socket peer is authoritative. With `trust_proxy_headers` the first
/// parsable `x-forwarded-for` entry takes precedence.
pub fn client_addr(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> ClientAddr {
    let forwarded = trust_proxy_headers
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    ClientAddr(forwarded.or_else(|| peer.map(|addr| addr.ip())))
}

/// Middleware rejecting clients over their credential budget with `429`
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<ClientRateLimiter>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_addr(request.headers(), peer, limiter.trusts_proxy_headers());

    match limiter.check(&client.key()) {
        Ok(()) => {
            request.extensions_mut().insert(client);
            next.run(request).await
        }
        Err(RetryAfter(retry_after)) => {
            log_security_event(
                "rate_limited",
                None,
                client.0,
                &format!("Too many attempts on {}", request.uri().path()),
            );

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "Too many requests" })),
            )
                .into_response();
            response.headers_mut().insert(
                "retry-after",
                retry_after.as_secs().max(1).into(),
            );
            response
        }
    }
}
