//! Per-client rate limiting

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    str::FromStr,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use aide::OperationInput;
use anyhow::anyhow;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum_app_wrapper::AdHocPlugin;
use serde::Deserialize;
use tokio::time::Instant;

use crate::{config::AppConfig, errors::AppError, state::AppState};

/// Key used when the peer address of a request is unknown
const FALLBACK_CLIENT_KEY: &str = "127.0.0.1";

/// Table size above which expired windows are swept
const PRUNE_THRESHOLD: usize = 1024;

/// A number of requests allowed per period, e.g. `20/minute`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct RateLimit {
    count: u32,
    unit: RateUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl RateUnit {
    fn period(self) -> Duration {
        match self {
            RateUnit::Second => Duration::from_secs(1),
            RateUnit::Minute => Duration::from_secs(60),
            RateUnit::Hour => Duration::from_secs(60 * 60),
            RateUnit::Day => Duration::from_secs(24 * 60 * 60),
        }
    }

    fn name(self) -> &'static str {
        match self {
            RateUnit::Second => "second",
            RateUnit::Minute => "minute",
            RateUnit::Hour => "hour",
            RateUnit::Day => "day",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RateLimitParseError {
    #[error("expected '<count>/<unit>' or '<count> per <unit>', got '{0}'")]
    Format(String),
    #[error("invalid request count '{0}'")]
    Count(String),
    #[error("unknown time unit '{0}' (expected second, minute, hour or day)")]
    Unit(String),
}

impl RateLimit {
    pub const fn per_minute(count: u32) -> Self {
        Self {
            count,
            unit: RateUnit::Minute,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn period(&self) -> Duration {
        self.unit.period()
    }
}

impl FromStr for RateLimit {
    type Err = RateLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (count, unit) = trimmed
            .split_once('/')
            .or_else(|| trimmed.split_once(" per "))
            .ok_or_else(|| RateLimitParseError::Format(s.to_owned()))?;

        let count = match count.trim().parse::<u32>() {
            Ok(count) if count > 0 => count,
            _ => return Err(RateLimitParseError::Count(count.trim().to_owned())),
        };
        let unit = match unit.trim().to_ascii_lowercase().trim_end_matches('s') {
            "second" => RateUnit::Second,
            "minute" => RateUnit::Minute,
            "hour" => RateUnit::Hour,
            "day" => RateUnit::Day,
            _ => return Err(RateLimitParseError::Unit(unit.trim().to_owned())),
        };

        Ok(Self { count, unit })
    }
}

impl TryFrom<String> for RateLimit {
    type Error = RateLimitParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per 1 {}", self.count, self.unit.name())
    }
}

/// Returned when a client has used up its window
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitExceeded {
    pub limit: RateLimit,
    /// Time until the client's window resets
    pub retry_after: Duration,
}

/// # Fixed-window rate limiter
///
/// Each client key gets a window starting at its first request and lasting one period.
/// Requests within the window are counted, and once `count` is reached further requests
/// are rejected until the window expires.
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    windows: Mutex<WindowTable>,
}

#[derive(Debug)]
struct WindowTable {
    windows: HashMap<String, Window>,
    next_prune_at: usize,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            windows: Mutex::new(WindowTable {
                windows: HashMap::new(),
                next_prune_at: PRUNE_THRESHOLD,
            }),
        }
    }

    /// Record a hit for `key`, or reject it if the key's current window is full.
    pub fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        let period = self.limit.period();
        let now = Instant::now();
        let mut table = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if table.windows.len() >= table.next_prune_at {
            table
                .windows
                .retain(|_, window| now.duration_since(window.started) < period);
            table.next_prune_at = PRUNE_THRESHOLD.max(table.windows.len() * 2);
        }

        let window = table.windows.entry(key.to_owned()).or_insert(Window {
            started: now,
            hits: 0,
        });
        let elapsed = now.duration_since(window.started);
        if elapsed >= period {
            *window = Window {
                started: now,
                hits: 0,
            };
        }

        if window.hits >= self.limit.count {
            return Err(RateLimitExceeded {
                limit: self.limit,
                retry_after: period.saturating_sub(now.duration_since(window.started)),
            });
        }
        window.hits += 1;

        Ok(())
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .len()
    }
}

/// Extractor that counts the request against the client's rate limit, keyed
/// by the peer IP address.
pub struct RateLimited;

impl FromRequestParts<AppState> for RateLimited {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| FALLBACK_CLIENT_KEY.to_owned());

        state.limiter.check(&key)?;
        Ok(RateLimited)
    }
}

impl OperationInput for RateLimited {}

/// Plugin that creates the rate limiter for the contacts endpoint and adds it to state
pub fn plugin() -> AdHocPlugin<AppState> {
    AdHocPlugin::new().on_init(|mut state| async move {
        let limit = state
            .get::<AppConfig>()
            .ok_or_else(|| anyhow!("app config not found"))?
            .contacts_rate_limit;
        state.insert(RateLimiter::new(limit));
        Ok(state)
    })
}
