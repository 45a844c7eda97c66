//! Tracing setup and request logging

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Translate a log level name into a tracing filter directive. Accepts the usual
/// level names plus `WARNING` and `CRITICAL`; anything else is passed through as-is.
pub fn filter_directive(log_level: &str) -> String {
    let level = log_level.trim();
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace".into(),
        "debug" => "debug".into(),
        "" | "info" => "info".into(),
        "warn" | "warning" => "warn".into(),
        "error" | "critical" | "fatal" => "error".into(),
        "off" => "off".into(),
        _ => level.to_owned(),
    }
}

/// Install the global tracing subscriber, unless one is already set. `RUST_LOG` takes
/// precedence over the configured level.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(log_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}

/// Middleware that logs incoming requests at debug level
pub async fn log_request(request: Request, next: Next) -> Response {
    if tracing::enabled!(tracing::Level::DEBUG) {
        let client = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "unknown".to_owned());
        let auth_scheme = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(' ').next().unwrap_or_default().to_owned());

        tracing::debug!(
            "Incoming request {} {} from {client} (authorization: {})",
            request.method(),
            request.uri().path(),
            auth_scheme.as_deref().unwrap_or("none")
        );
    }

    next.run(request).await
}
