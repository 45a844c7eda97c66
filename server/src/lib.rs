use axum_app_wrapper::App;

mod api;
mod auth;
mod config;
mod contacts;
mod errors;
mod logging;
mod rate_limit;
mod state;

pub use config::{AppConfig, MySqlConfig};
pub use contacts::{
    ContactDirectory, ContactRecord, ContactSearch, DirectoryError, MySqlDirectory,
};
pub use errors::AppError;
pub use rate_limit::{RateLimit, RateLimiter};
pub use state::AppState;

pub async fn create_app() -> anyhow::Result<(axum::Router, AppConfig, impl Future + Send)> {
    let (router, state, on_shutdown) = App::new()
        .register(config::plugin()) // Extract configuration and add to state
        .register(contacts::plugin()) // Set up the MySQL contact directory
        .register(rate_limit::plugin()) // Per-client rate limiter
        .register(api::plugin()) // Add API routes
        .init()
        .await?;
    let app_config = state.config.to_owned();

    Ok((router.with_state(state), app_config, on_shutdown))
}

/// Build the HTTP routes around an already assembled state, e.g. with a custom
/// [`ContactDirectory`].
pub fn router(state: AppState) -> anyhow::Result<axum::Router> {
    Ok(api::routes()?.with_state(state))
}
