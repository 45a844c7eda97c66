use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr},
};

use anyhow::Context;
use axum_app_wrapper::AdHocPlugin;
use figment::providers::{Env, Serialized};
use serde::Deserialize;

use crate::{logging, rate_limit::RateLimit, state::AppState};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Username that callers must provide via HTTP Basic auth.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Password that callers must provide via HTTP Basic auth.
    #[serde(default = "default_api_password")]
    pub api_password: String,
    /// Log level (`DEBUG`, `INFO`, `WARNING`, ...) or a tracing filter directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Requests allowed per client on the contacts endpoint, e.g. `20/minute`.
    #[serde(default = "default_contacts_rate_limit")]
    pub contacts_rate_limit: RateLimit,

    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub mysql: MySqlConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MySqlConfig {
    /// Database host, optionally with a `:port` suffix.
    #[serde(default = "default_mysql_host")]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    #[serde(default = "default_mysql_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_mysql_database", alias = "db")]
    pub database: String,
    #[serde(default = "default_mysql_max_connections")]
    pub max_connections: u32,
}

fn default_api_key() -> String {
    "your_default_api_key".to_string()
}
fn default_api_password() -> String {
    "X".to_string()
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_contacts_rate_limit() -> RateLimit {
    RateLimit::per_minute(20)
}
fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_port() -> u16 {
    8383
}
fn default_mysql_host() -> String {
    "localhost".to_string()
}
fn default_mysql_port() -> u16 {
    3306
}
fn default_mysql_user() -> String {
    "root".to_string()
}
fn default_mysql_database() -> String {
    "phonebook".to_string()
}
fn default_mysql_max_connections() -> u32 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            api_password: default_api_password(),
            log_level: default_log_level(),
            contacts_rate_limit: default_contacts_rate_limit(),
            host: default_host(),
            port: default_port(),
            mysql: MySqlConfig::default(),
        }
    }
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: default_mysql_host(),
            port: default_mysql_port(),
            user: default_mysql_user(),
            password: String::new(),
            database: default_mysql_database(),
            max_connections: default_mysql_max_connections(),
        }
    }
}

impl MySqlConfig {
    /// Host and port to connect to. A port given inline (`db:3307`, `[::1]:3307`) wins
    /// over `port`. Bare IPv6 literals (`::1`) are taken as-is.
    pub fn host_and_port(&self) -> (&str, u16) {
        let host = self.host.as_str();
        if let Some((address, rest)) = host.strip_prefix('[').and_then(|h| h.split_once(']')) {
            let port = rest.strip_prefix(':').and_then(|p| p.parse().ok());
            return (address, port.unwrap_or(self.port));
        }
        if host.matches(':').count() == 1
            && let Some((name, port)) = host.split_once(':')
            && let Ok(port) = port.parse()
        {
            return (name, port);
        }
        (host, self.port)
    }
}

/// Plugin that reads and validates configuration, installs logging, and adds the config to server state
pub fn plugin() -> AdHocPlugin<AppState> {
    AdHocPlugin::new().on_init(|mut state| async move {
        let config = extract_config()?;
        logging::init(&config.log_level);
        state.insert(config);
        Ok(state)
    })
}

/// Extract the configuration from the environment, after loading a `.env` file if present.
///
/// - `FASTAPI_API_KEY`, `FASTAPI_API_PASSWORD`: Basic auth credentials
/// - `LOG_LEVEL`
/// - `MYSQL_*`: database connection (`MYSQL_HOST`, `MYSQL_USER`, `MYSQL_PASSWORD`, `MYSQL_DB`, ...)
/// - `PHONEBOOK_*`: listen address and rate limits
fn extract_config() -> anyhow::Result<AppConfig> {
    let _ = dotenvy::dotenv();
    let figment = figment::Figment::new()
        .merge(Serialized::defaults(verbatim(
            Env::prefixed("FASTAPI_").only(&["api_key", "api_password"]),
        )))
        .merge(Env::raw().only(&["log_level"]))
        .merge(
            Env::prefixed("MYSQL_")
                .only(&["port", "max_connections"])
                .map(|key| format!("mysql.{key}").into()),
        )
        .merge(Serialized::default(
            "mysql",
            verbatim(Env::prefixed("MYSQL_").only(&["host", "user", "password", "db"])),
        ))
        .merge(Env::prefixed("PHONEBOOK_").only(&["host", "port", "contacts_rate_limit"]));

    let mut config = figment
        .extract::<AppConfig>()
        .context("Failed to extract valid configuration")?;
    config.api_key = config.api_key.trim().to_owned();
    config.api_password = config.api_password.trim().to_owned();

    Ok(config)
}

/// Environment values as unparsed strings, so secrets like `007` keep their exact text
fn verbatim(env: Env) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| (key.as_str().to_ascii_lowercase(), value))
        .collect()
}
