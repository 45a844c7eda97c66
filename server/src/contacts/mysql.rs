use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use axum_app_wrapper::AdHocPlugin;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

use crate::{
    config::{AppConfig, MySqlConfig},
    contacts::{ContactDirectory, ContactRecord, ContactSearch, DirectoryError},
    state::AppState,
};

/// Matches any phone column (spaces removed) against the number pattern, or the
/// e-mail column exactly. Each criterion is skipped when its parameter is NULL.
const LOOKUP_QUERY: &str = r#"
    SELECT
        CAST(id AS SIGNED) AS id,
        RealName AS real_name,
        WorkPhone AS work_phone,
        MobilePhone AS mobile_phone,
        HomePhone AS home_phone,
        EmailAddress AS email,
        Organization AS organization
    FROM Users
    WHERE
        (? IS NOT NULL AND (
            REPLACE(HomePhone, ' ', '') LIKE ?
            OR REPLACE(WorkPhone, ' ', '') LIKE ?
            OR REPLACE(MobilePhone, ' ', '') LIKE ?
        ))
        OR
        (? IS NOT NULL AND EmailAddress = ?)
"#;

/// Contact directory backed by the `Users` table in MySQL
pub struct MySqlDirectory {
    pool: MySqlPool,
}

impl MySqlDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create a directory with a lazily connecting pool, so the server can start while
    /// the database is unavailable. Connections are pinged before being handed out.
    pub fn connect_lazy(config: &MySqlConfig) -> Self {
        let (host, port) = config.host_and_port();
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .test_before_acquire(true)
            .connect_lazy_with(options);

        Self::new(pool)
    }
}

#[async_trait]
impl ContactDirectory for MySqlDirectory {
    async fn find(&self, search: &ContactSearch) -> Result<Vec<ContactRecord>, DirectoryError> {
        let records = sqlx::query_as::<_, ContactRecord>(LOOKUP_QUERY)
            .bind(&search.number_pattern)
            .bind(&search.number_pattern)
            .bind(&search.number_pattern)
            .bind(&search.number_pattern)
            .bind(&search.email)
            .bind(&search.email)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }
}

/// Plugin that sets up the MySQL pool and adds the contact directory to state
pub fn plugin() -> AdHocPlugin<AppState> {
    AdHocPlugin::new().on_init(|mut state| async move {
        let config = state
            .get::<AppConfig>()
            .ok_or_else(|| anyhow!("app config not found"))?;
        let (host, port) = config.mysql.host_and_port();
        tracing::info!(
            "Using MySQL database '{}' at {host}:{port}",
            config.mysql.database
        );

        let directory: Arc<dyn ContactDirectory> =
            Arc::new(MySqlDirectory::connect_lazy(&config.mysql));
        state.insert(directory);
        Ok(state)
    })
}
