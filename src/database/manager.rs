use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the receipt database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    #[error("Invalid configuration value for {0}")]
    InvalidConfig(String),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

const REQUIRED_PG_VARS: [&str; 4] = ["POSTGRES_HOST", "POSTGRES_DB", "POSTGRES_USER", "POSTGRES_PASSWORD"];

/// Where to connect. Either a full `DATABASE_URL` or the discrete
/// `POSTGRES_*` variables the API server uses.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionSettings {
    Url(String),
    Parts {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
        ssl: bool,
    },
}

impl ConnectionSettings {
    pub fn from_env() -> Result<Self, DatabaseError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from an arbitrary variable source. `DATABASE_URL` wins
    /// when present; otherwise every required `POSTGRES_*` variable must be set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DatabaseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("DATABASE_URL") {
            return Ok(ConnectionSettings::Url(url));
        }

        let missing: Vec<&str> = REQUIRED_PG_VARS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(DatabaseError::ConfigMissing(missing.join(", ")));
        }

        let port = match get("POSTGRES_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| DatabaseError::InvalidConfig("POSTGRES_PORT".to_string()))?,
            None => 5432,
        };

        Ok(ConnectionSettings::Parts {
            host: get("POSTGRES_HOST").unwrap_or_default(),
            port,
            database: get("POSTGRES_DB").unwrap_or_default(),
            user: get("POSTGRES_USER").unwrap_or_default(),
            password: get("POSTGRES_PASSWORD").unwrap_or_default(),
            ssl: get("POSTGRES_SSL").as_deref() == Some("true"),
        })
    }

    /// `database@host`, safe to log (no credentials)
    pub fn target(&self) -> Result<String, DatabaseError> {
        match self {
            ConnectionSettings::Url(raw) => {
                let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
                let host = url.host_str().unwrap_or("localhost");
                let database = url.path().trim_start_matches('/');
                Ok(format!("{}@{}", database, host))
            }
            ConnectionSettings::Parts { host, database, .. } => Ok(format!("{}@{}", database, host)),
        }
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        match self {
            ConnectionSettings::Url(raw) => {
                PgConnectOptions::from_str(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)
            }
            ConnectionSettings::Parts { host, port, database, user, password, ssl } => {
                // TLS without certificate verification, as the API server does
                let ssl_mode = if *ssl { PgSslMode::Require } else { PgSslMode::Disable };
                Ok(PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .database(database)
                    .username(user)
                    .password(password)
                    .ssl_mode(ssl_mode))
            }
        }
    }
}

/// Open the pool the job owns for the duration of a run
pub async fn connect(settings: &ConnectionSettings, config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    info!("Connecting to PostgreSQL database: {}", settings.target()?);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect_with(settings.connect_options()?)
        .await?;

    health_check(&pool).await?;
    info!("Database connection established");
    Ok(pool)
}

/// Pings the pool to ensure connectivity
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
