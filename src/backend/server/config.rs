/**
 * Server Configuration
 *
 * This module handles loading of server configuration from environment
 * variables and the optional PostgreSQL connection.
 *
 * # Variables
 *
 * - `DATABASE_URL` - PostgreSQL URL; without it the server keeps synced
 *   records in memory
 * - `JWT_SECRET` - HMAC secret for bearer tokens (required)
 * - `SERVER_PORT` - listen port (default 3000)
 * - `TOKEN_TTL_DAYS` - lifetime of issued tokens (default 30)
 *
 * # Error Handling
 *
 * A configured database that cannot be reached or migrated is a startup
 * error. The in-memory repository is only used when `DATABASE_URL` is unset.
 */

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::backend::error::BackendError;
use crate::shared::config::ConfigError;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TOKEN_TTL_DAYS: u64 = 30;
const DEVELOPMENT_SECRET: &str = "attendance-sync-development-secret";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub port: u16,
    pub token_ttl: Duration,
}

/// Development settings; `from_env` never falls back to this secret
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: DEVELOPMENT_SECRET.to_string(),
            port: DEFAULT_PORT,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_DAYS * 24 * 60 * 60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_sources(|key| std::env::var(key).ok())
    }

    /// Build from a variable lookup
    pub fn from_sources<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingValue("JWT_SECRET"))?;

        let port = match lookup("SERVER_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "SERVER_PORT",
                value: raw,
            })?,
            None => defaults.port,
        };

        let token_ttl = match lookup("TOKEN_TTL_DAYS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(days) if days > 0 => Duration::from_secs(days * 24 * 60 * 60),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "TOKEN_TTL_DAYS",
                        value: raw,
                    })
                }
            },
            None => defaults.token_ttl,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            jwt_secret,
            port,
            token_ttl,
        })
    }
}

/// Load and initialize database connection pool
///
/// This function:
/// 1. Creates a PostgreSQL connection pool
/// 2. Runs database migrations
///
/// Either step failing is returned to the caller; records confirmed to
/// clients must never land anywhere but the configured database.
pub async fn load_database(database_url: &str) -> Result<PgPool, BackendError> {
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database connection pool: {:?}", e);
            e
        })?;

    tracing::info!("Database connection pool created successfully");

    tracing::info!("Running database migrations...");
    sqlx::migrate!().run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {}", e);
        e
    })?;
    tracing::info!("Database migrations completed successfully");

    Ok(pool)
}
