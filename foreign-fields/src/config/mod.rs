//! Configuration and dependency wiring.

mod dependencies;

use std::env;

use foreign_fields_repository::schema::{DEFAULT_ELEMENTS_TABLE, DEFAULT_FIELDS_TABLE};
use tracing::warn;

use crate::errors::ForeignFieldError;
use crate::query::Dialect;

pub use dependencies::Dependencies;

/// Default size of the database connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Engine settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_url: Option<String>,
    pub dialect: Dialect,
    pub max_connections: u32,
    pub elements_table: String,
    pub fields_table: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            dialect: Dialect::Postgres,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            elements_table: DEFAULT_ELEMENTS_TABLE.to_string(),
            fields_table: DEFAULT_FIELDS_TABLE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection string (required by `Dependencies`)
    /// - `FOREIGN_FIELDS_DIALECT`: "postgres" or "mysql" (default: postgres)
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 5)
    /// - `FOREIGN_FIELDS_ELEMENTS_TABLE`: Host elements table (default: elements)
    /// - `FOREIGN_FIELDS_FIELDS_TABLE`: Host fields table (default: fields)
    pub fn from_env() -> Self {
        let dialect = match env::var("FOREIGN_FIELDS_DIALECT") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Invalid FOREIGN_FIELDS_DIALECT, defaulting to 'postgres'");
                Dialect::Postgres
            }),
            Err(_) => Dialect::Postgres,
        };

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        Self {
            database_url: env::var("DATABASE_URL").ok(),
            dialect,
            max_connections,
            elements_table: env::var("FOREIGN_FIELDS_ELEMENTS_TABLE")
                .unwrap_or_else(|_| DEFAULT_ELEMENTS_TABLE.to_string()),
            fields_table: env::var("FOREIGN_FIELDS_FIELDS_TABLE")
                .unwrap_or_else(|_| DEFAULT_FIELDS_TABLE.to_string()),
        }
    }

    /// The database URL, or a configuration error when it is not set.
    pub fn require_database_url(&self) -> Result<&str, ForeignFieldError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ForeignFieldError::config("DATABASE_URL must be set"))
    }
}
