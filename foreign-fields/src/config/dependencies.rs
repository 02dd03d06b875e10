//! Dependency initialization and wiring.

use std::sync::Arc;

use foreign_fields_repository::{PostgresRecordRepository, RecordRepository};
use tracing::info;

use super::EngineConfig;
use crate::errors::ForeignFieldError;
use crate::query::{PostgresQueryRunner, QueryContext};

/// Container for the initialized services.
pub struct Dependencies {
    pub config: EngineConfig,
    pub pool: sqlx::PgPool,
    pub repository: Arc<dyn RecordRepository>,
    pub runner: PostgresQueryRunner,
}

impl Dependencies {
    /// Connects to the database and wires the record store and query runner.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(ForeignFieldError)` - Missing `DATABASE_URL` or connection failure
    pub async fn new(config: EngineConfig) -> Result<Self, ForeignFieldError> {
        let database_url = config.require_database_url()?.to_string();

        info!(
            dialect = %config.dialect,
            max_connections = config.max_connections,
            "Initializing dependencies"
        );

        let records =
            PostgresRecordRepository::connect(&database_url, config.max_connections).await?;
        let pool = records.pool().clone();

        let repository: Arc<dyn RecordRepository> = Arc::new(records);
        let runner = PostgresQueryRunner::new(pool.clone());

        Ok(Self {
            config,
            pool,
            repository,
            runner,
        })
    }

    /// A query context for the configured dialect, without hooks.
    pub fn query_context(&self) -> QueryContext {
        QueryContext::new(self.config.dialect)
    }
}
