//! Runs prepared element queries against PostgreSQL.

use serde_json::{Map, Value};
use sqlx::postgres::Postgres;
use sqlx::query::QueryScalar;
use tracing::{debug, instrument};

use super::dialect::Dialect;
use super::element_query::PreparedQuery;
use crate::errors::ForeignFieldError;

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// Executes prepared queries with sqlx.
///
/// Rows come back as JSON objects (`row_to_json`), so computed columns like
/// `field:<handle>` keep their names and JSON payloads.
#[derive(Debug, Clone)]
pub struct PostgresQueryRunner {
    pool: sqlx::PgPool,
}

impl PostgresQueryRunner {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, prepared))]
    pub async fn fetch_all(&self, prepared: &PreparedQuery) -> Result<Vec<Row>, ForeignFieldError> {
        if prepared.dialect() != Dialect::Postgres {
            return Err(ForeignFieldError::config(format!(
                "cannot run a {} query on PostgreSQL",
                prepared.dialect()
            )));
        }

        let (sql, params) = prepared.build();
        let wrapped = format!("SELECT row_to_json(q)::jsonb AS row FROM ({sql}) q");
        debug!(sql = %wrapped, params = params.len(), "Running element query");

        let mut query = sqlx::query_scalar::<_, Value>(&wrapped);
        for value in params {
            query = bind_value(query, value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    /// Runs a `COUNT(*)` query and returns the count.
    pub async fn count(&self, prepared: &PreparedQuery) -> Result<i64, ForeignFieldError> {
        let rows = self.fetch_all(prepared).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }
}

fn bind_value<'q>(
    query: QueryScalar<'q, Postgres, Value, sqlx::postgres::PgArguments>,
    value: Value,
) -> QueryScalar<'q, Postgres, Value, sqlx::postgres::PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s),
        other => query.bind(sqlx::types::Json(other)),
    }
}
