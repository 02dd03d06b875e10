use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use foreign_fields_shared::{AttributeMap, AttributeRecord, ElementId, FieldDefinition, RecordKey};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::errors::RecordRepositoryError;
use crate::interfaces::{check_record_key, RecordRepository};
use crate::schema::{quote_ident, TableSchema};

/// PostgreSQL implementation of the record repository.
///
/// Holds a connection pool; the table and payload columns of each call come
/// from the `FieldDefinition` passed in.
pub struct PostgresRecordRepository {
    pool: sqlx::PgPool,
}

impl PostgresRecordRepository {
    /// Creates a repository on top of an existing pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool and wraps it.
    ///
    /// # Arguments
    ///
    /// * `url` - PostgreSQL connection string
    /// * `max_connections` - Upper bound of the pool size
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RecordRepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    /// Inserts a new record and returns its generated id.
    async fn insert_record(
        &self,
        definition: &FieldDefinition,
        record: &AttributeRecord,
        now: NaiveDateTime,
    ) -> Result<i64, RecordRepositoryError> {
        let table = quote_ident(&definition.table_name);

        let mut columns = vec![quote_ident("elementId"), quote_ident("fieldId")];
        if record.key.site_id.is_some() {
            columns.push(quote_ident("siteId"));
        }
        for attribute in &definition.record_attributes {
            columns.push(quote_ident(attribute));
        }
        columns.push(quote_ident("dateCreated"));
        columns.push(quote_ident("dateUpdated"));
        columns.push(quote_ident("uid"));

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) SELECT ", table, columns.join(", ")));

        query_builder
            .push_bind(record.key.element_id)
            .push(", ")
            .push_bind(record.key.field_id);
        if let Some(site_id) = record.key.site_id {
            query_builder.push(", ").push_bind(site_id);
        }
        for attribute in &definition.record_attributes {
            query_builder.push(format!(", p.{}", quote_ident(attribute)));
        }
        query_builder
            .push(", ")
            .push_bind(now)
            .push(", ")
            .push_bind(now)
            .push(", ")
            .push_bind(record.uid)
            .push(format!(" FROM jsonb_populate_record(NULL::{}, ", table))
            .push_bind(sqlx::types::Json(payload(definition, &record.attributes)))
            .push(") AS p RETURNING \"id\"::bigint AS id");

        let row = query_builder.build().fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>("id")?)
    }

    /// Updates the payload columns present on the record.
    async fn update_record(
        &self,
        definition: &FieldDefinition,
        id: i64,
        record: &AttributeRecord,
        now: NaiveDateTime,
    ) -> Result<(), RecordRepositoryError> {
        let table = quote_ident(&definition.table_name);

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} AS r SET ", table));

        for attribute in definition
            .record_attributes
            .iter()
            .filter(|attribute| record.attributes.contains_key(attribute.as_str()))
        {
            let column = quote_ident(attribute);
            query_builder.push(format!("{column} = p.{column}, "));
        }
        query_builder
            .push("\"dateUpdated\" = ")
            .push_bind(now)
            .push(format!(" FROM jsonb_populate_record(NULL::{}, ", table))
            .push_bind(sqlx::types::Json(payload(definition, &record.attributes)))
            .push(") AS p WHERE r.\"id\" = ")
            .push_bind(id);

        query_builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

/// The record's payload restricted to the field's record attributes.
fn payload(definition: &FieldDefinition, attributes: &AttributeMap) -> serde_json::Value {
    let map: AttributeMap = attributes
        .iter()
        .filter(|(name, _)| definition.is_record_attribute(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    serde_json::Value::Object(map)
}

/// Rebuilds a record from a row selected by `find`.
fn record_from_row(
    definition: &FieldDefinition,
    key: &RecordKey,
    row: &PgRow,
) -> Result<AttributeRecord, RecordRepositoryError> {
    let id: i64 = row.try_get("id")?;
    let date_created: NaiveDateTime = row.try_get("date_created")?;
    let date_updated: NaiveDateTime = row.try_get("date_updated")?;
    let uid: Uuid = row.try_get("uid")?;
    let row_json: serde_json::Value = row.try_get("payload")?;

    let serde_json::Value::Object(mut columns) = row_json else {
        return Err(RecordRepositoryError::invalid_row(
            &definition.table_name,
            "row payload is not a JSON object",
        ));
    };

    let attributes = definition
        .record_attributes
        .iter()
        .map(|name| {
            let value = columns.remove(name).unwrap_or(serde_json::Value::Null);
            (name.clone(), value)
        })
        .collect();

    Ok(AttributeRecord {
        id: Some(id),
        key: *key,
        attributes,
        date_created: Some(date_created.and_utc()),
        date_updated: Some(date_updated.and_utc()),
        uid,
    })
}

#[async_trait]
impl RecordRepository for PostgresRecordRepository {
    #[instrument(skip(self, definition), fields(table = %definition.table_name))]
    async fn find(
        &self,
        definition: &FieldDefinition,
        key: &RecordKey,
    ) -> Result<Option<AttributeRecord>, RecordRepositoryError> {
        check_record_key(definition, key)?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT r.\"id\"::bigint AS id, r.\"dateCreated\" AS date_created, \
             r.\"dateUpdated\" AS date_updated, r.\"uid\" AS uid, to_jsonb(r) AS payload \
             FROM {} AS r WHERE r.\"elementId\" = ",
            quote_ident(&definition.table_name)
        ));
        query_builder
            .push_bind(key.element_id)
            .push(" AND r.\"fieldId\" = ")
            .push_bind(key.field_id);
        if let Some(site_id) = key.site_id {
            query_builder.push(" AND r.\"siteId\" = ").push_bind(site_id);
        }
        query_builder.push(" LIMIT 1");

        let row = query_builder.build().fetch_optional(&self.pool).await?;
        row.map(|row| record_from_row(definition, key, &row))
            .transpose()
    }

    #[instrument(skip(self, definition, record), fields(table = %definition.table_name, key = ?record.key))]
    async fn save(
        &self,
        definition: &FieldDefinition,
        mut record: AttributeRecord,
    ) -> Result<AttributeRecord, RecordRepositoryError> {
        check_record_key(definition, &record.key)?;

        let now = Utc::now().naive_utc();
        match record.id {
            Some(id) => {
                self.update_record(definition, id, &record, now).await?;
                debug!(id, "Updated record");
            }
            None => {
                let id = self.insert_record(definition, &record, now).await?;
                record.id = Some(id);
                record.date_created = Some(now.and_utc());
                info!(id, "Inserted record");
            }
        }
        record.date_updated = Some(now.and_utc());

        Ok(record)
    }

    async fn delete_for_element(
        &self,
        definition: &FieldDefinition,
        element_id: ElementId,
    ) -> Result<u64, RecordRepositoryError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE \"fieldId\" = $1 AND \"elementId\" = $2",
            quote_ident(&definition.table_name)
        ))
        .bind(definition.id)
        .bind(element_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_for_field(
        &self,
        definition: &FieldDefinition,
    ) -> Result<u64, RecordRepositoryError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE \"fieldId\" = $1",
            quote_ident(&definition.table_name)
        ))
        .bind(definition.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, schema), fields(table = %schema.table))]
    async fn ensure_table(&self, schema: &TableSchema) -> Result<(), RecordRepositoryError> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(quote_ident(&schema.table))
            .fetch_one(&self.pool)
            .await?;

        if exists {
            debug!("Side table already exists");
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for statement in schema.create_statements() {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!("Created side table");
        Ok(())
    }

    async fn drop_table(&self, table_name: &str) -> Result<(), RecordRepositoryError> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table_name)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
