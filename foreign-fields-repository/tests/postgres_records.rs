//! Integration tests for the PostgreSQL record repository.
//!
//! These tests require a real PostgreSQL database and use SQLx test macros
//! to ensure proper test isolation and cleanup.
//!
//! Run with: `cargo test --test postgres_records`

use foreign_fields_repository::{
    AttributeColumn, ColumnType, PostgresRecordRepository, RecordRepository, TableSchema,
};
use foreign_fields_shared::{AttributeRecord, FieldDefinition, RecordKey};
use serde_json::json;
use sqlx::Row;

const RATING_COLUMNS: &[AttributeColumn] = &[
    AttributeColumn::required("score", ColumnType::Integer),
    AttributeColumn::new("comment", ColumnType::Text),
];

fn rating() -> FieldDefinition {
    FieldDefinition::new(7, "rating", "ratings", ["score", "comment"])
}

/// Inserts the host rows the side table's foreign keys point at.
async fn seed_host_rows(pool: &sqlx::PgPool) {
    sqlx::query("INSERT INTO \"fields\" (\"id\", \"handle\") VALUES (7, 'rating')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO \"elements\" (\"id\", \"type\") VALUES (42, 'entry'), (43, 'entry')")
        .execute(pool)
        .await
        .unwrap();
}

async fn setup(pool: &sqlx::PgPool, definition: &FieldDefinition) -> PostgresRecordRepository {
    seed_host_rows(pool).await;
    let repository = PostgresRecordRepository::new(pool.clone());
    let schema = TableSchema::for_field(definition, RATING_COLUMNS).unwrap();
    repository.ensure_table(&schema).await.unwrap();
    repository
}

fn record(key: RecordKey, payload: serde_json::Value) -> AttributeRecord {
    let mut record = AttributeRecord::new(key);
    record.set_model_attributes(payload.as_object().cloned().unwrap());
    record
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_ensure_table_is_idempotent(pool: sqlx::PgPool) {
    let definition = rating();
    let repository = setup(&pool, &definition).await;

    let schema = TableSchema::for_field(&definition, RATING_COLUMNS).unwrap();
    repository.ensure_table(&schema).await.unwrap();

    let indexes = sqlx::query("SELECT indexname FROM pg_indexes WHERE tablename = 'ratings'")
        .fetch_all(&pool)
        .await
        .unwrap();
    let names: Vec<String> = indexes.iter().map(|row| row.get("indexname")).collect();
    assert!(names.contains(&"ratings_elementId_fieldId_unq_idx".to_string()));
    assert!(names.contains(&"ratings_fieldId_idx".to_string()));
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_insert_and_find(pool: sqlx::PgPool) {
    let definition = rating();
    let repository = setup(&pool, &definition).await;
    let key = RecordKey::new(42, 7, None);

    let saved = repository
        .save(&definition, record(key, json!({"score": 4, "comment": "solid"})))
        .await
        .unwrap();
    assert!(saved.id.is_some());

    let found = repository.find(&definition, &key).await.unwrap().unwrap();
    assert_eq!(found.id, saved.id);
    assert_eq!(found.uid, saved.uid);
    assert_eq!(found.attributes["score"], json!(4));
    assert_eq!(found.attributes["comment"], json!("solid"));
    assert!(found.attributes.get("elementId").is_none());

    assert!(repository
        .find(&definition, &RecordKey::new(43, 7, None))
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_update_in_place(pool: sqlx::PgPool) {
    let definition = rating();
    let repository = setup(&pool, &definition).await;
    let key = RecordKey::new(42, 7, None);

    repository
        .save(&definition, record(key, json!({"score": 4, "comment": "solid"})))
        .await
        .unwrap();

    let mut loaded = repository.find_or_create(&definition, &key).await.unwrap();
    loaded.set_model_attributes(json!({"score": 2}).as_object().cloned().unwrap());
    repository.save(&definition, loaded).await.unwrap();

    let rows = sqlx::query("SELECT \"score\", \"comment\" FROM \"ratings\"")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i32, _>("score"), 2);
    assert_eq!(rows[0].get::<String, _>("comment"), "solid");
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_per_site_records(pool: sqlx::PgPool) {
    let definition = rating().with_per_site_records(true);
    let repository = setup(&pool, &definition).await;

    for site_id in [1, 2] {
        repository
            .save(
                &definition,
                record(RecordKey::new(42, 7, Some(site_id)), json!({"score": site_id})),
            )
            .await
            .unwrap();
    }

    let site_two = repository
        .find(&definition, &RecordKey::new(42, 7, Some(2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(site_two.attributes["score"], json!(2));
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_records_cascade_with_elements(pool: sqlx::PgPool) {
    let definition = rating();
    let repository = setup(&pool, &definition).await;

    repository
        .save(&definition, record(RecordKey::new(42, 7, None), json!({"score": 1})))
        .await
        .unwrap();
    sqlx::query("DELETE FROM \"elements\" WHERE \"id\" = 42")
        .execute(&pool)
        .await
        .unwrap();

    assert!(repository
        .find(&definition, &RecordKey::new(42, 7, None))
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "src/postgres/migrations")]
async fn test_delete_for_element(pool: sqlx::PgPool) {
    let definition = rating();
    let repository = setup(&pool, &definition).await;

    for element_id in [42, 43] {
        repository
            .save(&definition, record(RecordKey::new(element_id, 7, None), json!({"score": 3})))
            .await
            .unwrap();
    }

    assert_eq!(repository.delete_for_element(&definition, 42).await.unwrap(), 1);
    assert_eq!(repository.delete_for_field(&definition).await.unwrap(), 1);
}
