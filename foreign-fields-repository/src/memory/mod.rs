//! In-memory record repository for testing and local development.
//!
//! `InMemoryRecordRepository` behaves like the PostgreSQL store as far as keys,
//! ids and audit columns are concerned, so field lifecycles can be tested
//! without a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use foreign_fields_shared::{AttributeRecord, ElementId, FieldDefinition, RecordKey};

use crate::errors::RecordRepositoryError;
use crate::interfaces::{check_record_key, RecordRepository};
use crate::schema::TableSchema;

type StoreKey = (String, RecordKey);

/// Record repository keeping every table in a single map.
pub struct InMemoryRecordRepository {
    records: RwLock<HashMap<StoreKey, AttributeRecord>>,
    tables: RwLock<BTreeSet<String>>,
    next_id: AtomicI64,
    saves: AtomicUsize,
}

impl InMemoryRecordRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            tables: RwLock::new(BTreeSet::new()),
            next_id: AtomicI64::new(1),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Every record stored in `table`, ordered by key.
    pub fn records(&self, table: &str) -> Vec<AttributeRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<AttributeRecord> = records
            .iter()
            .filter(|((name, _), _)| name == table)
            .map(|(_, record)| record.clone())
            .collect();
        found.sort_by_key(|record| record.key);
        found
    }

    /// Whether `ensure_table` has been called for `table` (and not dropped since).
    pub fn has_table(&self, table: &str) -> bool {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(table)
    }
}

impl Default for InMemoryRecordRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn find(
        &self,
        definition: &FieldDefinition,
        key: &RecordKey,
    ) -> Result<Option<AttributeRecord>, RecordRepositoryError> {
        check_record_key(definition, key)?;

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(&(definition.table_name.clone(), *key))
            .cloned())
    }

    async fn save(
        &self,
        definition: &FieldDefinition,
        mut record: AttributeRecord,
    ) -> Result<AttributeRecord, RecordRepositoryError> {
        check_record_key(definition, &record.key)?;

        // Columns the payload does not mention are stored as NULL.
        record
            .attributes
            .retain(|name, _| definition.is_record_attribute(name));
        for attribute in &definition.record_attributes {
            record
                .attributes
                .entry(attribute.clone())
                .or_insert(serde_json::Value::Null);
        }

        let now = Utc::now();
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let store_key = (definition.table_name.clone(), record.key);

        match records.get(&store_key) {
            Some(existing) if record.id.is_none() => {
                // The unique key index would reject a second row.
                return Err(RecordRepositoryError::invalid_row(
                    &definition.table_name,
                    format!(
                        "record {:?} already exists with id {:?}",
                        record.key, existing.id
                    ),
                ));
            }
            Some(_) => {}
            None => {
                if record.id.is_none() {
                    record.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
                }
                record.date_created = Some(now);
            }
        }
        record.date_updated = Some(now);

        records.insert(store_key, record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);

        Ok(record)
    }

    async fn delete_for_element(
        &self,
        definition: &FieldDefinition,
        element_id: ElementId,
    ) -> Result<u64, RecordRepositoryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|(table, key), _| {
            !(table == &definition.table_name
                && key.field_id == definition.id
                && key.element_id == element_id)
        });
        Ok((before - records.len()) as u64)
    }

    async fn delete_for_field(
        &self,
        definition: &FieldDefinition,
    ) -> Result<u64, RecordRepositoryError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|(table, key), _| {
            !(table == &definition.table_name && key.field_id == definition.id)
        });
        Ok((before - records.len()) as u64)
    }

    async fn ensure_table(&self, schema: &TableSchema) -> Result<(), RecordRepositoryError> {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.table.clone());
        Ok(())
    }

    async fn drop_table(&self, table_name: &str) -> Result<(), RecordRepositoryError> {
        self.tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table_name);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(table, _), _| table != table_name);
        Ok(())
    }
}
