//! This module defines the `RecordRepository` trait, the interface between
//! foreign fields and the side tables holding their records.

use async_trait::async_trait;
use foreign_fields_shared::{AttributeRecord, ElementId, FieldDefinition, RecordKey};

use crate::errors::RecordRepositoryError;
use crate::schema::TableSchema;

/// A trait that defines the interface for reading and writing side-table records.
///
/// Every method receives the `FieldDefinition` the record belongs to; it names
/// the table and decides whether keys carry a site.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Looks up the record with exactly this composite key.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - The stored record
    /// * `Ok(None)` - No record exists for the key
    /// * `Err(RecordRepositoryError)` - Invalid key or database failure
    async fn find(
        &self,
        definition: &FieldDefinition,
        key: &RecordKey,
    ) -> Result<Option<AttributeRecord>, RecordRepositoryError>;

    /// Inserts or updates a record, stamping its audit columns.
    ///
    /// New records (`id == None`) are inserted, existing ones updated in place.
    ///
    /// # Returns
    ///
    /// * `Ok(AttributeRecord)` - The record as stored, with `id` and timestamps set
    /// * `Err(RecordRepositoryError)` - Invalid key or database failure
    async fn save(
        &self,
        definition: &FieldDefinition,
        record: AttributeRecord,
    ) -> Result<AttributeRecord, RecordRepositoryError>;

    /// Removes every record of `definition` owned by `element_id`.
    async fn delete_for_element(
        &self,
        definition: &FieldDefinition,
        element_id: ElementId,
    ) -> Result<u64, RecordRepositoryError>;

    /// Removes every record of `definition`.
    async fn delete_for_field(
        &self,
        definition: &FieldDefinition,
    ) -> Result<u64, RecordRepositoryError>;

    /// Creates the side table described by `schema` unless it already exists.
    async fn ensure_table(&self, schema: &TableSchema) -> Result<(), RecordRepositoryError>;

    /// Drops the side table if it exists.
    async fn drop_table(&self, table_name: &str) -> Result<(), RecordRepositoryError>;

    /// Finds the record for `key`, or returns a new unsaved record carrying the key.
    async fn find_or_create(
        &self,
        definition: &FieldDefinition,
        key: &RecordKey,
    ) -> Result<AttributeRecord, RecordRepositoryError> {
        Ok(self
            .find(definition, key)
            .await?
            .unwrap_or_else(|| AttributeRecord::new(*key)))
    }
}

/// Checks that `key` belongs to `definition` and carries a site exactly when
/// the field stores per-site records.
pub fn check_record_key(
    definition: &FieldDefinition,
    key: &RecordKey,
) -> Result<(), RecordRepositoryError> {
    if key.field_id != definition.id {
        return Err(RecordRepositoryError::ForeignKey {
            handle: definition.handle.clone(),
            key: *key,
        });
    }

    match (definition.per_site_records, key.site_id) {
        (true, None) => Err(RecordRepositoryError::InvalidKey {
            handle: definition.handle.clone(),
            key: *key,
            reason: "per-site records require a site id",
        }),
        (false, Some(_)) => Err(RecordRepositoryError::InvalidKey {
            handle: definition.handle.clone(),
            key: *key,
            reason: "records shared across sites cannot carry a site id",
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating() -> FieldDefinition {
        FieldDefinition::new(7, "rating", "ratings", ["score", "comment"])
    }

    #[test]
    fn test_check_record_key_accepts_matching_keys() {
        assert!(check_record_key(&rating(), &RecordKey::new(42, 7, None)).is_ok());

        let per_site = rating().with_per_site_records(true);
        assert!(check_record_key(&per_site, &RecordKey::new(42, 7, Some(1))).is_ok());
    }

    #[test]
    fn test_check_record_key_rejects_site_mismatch() {
        let err = check_record_key(&rating(), &RecordKey::new(42, 7, Some(1))).unwrap_err();
        assert!(matches!(err, RecordRepositoryError::InvalidKey { .. }));

        let per_site = rating().with_per_site_records(true);
        let err = check_record_key(&per_site, &RecordKey::new(42, 7, None)).unwrap_err();
        assert!(matches!(err, RecordRepositoryError::InvalidKey { .. }));
    }

    #[test]
    fn test_check_record_key_rejects_other_field() {
        let err = check_record_key(&rating(), &RecordKey::new(42, 8, None)).unwrap_err();
        assert!(matches!(err, RecordRepositoryError::ForeignKey { .. }));
    }
}
