//! Side-table schema contract.
//!
//! Renders the PostgreSQL DDL for a field's side table: key columns, one column
//! per record attribute, audit columns, the unique key index, the secondary
//! `fieldId` / `siteId` indexes and cascading foreign keys to the host tables.

pub use foreign_fields_shared::ColumnType;
use foreign_fields_shared::FieldDefinition;

use crate::errors::RecordRepositoryError;

/// Host table holding elements.
pub const DEFAULT_ELEMENTS_TABLE: &str = "elements";

/// Host table holding field definitions.
pub const DEFAULT_FIELDS_TABLE: &str = "fields";

/// A payload column of a side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeColumn {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl AttributeColumn {
    /// A nullable column.
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: true,
        }
    }

    /// A `NOT NULL` column.
    pub const fn required(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            nullable: false,
        }
    }
}

/// Complete description of a side table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub per_site: bool,
    pub columns: Vec<AttributeColumn>,
    pub elements_table: String,
    pub fields_table: String,
}

impl TableSchema {
    /// Builds the schema of `definition`'s side table.
    ///
    /// `columns` must describe exactly the field's record attributes.
    pub fn for_field(
        definition: &FieldDefinition,
        columns: &[AttributeColumn],
    ) -> Result<Self, RecordRepositoryError> {
        for attribute in &definition.record_attributes {
            if !columns.iter().any(|column| column.name == attribute) {
                return Err(RecordRepositoryError::schema(
                    &definition.handle,
                    format!("no column declared for record attribute '{attribute}'"),
                ));
            }
        }

        for column in columns {
            if !definition.is_record_attribute(column.name) {
                return Err(RecordRepositoryError::schema(
                    &definition.handle,
                    format!("column '{}' is not a record attribute", column.name),
                ));
            }
            if RESERVED_COLUMNS.contains(&column.name) {
                return Err(RecordRepositoryError::schema(
                    &definition.handle,
                    format!("column '{}' is reserved", column.name),
                ));
            }
        }

        Ok(Self {
            table: definition.table_name.clone(),
            per_site: definition.per_site_records,
            columns: columns.to_vec(),
            elements_table: DEFAULT_ELEMENTS_TABLE.to_string(),
            fields_table: DEFAULT_FIELDS_TABLE.to_string(),
        })
    }

    /// Point the foreign keys at differently named host tables.
    pub fn with_host_tables(
        mut self,
        elements_table: impl Into<String>,
        fields_table: impl Into<String>,
    ) -> Self {
        self.elements_table = elements_table.into();
        self.fields_table = fields_table.into();
        self
    }

    /// Columns of the unique record key, in index order.
    pub fn key_columns(&self) -> Vec<&'static str> {
        if self.per_site {
            vec!["elementId", "siteId", "fieldId"]
        } else {
            vec!["elementId", "fieldId"]
        }
    }

    /// Statements creating the table, its indexes and foreign keys.
    pub fn create_statements(&self) -> Vec<String> {
        let table = quote_ident(&self.table);

        let mut definitions = vec![
            format!("{} serial PRIMARY KEY", quote_ident("id")),
            format!("{} integer NOT NULL", quote_ident("elementId")),
            format!("{} integer NOT NULL", quote_ident("fieldId")),
        ];
        if self.per_site {
            definitions.push(format!("{} integer NOT NULL", quote_ident("siteId")));
        }
        for column in &self.columns {
            let null = if column.nullable { "" } else { " NOT NULL" };
            definitions.push(format!(
                "{} {}{}",
                quote_ident(column.name),
                column.column_type.sql(),
                null
            ));
        }
        definitions.push(format!(
            "{} timestamp(0) without time zone NOT NULL",
            quote_ident("dateCreated")
        ));
        definitions.push(format!(
            "{} timestamp(0) without time zone NOT NULL",
            quote_ident("dateUpdated")
        ));
        definitions.push(format!("{} uuid NOT NULL", quote_ident("uid")));

        let mut statements = vec![format!(
            "CREATE TABLE {} ({})",
            table,
            definitions.join(", ")
        )];

        statements.push(self.index_statement(&self.key_columns(), true));
        statements.push(self.index_statement(&["fieldId"], false));
        if self.per_site {
            statements.push(self.index_statement(&["siteId"], false));
        }

        statements.push(self.foreign_key_statement("elementId", &self.elements_table));
        statements.push(self.foreign_key_statement("fieldId", &self.fields_table));

        statements
    }

    /// Statement dropping the table.
    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(&self.table))
    }

    fn index_statement(&self, columns: &[&str], unique: bool) -> String {
        let suffix = if unique { "unq_idx" } else { "idx" };
        let name = format!("{}_{}_{}", self.table, columns.join("_"), suffix);
        let list = columns
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            quote_ident(&name),
            quote_ident(&self.table),
            list
        )
    }

    fn foreign_key_statement(&self, column: &str, target: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
            quote_ident(&self.table),
            quote_ident(&format!("{}_{}_fk", self.table, column)),
            quote_ident(column),
            quote_ident(target),
            quote_ident("id")
        )
    }
}

/// Key and audit columns every side table carries.
pub const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "elementId",
    "fieldId",
    "siteId",
    "dateCreated",
    "dateUpdated",
    "uid",
];

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
