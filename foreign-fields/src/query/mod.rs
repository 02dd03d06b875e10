//! Element queries and the foreign field query extension.
//!
//! ## Key Features
//!
//! - `ElementQuery` criteria prepared into a subquery and a main query
//! - Idempotent attachment of foreign fields, applied once at prepare time
//! - Eager-loaded `field:<handle>` JSON columns and side-table joins
//! - Declarative filters through a before-prepare hook
//! - PostgreSQL and MySQL rendering, PostgreSQL execution

pub mod builder;
pub mod condition;
pub mod dialect;
pub mod element_query;
pub mod executor;
pub mod extension;
pub mod hooks;
pub mod param;

pub use builder::{OrderBy, SelectBuilder};
pub use condition::{CompareOp, Condition};
pub use dialect::Dialect;
pub use element_query::{ElementQuery, ElementQueryInterface, PreparedQuery};
pub use executor::{PostgresQueryRunner, Row};
pub use extension::{
    attach_to, prepare_query_filter, AttachOptions, AttachOutcome, AttachmentState, FilterMap,
    QueryAttachment,
};
pub use hooks::{
    BeforePrepareHook, FieldLayoutProvider, ForeignFieldFilterHook, QueryContext,
    StaticFieldLayouts,
};
pub use param::{parse_param, InvalidParam};
