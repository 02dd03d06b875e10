//! # Foreign Fields
//!
//! Attaches side-table attribute bundles ("foreign fields") to host elements
//! and extends element queries so the bundles can be eager-loaded, filtered
//! and sorted on without one lookup per element.
//!
//! ## Modules
//!
//! - `model`: attribute bundles and the `ForeignModel` wrapper with root resolution
//! - `field`: the `ForeignField` lifecycle (normalize, save, delete, install)
//! - `query`: element queries, the attachment engine and the filter hook
//! - `validator`: value validation for forms
//! - `config`: environment configuration and dependency wiring

pub mod config;
pub mod errors;
pub mod field;
pub mod model;
pub mod query;
pub mod validator;

pub use config::{Dependencies, EngineConfig};
pub use errors::ForeignFieldError;
pub use field::{ForeignField, RawValue, TranslationMethod};
pub use model::{AttributeBundle, ForeignModel, ModelErrors};
pub use query::{
    attach_to, AttachOptions, AttachOutcome, Dialect, ElementQuery, ElementQueryInterface,
    PreparedQuery, QueryAttachment, QueryContext,
};
pub use validator::{FieldValidationError, ForeignModelValidator};
