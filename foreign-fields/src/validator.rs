//! Validation of foreign field values.

use std::any::Any;
use std::marker::PhantomData;

use thiserror::Error;

use crate::model::{AttributeBundle, ForeignModel};

/// Field-level validation failure, reported to the user rather than raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldValidationError {
    #[error("{attribute} must be an instance of {model}.")]
    WrongType {
        attribute: String,
        model: &'static str,
    },

    #[error("{attribute} is invalid: {summary}")]
    Invalid { attribute: String, summary: String },
}

/// Checks that a value is a valid `ForeignModel<M>`.
#[derive(Debug, Clone)]
pub struct ForeignModelValidator<M> {
    attribute: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: AttributeBundle> ForeignModelValidator<M> {
    /// Create a validator reporting errors under `attribute`.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            _model: PhantomData,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn validate_value(&self, value: &dyn Any) -> Result<(), FieldValidationError> {
        let Some(model) = value.downcast_ref::<ForeignModel<M>>() else {
            return Err(FieldValidationError::WrongType {
                attribute: self.attribute.clone(),
                model: M::model_name(),
            });
        };

        model
            .validate()
            .map_err(|errors| FieldValidationError::Invalid {
                attribute: self.attribute.clone(),
                summary: errors.summary(),
            })
    }
}
