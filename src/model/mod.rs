//! Typed views over stored documents.

pub mod food_item;
pub mod user_profile;

pub use food_item::{Coordinates, FoodItem, FoodStatus, NewFoodItem};
pub use user_profile::{DonorCategory, DonorDetails, ReceiverDetails, UserProfile, UserRole};

use crate::store::{Document, StoreError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Error decoding a document into a model type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Document fields do not match the model
    Decode { id: String, reason: String },
    /// Field value outside its allowed range
    InvalidField { field: &'static str, reason: String },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Decode { id, reason } => {
                write!(f, "Could not decode document {id}: {reason}")
            }
            ModelError::InvalidField { field, reason } => {
                write!(f, "Invalid value for {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

impl From<ModelError> for StoreError {
    fn from(err: ModelError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Deserialize a document body into `T`
pub(crate) fn decode<T: DeserializeOwned>(doc: &Document) -> Result<T, ModelError> {
    serde_json::from_value(Value::Object(doc.fields.clone())).map_err(|e| ModelError::Decode {
        id: doc.id().to_string(),
        reason: e.to_string(),
    })
}
