//! Shared food listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{decode, ModelError};
use crate::store::{Document, FieldUpdates, StoreError};

pub const DONOR_ID_FIELD: &str = "donorId";
pub const STATUS_FIELD: &str = "status";
pub const CLAIMED_BY_FIELD: &str = "claimedByUserId";
pub const CLAIMED_AT_FIELD: &str = "claimedAt";
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Listing lifecycle. `Available` moves to `Claimed` once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FoodStatus {
    Available,
    Claimed,
}

impl FoodStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodStatus::Available => "Available",
            FoodStatus::Claimed => "Claimed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Available" => Some(FoodStatus::Available),
            "Claimed" => Some(FoodStatus::Claimed),
            _ => None,
        }
    }
}

/// Pickup point picked on the map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ModelError::InvalidField {
                field: "latitude",
                reason: format!("{} is outside -90..=90", self.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ModelError::InvalidField {
                field: "longitude",
                reason: format!("{} is outside -180..=180", self.longitude),
            });
        }
        Ok(())
    }
}

/// A stored food listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    #[serde(skip)]
    pub id: String,
    pub item_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pickup_location: Option<String>,
    #[serde(default)]
    pub pickup_coords: Option<Coordinates>,
    #[serde(default)]
    pub image_base64: Option<String>,
    pub donor_id: String,
    pub status: FoodStatus,
    #[serde(default)]
    pub claimed_by_user_id: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl FoodItem {
    pub fn from_document(doc: &Document) -> Result<Self, ModelError> {
        let mut item: FoodItem = decode(doc)?;
        item.id = doc.id().to_string();
        Ok(item)
    }

    pub fn is_available(&self) -> bool {
        self.status == FoodStatus::Available
    }

    pub fn is_claimed_by(&self, user_id: &str) -> bool {
        self.status == FoodStatus::Claimed && self.claimed_by_user_id.as_deref() == Some(user_id)
    }
}

/// Donor input for a new listing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFoodItem {
    pub item_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pickup_coords: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl NewFoodItem {
    pub fn new(item_name: impl Into<String>) -> Self {
        Self {
            item_name: item_name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.item_name.trim().is_empty() {
            return Err(ModelError::InvalidField {
                field: "itemName",
                reason: "item name is required".to_string(),
            });
        }
        if let Some(coords) = &self.pickup_coords {
            coords.validate()?;
        }
        Ok(())
    }

    /// Fields for the initial document: `Available`, owned by `donor_id`,
    /// stamped with the commit time.
    pub fn to_fields(&self, donor_id: &str) -> Result<FieldUpdates, StoreError> {
        Ok(FieldUpdates::from_serializable(self)?
            .with(DONOR_ID_FIELD, donor_id)
            .with(STATUS_FIELD, FoodStatus::Available.as_str())
            .with_server_timestamp(CREATED_AT_FIELD))
    }
}
