//! User profile documents (`users/{uid}`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::food_item::Coordinates;
use super::{decode, ModelError};
use crate::store::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "donor", alias = "Donor")]
    Donor,
    #[serde(rename = "receiver", alias = "Receiver")]
    Receiver,
    #[serde(rename = "volunteer", alias = "Volunteer")]
    Volunteer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Donor => "donor",
            UserRole::Receiver => "receiver",
            UserRole::Volunteer => "volunteer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DonorCategory {
    #[serde(rename = "individual", alias = "Individual")]
    Individual,
    #[serde(rename = "organization", alias = "Organization")]
    Organization,
}

fn require(field: &'static str, value: &str) -> Result<(), ModelError> {
    if value.trim().is_empty() {
        return Err(ModelError::InvalidField {
            field,
            reason: "value is required".to_string(),
        });
    }
    Ok(())
}

/// Donor registration form. Optional fields are written as `null` when empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorDetails {
    pub donor_category: DonorCategory,
    pub donor_name: String,
    pub contact_name: Option<String>,
    pub mobile_number: String,
    pub email_id: Option<String>,
    pub address: Option<String>,
    pub pin_code: Option<String>,
    pub city: Option<String>,
    pub location_coords: Option<Coordinates>,
}

impl DonorDetails {
    pub fn validate(&self) -> Result<(), ModelError> {
        require("donorName", &self.donor_name)?;
        require("mobileNumber", &self.mobile_number)?;
        if let Some(coords) = &self.location_coords {
            coords.validate()?;
        }
        Ok(())
    }
}

/// Receiver registration form. Optional fields are written as `null` when empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverDetails {
    pub receiver_category: String,
    pub receiver_name: String,
    pub contact_name: Option<String>,
    pub mobile_number: String,
    pub email_id: Option<String>,
    pub address: Option<String>,
    pub pin_code: Option<String>,
    pub city: Option<String>,
    pub location_coords: Option<Coordinates>,
}

impl ReceiverDetails {
    pub fn validate(&self) -> Result<(), ModelError> {
        require("receiverCategory", &self.receiver_category)?;
        require("receiverName", &self.receiver_name)?;
        require("mobileNumber", &self.mobile_number)?;
        if let Some(coords) = &self.location_coords {
            coords.validate()?;
        }
        Ok(())
    }
}

/// Stored profile as read back from the store
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub display_name: Option<String>,
    pub donor_category: Option<DonorCategory>,
    pub donor_name: Option<String>,
    pub receiver_category: Option<String>,
    pub receiver_name: Option<String>,
    pub contact_name: Option<String>,
    pub mobile_number: Option<String>,
    pub city: Option<String>,
    pub location_coords: Option<Coordinates>,
    pub created_at: Option<DateTime<Utc>>,
    pub profile_updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn from_document(doc: &Document) -> Result<Self, ModelError> {
        let mut profile: UserProfile = decode(doc)?;
        if profile.uid.is_empty() {
            profile.uid = doc.id().to_string();
        }
        Ok(profile)
    }

    /// First non-empty of display name, donor name, receiver name, email; else "User"
    pub fn display_name(&self) -> String {
        [
            &self.display_name,
            &self.donor_name,
            &self.receiver_name,
            &self.email,
        ]
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| "User".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentPath;
    use serde_json::json;

    fn document(fields: serde_json::Value) -> Document {
        let now = Utc::now();
        Document {
            path: DocumentPath::new("users", "u1"),
            fields: fields.as_object().cloned().unwrap(),
            version: 1,
            create_time: now,
            update_time: now,
        }
    }

    #[test]
    fn test_role_accepts_both_spellings() {
        let lower: UserRole = serde_json::from_value(json!("donor")).unwrap();
        let upper: UserRole = serde_json::from_value(json!("Donor")).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(serde_json::to_value(UserRole::Receiver).unwrap(), json!("receiver"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let profile = UserProfile::from_document(&document(json!({
            "email": "donor@example.com",
            "role": "Donor",
            "donorName": "City Bakery",
        })))
        .unwrap();
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.role, Some(UserRole::Donor));
        assert_eq!(profile.display_name(), "City Bakery");

        let profile = UserProfile::from_document(&document(json!({
            "email": "someone@example.com",
            "role": null,
        })))
        .unwrap();
        assert_eq!(profile.display_name(), "someone@example.com");

        assert_eq!(UserProfile::default().display_name(), "User");
    }

    #[test]
    fn test_donor_details_validation() {
        let mut details = DonorDetails {
            donor_category: DonorCategory::Organization,
            donor_name: "Food Bank".to_string(),
            contact_name: None,
            mobile_number: "".to_string(),
            email_id: None,
            address: None,
            pin_code: None,
            city: None,
            location_coords: None,
        };
        assert!(matches!(
            details.validate(),
            Err(ModelError::InvalidField { field: "mobileNumber", .. })
        ));

        details.mobile_number = "9876543210".to_string();
        assert!(details.validate().is_ok());
    }

    #[test]
    fn test_receiver_details_require_category() {
        let details = ReceiverDetails {
            receiver_category: " ".to_string(),
            receiver_name: "Shelter".to_string(),
            contact_name: None,
            mobile_number: "123".to_string(),
            email_id: None,
            address: None,
            pin_code: None,
            city: None,
            location_coords: None,
        };
        assert!(matches!(
            details.validate(),
            Err(ModelError::InvalidField { field: "receiverCategory", .. })
        ));
    }
}
