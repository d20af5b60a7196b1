//! User profiles: creation at registration, role selection, donor/receiver details.
//!
//! Detail and role saves are merge writes, so each screen only touches its own
//! fields and never clobbers what another step stored.

use serde_json::Value;
use std::fmt;

use crate::auth::AuthUser;
use crate::config::StoreConfig;
use crate::model::{DonorDetails, ModelError, ReceiverDetails, UserProfile, UserRole};
use crate::store::{DocumentPath, DocumentStore, FieldUpdates, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// Rejected form input
    Invalid(ModelError),
    /// No profile document for this user
    ProfileNotFound(String),
    /// Stored profile could not be decoded
    Corrupt(ModelError),
    Store(StoreError),
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::Invalid(e) => write!(f, "Invalid profile details: {e}"),
            ProfileError::ProfileNotFound(uid) => write!(f, "No profile found for user {uid}"),
            ProfileError::Corrupt(e) => write!(f, "Corrupt profile: {e}"),
            ProfileError::Store(e) => write!(f, "Store error: {e}"),
        }
    }
}

impl std::error::Error for ProfileError {}

impl From<StoreError> for ProfileError {
    fn from(err: StoreError) -> Self {
        ProfileError::Store(err)
    }
}

fn profile_path(config: &StoreConfig, uid: &str) -> DocumentPath {
    DocumentPath::new(&config.users_collection, uid)
}

/// Write the initial profile for a freshly registered account; no role yet
pub fn create_user_profile(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    user: &AuthUser,
) -> Result<(), ProfileError> {
    let fields = FieldUpdates::new()
        .with("uid", user.id.as_str())
        .with("email", user.email.as_str())
        .with("role", Value::Null)
        .with_server_timestamp("createdAt");
    store.set_document(&profile_path(config, &user.id), fields, false)?;
    Ok(())
}

pub fn select_role(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    uid: &str,
    role: UserRole,
) -> Result<(), ProfileError> {
    store.set_document(
        &profile_path(config, uid),
        FieldUpdates::new().with("role", role.as_str()),
        true,
    )?;
    log::info!("user {uid} selected role {}", role.as_str());
    Ok(())
}

pub fn save_donor_details(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    uid: &str,
    details: &DonorDetails,
) -> Result<(), ProfileError> {
    details.validate().map_err(ProfileError::Invalid)?;
    save_details(store, config, uid, UserRole::Donor, details)
}

pub fn save_receiver_details(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    uid: &str,
    details: &ReceiverDetails,
) -> Result<(), ProfileError> {
    details.validate().map_err(ProfileError::Invalid)?;
    save_details(store, config, uid, UserRole::Receiver, details)
}

fn save_details<T: serde::Serialize>(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    uid: &str,
    role: UserRole,
    details: &T,
) -> Result<(), ProfileError> {
    let fields = FieldUpdates::from_serializable(details)?
        .with("role", role.as_str())
        .with_server_timestamp("profileUpdatedAt");
    store.set_document(&profile_path(config, uid), fields, true)?;
    log::info!("saved {} details for user {uid}", role.as_str());
    Ok(())
}

pub fn load_profile(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    uid: &str,
) -> Result<UserProfile, ProfileError> {
    let doc = store
        .read_document(&profile_path(config, uid))?
        .ok_or_else(|| ProfileError::ProfileNotFound(uid.to_string()))?;
    UserProfile::from_document(&doc).map_err(ProfileError::Corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Coordinates, DonorCategory};
    use crate::store::MemoryStore;

    fn user() -> AuthUser {
        AuthUser {
            id: "u1".to_string(),
            email: "donor@example.com".to_string(),
            display_name: None,
        }
    }

    fn donor_details() -> DonorDetails {
        DonorDetails {
            donor_category: DonorCategory::Individual,
            donor_name: "Asha".to_string(),
            contact_name: None,
            mobile_number: "9876543210".to_string(),
            email_id: Some("donor@example.com".to_string()),
            address: None,
            pin_code: Some("560001".to_string()),
            city: Some("Bengaluru".to_string()),
            location_coords: Some(Coordinates {
                latitude: 12.97,
                longitude: 77.59,
            }),
        }
    }

    #[test]
    fn test_new_profile_has_no_role() {
        let store = MemoryStore::new();
        let cfg = StoreConfig::default();
        create_user_profile(&store, &cfg, &user()).unwrap();

        let profile = load_profile(&store, &cfg, "u1").unwrap();
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.role, None);
        assert!(profile.created_at.is_some());
        assert_eq!(profile.display_name(), "donor@example.com");
    }

    #[test]
    fn test_role_then_details_merge() {
        let store = MemoryStore::new();
        let cfg = StoreConfig::default();
        create_user_profile(&store, &cfg, &user()).unwrap();
        select_role(&store, &cfg, "u1", UserRole::Donor).unwrap();
        save_donor_details(&store, &cfg, "u1", &donor_details()).unwrap();

        let profile = load_profile(&store, &cfg, "u1").unwrap();
        assert_eq!(profile.role, Some(UserRole::Donor));
        assert_eq!(profile.email.as_deref(), Some("donor@example.com"));
        assert_eq!(profile.donor_category, Some(DonorCategory::Individual));
        assert_eq!(profile.city.as_deref(), Some("Bengaluru"));
        assert!(profile.profile_updated_at.is_some());
        assert_eq!(profile.display_name(), "Asha");
    }

    #[test]
    fn test_invalid_details_write_nothing() {
        let store = MemoryStore::new();
        let cfg = StoreConfig::default();
        let mut details = donor_details();
        details.donor_name = String::new();

        assert!(matches!(
            save_donor_details(&store, &cfg, "u1", &details),
            Err(ProfileError::Invalid(_))
        ));
        assert_eq!(store.writes_committed(), 0);
    }

    #[test]
    fn test_receiver_details() {
        let store = MemoryStore::new();
        let cfg = StoreConfig::default();
        create_user_profile(&store, &cfg, &user()).unwrap();
        let details = ReceiverDetails {
            receiver_category: "NGO".to_string(),
            receiver_name: "Night Shelter".to_string(),
            contact_name: Some("Ravi".to_string()),
            mobile_number: "12345".to_string(),
            email_id: None,
            address: None,
            pin_code: None,
            city: None,
            location_coords: None,
        };
        save_receiver_details(&store, &cfg, "u1", &details).unwrap();

        let profile = load_profile(&store, &cfg, "u1").unwrap();
        assert_eq!(profile.role, Some(UserRole::Receiver));
        assert_eq!(profile.receiver_category.as_deref(), Some("NGO"));
        assert_eq!(profile.display_name(), "Night Shelter");
    }

    #[test]
    fn test_load_missing_profile() {
        let store = MemoryStore::new();
        assert_eq!(
            load_profile(&store, &StoreConfig::default(), "ghost"),
            Err(ProfileError::ProfileNotFound("ghost".to_string()))
        );
    }
}
