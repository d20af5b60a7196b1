//! End-to-end flows through the public API
//!
//! Test flow:
//! 1. Donor and receiver register and complete their profiles
//! 2. Donor shares a listing; the receiver's feed shows it
//! 3. Receiver claims it; the feed drops it and the listing records the claim

use std::sync::Arc;
use std::time::Duration;

use halo::auth::{AuthProvider, MemoryAuth};
use halo::claim::{ClaimArbiter, ClaimError};
use halo::config::{ClaimConfig, StoreConfig};
use halo::listing::{
    get_food_item, list_available_items, share_food_item, subscribe_available_items,
};
use halo::model::{Coordinates, DonorCategory, DonorDetails, NewFoodItem, ReceiverDetails, UserRole};
use halo::profile::{
    create_user_profile, load_profile, save_donor_details, save_receiver_details, select_role,
};
use halo::store::MemoryStore;

const WAIT: Duration = Duration::from_secs(2);

fn donor_details() -> DonorDetails {
    DonorDetails {
        donor_category: DonorCategory::Organization,
        donor_name: "Corner Bakery".to_string(),
        contact_name: Some("Meera".to_string()),
        mobile_number: "9000000001".to_string(),
        email_id: None,
        address: Some("12 Market Road".to_string()),
        pin_code: Some("400001".to_string()),
        city: Some("Mumbai".to_string()),
        location_coords: Some(Coordinates {
            latitude: 18.94,
            longitude: 72.83,
        }),
    }
}

fn receiver_details() -> ReceiverDetails {
    ReceiverDetails {
        receiver_category: "Shelter".to_string(),
        receiver_name: "Harbour Night Shelter".to_string(),
        contact_name: None,
        mobile_number: "9000000002".to_string(),
        email_id: None,
        address: None,
        pin_code: None,
        city: Some("Mumbai".to_string()),
        location_coords: None,
    }
}

#[test]
fn test_share_watch_and_claim() {
    let store = Arc::new(MemoryStore::new());
    let cfg = StoreConfig::default();
    let auth = MemoryAuth::new();

    let donor = auth.register("bakery@example.com", "loaves1").unwrap();
    create_user_profile(store.as_ref(), &cfg, &donor).unwrap();
    select_role(store.as_ref(), &cfg, &donor.id, UserRole::Donor).unwrap();
    save_donor_details(store.as_ref(), &cfg, &donor.id, &donor_details()).unwrap();

    let receiver = auth.register("shelter@example.com", "shelter1").unwrap();
    create_user_profile(store.as_ref(), &cfg, &receiver).unwrap();
    save_receiver_details(store.as_ref(), &cfg, &receiver.id, &receiver_details()).unwrap();

    let donor_profile = load_profile(store.as_ref(), &cfg, &donor.id).unwrap();
    assert_eq!(donor_profile.role, Some(UserRole::Donor));
    assert_eq!(donor_profile.display_name(), "Corner Bakery");
    let receiver_profile = load_profile(store.as_ref(), &cfg, &receiver.id).unwrap();
    assert_eq!(receiver_profile.role, Some(UserRole::Receiver));

    let feed = subscribe_available_items(store.as_ref(), &cfg).unwrap();
    assert_eq!(feed.next_timeout(WAIT), Some(vec![]));

    let mut bread = NewFoodItem::new("Day-old bread");
    bread.pickup_location = Some("12 Market Road".to_string());
    let shared = share_food_item(store.as_ref(), &cfg, &donor.id, &bread).unwrap();

    let listed = feed.next_timeout(WAIT).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, shared.id);
    assert_eq!(listed[0].donor_id, donor.id);

    // receiver is the most recent registration, so it is the signed-in user
    assert_eq!(auth.current_user().map(|u| u.id), Some(receiver.id.clone()));
    let arbiter = ClaimArbiter::new(store.clone(), &cfg, ClaimConfig::default());
    arbiter.claim_as_current_user(&auth, &shared.id).unwrap();

    assert_eq!(feed.next_timeout(WAIT), Some(vec![]));
    let claimed = get_food_item(store.as_ref(), &cfg, &shared.id).unwrap();
    assert!(claimed.is_claimed_by(&receiver.id));
    assert!(claimed.claimed_at.is_some());
    assert!(list_available_items(store.as_ref(), &cfg).unwrap().is_empty());

    auth.sign_in("bakery@example.com", "loaves1").unwrap();
    assert!(matches!(
        arbiter.claim_as_current_user(&auth, &shared.id),
        Err(ClaimError::ClaimConflict { .. })
    ));
    auth.sign_out().unwrap();
    assert_eq!(
        arbiter.claim_as_current_user(&auth, &shared.id),
        Err(ClaimError::NotAuthenticated)
    );
}

#[test]
fn test_claim_time_follows_creation_time() {
    let store = Arc::new(MemoryStore::new());
    let cfg = StoreConfig::default();
    let item = share_food_item(store.as_ref(), &cfg, "d1", &NewFoodItem::new("Soup")).unwrap();

    let arbiter = ClaimArbiter::new(store.clone(), &cfg, ClaimConfig::default());
    arbiter.claim(&item.id, "u1").unwrap();

    let claimed = get_food_item(store.as_ref(), &cfg, &item.id).unwrap();
    let created_at = claimed.created_at.unwrap();
    let claimed_at = claimed.claimed_at.unwrap();
    assert!(claimed_at > created_at);
    assert!(claimed_at <= chrono::Utc::now() + chrono::Duration::seconds(1));
}

#[test]
fn test_listing_fields_survive_claim() {
    let store = Arc::new(MemoryStore::new());
    let cfg = StoreConfig::default();
    let mut new_item = NewFoodItem::new("Fruit crate");
    new_item.description = Some("Apples and pears".to_string());
    let item = share_food_item(store.as_ref(), &cfg, "d1", &new_item).unwrap();

    let arbiter = ClaimArbiter::new(store.clone(), &cfg, ClaimConfig::default());
    arbiter.claim(&item.id, "u1").unwrap();

    let claimed = get_food_item(store.as_ref(), &cfg, &item.id).unwrap();
    assert_eq!(claimed.item_name, item.item_name);
    assert_eq!(claimed.description, item.description);
    assert_eq!(claimed.donor_id, item.donor_id);
    assert_eq!(claimed.created_at, item.created_at);

    let doc = serde_json::to_value(&claimed).unwrap();
    assert_eq!(doc["status"], "Claimed");
    assert_eq!(doc["claimedByUserId"], "u1");
}
