//! # HALO
//!
//! Food-donation listings with race-free claim arbitration over a
//! transactional document store.
//!
//! Donors share surplus food as listings; receivers claim them. A claim is a
//! single optimistic transaction against the store, so however many people
//! tap "claim" at once, exactly one of them gets the item.
//!
//! - [`store`]: the `DocumentStore` capability and the in-memory `MemoryStore`
//! - [`transaction`]: read-then-write transactions with version preconditions
//! - [`claim`]: single-attempt claims and the retrying `ClaimArbiter`
//! - [`listing`], [`profile`], [`auth`]: the surrounding app surface
//!
//! See README.md for configuration and logging.

pub mod auth;
pub mod claim;
pub mod config;
pub mod listing;
pub mod metrics;
pub mod model;
pub mod profile;
pub mod store;
pub mod transaction;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use auth::{AuthError, AuthProvider, AuthUser, MemoryAuth};
pub use claim::{claim_food_item, ClaimArbiter, ClaimError};
pub use config::{ClaimConfig, StoreConfig};
pub use listing::{FoodItemFeed, ListingError};
pub use model::{FoodItem, FoodStatus, NewFoodItem, UserProfile, UserRole};
pub use profile::ProfileError;
pub use store::{DocumentStore, MemoryStore, StoreError};
pub use transaction::{run_transaction, Transaction, TransactionError};
