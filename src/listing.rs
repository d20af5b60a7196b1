//! Food listings: share, fetch, list and watch available items.

use std::fmt;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::model::food_item::{CREATED_AT_FIELD, STATUS_FIELD};
use crate::model::{FoodItem, FoodStatus, ModelError, NewFoodItem};
use crate::store::{Direction, Document, DocumentPath, DocumentStore, Query, StoreError, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    /// Rejected input
    Invalid(ModelError),
    /// Stored document is not a valid listing
    Corrupt(ModelError),
    NotFound { item_id: String },
    Store(StoreError),
}

impl fmt::Display for ListingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingError::Invalid(e) => write!(f, "Invalid listing: {e}"),
            ListingError::Corrupt(e) => write!(f, "Corrupt listing: {e}"),
            ListingError::NotFound { item_id } => write!(f, "Food item {item_id} does not exist"),
            ListingError::Store(e) => write!(f, "Store error: {e}"),
        }
    }
}

impl std::error::Error for ListingError {}

impl From<StoreError> for ListingError {
    fn from(err: StoreError) -> Self {
        ListingError::Store(err)
    }
}

/// Validate `item` and create it as an `Available` listing owned by `donor_id`
pub fn share_food_item(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    donor_id: &str,
    item: &NewFoodItem,
) -> Result<FoodItem, ListingError> {
    if donor_id.trim().is_empty() {
        return Err(ListingError::Invalid(ModelError::InvalidField {
            field: "donorId",
            reason: "donor id is required".to_string(),
        }));
    }
    item.validate().map_err(ListingError::Invalid)?;

    let id = store.create_document(&config.food_items_collection, item.to_fields(donor_id)?)?;
    log::info!("donor {donor_id} shared food item {id}");
    get_food_item(store, config, &id)
}

pub fn get_food_item(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    item_id: &str,
) -> Result<FoodItem, ListingError> {
    let path = DocumentPath::new(&config.food_items_collection, item_id);
    let doc = store
        .read_document(&path)?
        .ok_or_else(|| ListingError::NotFound {
            item_id: item_id.to_string(),
        })?;
    FoodItem::from_document(&doc).map_err(ListingError::Corrupt)
}

/// Available items, newest first
pub fn available_items_query(config: &StoreConfig) -> Query {
    Query::collection(&config.food_items_collection)
        .where_eq(STATUS_FIELD, FoodStatus::Available.as_str())
        .order_by(CREATED_AT_FIELD, Direction::Descending)
}

pub fn list_available_items(
    store: &dyn DocumentStore,
    config: &StoreConfig,
) -> Result<Vec<FoodItem>, ListingError> {
    let docs = store.query(&available_items_query(config))?;
    Ok(decode_all(&docs))
}

/// Subscribe to the available-items list
pub fn subscribe_available_items(
    store: &dyn DocumentStore,
    config: &StoreConfig,
) -> Result<FoodItemFeed, ListingError> {
    let subscription = store.subscribe(available_items_query(config))?;
    Ok(FoodItemFeed { subscription })
}

/// Undecodable documents are skipped so one bad listing cannot blank the feed.
fn decode_all(docs: &[Document]) -> Vec<FoodItem> {
    docs.iter()
        .filter_map(|doc| match FoodItem::from_document(doc) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("skipping listing {}: {e}", doc.path);
                None
            }
        })
        .collect()
}

/// Live view of available items; each update is the full current list
pub struct FoodItemFeed {
    subscription: Subscription,
}

impl FoodItemFeed {
    /// Block until the next list; `None` once the store is gone
    pub fn next(&self) -> Option<Vec<FoodItem>> {
        self.subscription.recv().map(|docs| decode_all(&docs))
    }

    pub fn next_timeout(&self, timeout: Duration) -> Option<Vec<FoodItem>> {
        self.subscription
            .recv_timeout(timeout)
            .map(|docs| decode_all(&docs))
    }

    /// Newest pending list, if any arrived since the last read
    pub fn latest(&self) -> Option<Vec<FoodItem>> {
        self.subscription.latest().map(|docs| decode_all(&docs))
    }
}
