//! Fixtures shared by unit and integration tests.
//!
//! Enabled for this crate's own tests and for dependents through the
//! `test-helpers` feature.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::auth::{AuthProvider, AuthUser};
use crate::config::StoreConfig;
use crate::model::food_item::{CREATED_AT_FIELD, DONOR_ID_FIELD, STATUS_FIELD};
use crate::model::FoodStatus;
use crate::store::{
    Document, DocumentId, DocumentPath, DocumentStore, FieldUpdates, MemoryStore, Precondition,
    Query, StoreError, Subscription, Write,
};

/// Write an `Available` listing with a fixed id
pub fn seed_food_item(
    store: &dyn DocumentStore,
    config: &StoreConfig,
    id: &str,
    donor_id: &str,
) -> Result<DocumentPath, StoreError> {
    let path = DocumentPath::new(&config.food_items_collection, id);
    let fields = FieldUpdates::new()
        .with("itemName", format!("Item {id}"))
        .with(DONOR_ID_FIELD, donor_id)
        .with(STATUS_FIELD, FoodStatus::Available.as_str())
        .with_server_timestamp(CREATED_AT_FIELD);
    store.set_document(&path, fields, false)?;
    Ok(path)
}

/// `MemoryStore` whose first `n` commits fail with an injected error
pub struct ContendedStore {
    inner: MemoryStore,
    failure: StoreError,
    failures_left: AtomicU32,
    commit_calls: AtomicU64,
}

impl ContendedStore {
    /// Abort the first `aborts` commits as if another writer won
    pub fn new(inner: MemoryStore, aborts: u32) -> Self {
        Self::failing_with(
            inner,
            aborts,
            StoreError::Aborted("injected contention".to_string()),
        )
    }

    /// Fail the first `failures` commits with `error`
    pub fn failing_with(inner: MemoryStore, failures: u32, error: StoreError) -> Self {
        Self {
            inner,
            failure: error,
            failures_left: AtomicU32::new(failures),
            commit_calls: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Commits attempted, injected failures included
    pub fn commit_calls(&self) -> u64 {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn failures_left(&self) -> u32 {
        self.failures_left.load(Ordering::SeqCst)
    }
}

impl DocumentStore for ContendedStore {
    fn read_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        self.inner.read_document(path)
    }

    fn create_document(
        &self,
        collection: &str,
        fields: FieldUpdates,
    ) -> Result<DocumentId, StoreError> {
        self.inner.create_document(collection, fields)
    }

    fn commit(&self, preconditions: &[Precondition], writes: Vec<Write>) -> Result<(), StoreError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(self.failure.clone());
        }
        self.inner.commit(preconditions, writes)
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.inner.query(query)
    }

    fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        self.inner.subscribe(query)
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        self.inner.server_timestamp()
    }
}

/// `MemoryStore` whose reads take `delay`, like a backend on a bad link
pub struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: MemoryStore, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl DocumentStore for SlowStore {
    fn read_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        may::coroutine::sleep(self.delay);
        self.inner.read_document(path)
    }

    fn create_document(
        &self,
        collection: &str,
        fields: FieldUpdates,
    ) -> Result<DocumentId, StoreError> {
        self.inner.create_document(collection, fields)
    }

    fn commit(&self, preconditions: &[Precondition], writes: Vec<Write>) -> Result<(), StoreError> {
        self.inner.commit(preconditions, writes)
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.inner.query(query)
    }

    fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        self.inner.subscribe(query)
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        self.inner.server_timestamp()
    }
}

/// Auth provider pinned to one user (or none)
pub struct FixedAuth(pub Option<AuthUser>);

impl FixedAuth {
    pub fn signed_in(uid: &str) -> Self {
        FixedAuth(Some(AuthUser {
            id: uid.to_string(),
            email: format!("{uid}@example.com"),
            display_name: None,
        }))
    }

    pub fn signed_out() -> Self {
        FixedAuth(None)
    }
}

impl AuthProvider for FixedAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.0.clone()
    }
}
