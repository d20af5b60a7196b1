//! Document Store Module
//!
//! Provides the `DocumentStore` trait that abstracts the hosted document database.
//!
//! Every data-access operation in the crate (claims, listings, profiles) goes
//! through this trait, so the same code runs against the in-memory
//! [`MemoryStore`] in tests and against any backend adapter that honours the
//! same guarantees:
//! - snapshot reads that carry a per-document version
//! - atomic, all-or-nothing commits guarded by version preconditions
//! - a store clock for server-assigned timestamps
//! - push subscriptions for query results

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::fmt;
use std::time::Duration;

pub mod config;
pub mod memory;
pub mod types;

pub use memory::MemoryStore;
pub use types::{
    Direction, Document, DocumentId, DocumentPath, FieldFilter, FieldUpdates, FieldValue, Fields,
    Precondition, Query, Version, Write,
};

/// Store error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `Update` targeted a document that does not exist
    NotFound(DocumentPath),
    /// `Create` targeted a document that already exists
    AlreadyExists(DocumentPath),
    /// A commit precondition failed; the caller's reads are stale
    Aborted(String),
    /// The backend is temporarily unreachable or overloaded
    Unavailable(String),
    /// Malformed request (empty ids, non-object documents, ...)
    InvalidArgument(String),
    /// Document could not be encoded or decoded
    Serialization(String),
}

impl StoreError {
    /// Transient errors are worth retrying from a fresh read
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Aborted(_) | StoreError::Unavailable(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(path) => write!(f, "Document not found: {path}"),
            StoreError::AlreadyExists(path) => write!(f, "Document already exists: {path}"),
            StoreError::Aborted(s) => write!(f, "Commit aborted: {s}"),
            StoreError::Unavailable(s) => write!(f, "Store unavailable: {s}"),
            StoreError::InvalidArgument(s) => write!(f, "Invalid argument: {s}"),
            StoreError::Serialization(s) => write!(f, "Serialization error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Trait for document database access
///
/// Implementations must make `commit` atomic: either every precondition holds
/// and every write is applied, or nothing changes and `StoreError::Aborted`
/// (or another error) is returned. Readers must never observe a partially
/// applied commit.
///
/// # Examples
///
/// ```
/// use halo::store::{DocumentStore, DocumentPath, FieldUpdates, MemoryStore};
///
/// # fn main() -> Result<(), halo::store::StoreError> {
/// let store = MemoryStore::new();
/// let id = store.create_document(
///     "sharedFoodItems",
///     FieldUpdates::new().with("itemName", "Bread").with("status", "Available"),
/// )?;
///
/// let doc = store
///     .read_document(&DocumentPath::new("sharedFoodItems", id))?
///     .expect("just created");
/// assert_eq!(doc.get_str("itemName"), Some("Bread"));
/// # Ok(())
/// # }
/// ```
pub trait DocumentStore: Send + Sync {
    /// Read the current snapshot of a document, `None` when it does not exist
    fn read_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    /// Create a document with a store-assigned id and return that id
    fn create_document(
        &self,
        collection: &str,
        fields: FieldUpdates,
    ) -> Result<DocumentId, StoreError>;

    /// Atomically check `preconditions` and apply `writes`
    fn commit(&self, preconditions: &[Precondition], writes: Vec<Write>) -> Result<(), StoreError>;

    /// Run a one-shot query against current data
    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Subscribe to the result set of `query`
    ///
    /// The current result set is delivered immediately; a new one follows
    /// every commit that touches the queried collection.
    fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    /// Current store time
    fn server_timestamp(&self) -> DateTime<Utc>;

    /// Single write outside any transaction
    fn set_document(
        &self,
        path: &DocumentPath,
        fields: FieldUpdates,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.commit(
            &[],
            vec![Write::Set {
                path: path.clone(),
                fields,
                merge,
            }],
        )
    }
}

/// Push stream of query result sets
///
/// Dropping the subscription detaches it from the store.
pub struct Subscription {
    query: Query,
    rx: Receiver<Vec<Document>>,
}

impl Subscription {
    pub(crate) fn new(query: Query, rx: Receiver<Vec<Document>>) -> Self {
        Self { query, rx }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Block until the next result set; `None` once the store is gone
    pub fn recv(&self) -> Option<Vec<Document>> {
        self.rx.recv().ok()
    }

    /// Wait at most `timeout` for the next result set
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<Document>> {
        match self.rx.recv_timeout(timeout) {
            Ok(docs) => Some(docs),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain pending result sets and return the newest, if any
    pub fn latest(&self) -> Option<Vec<Document>> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(docs) => latest = Some(docs),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return latest,
            }
        }
    }
}
