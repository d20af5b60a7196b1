//! Transaction Module
//!
//! Provides optimistic read-check-write transactions over any [`DocumentStore`].
//!
//! This module provides:
//! - `Transaction`, which records the version of every document it reads and
//!   buffers every write
//! - Commit, which hands the recorded versions to the store as preconditions
//!   so the store can reject the commit if any read went stale
//! - Rollback, which discards the buffered writes
//! - `run_transaction`, which commits on `Ok` and rolls back on `Err`

use crate::store::{
    Document, DocumentPath, DocumentStore, FieldUpdates, Precondition, StoreError, Version, Write,
};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Non-transient store error
    Store(StoreError),
    /// A document read by the transaction changed before commit
    Aborted(String),
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Reads must happen before the first buffered write
    ReadAfterWrite(DocumentPath),
    /// Other transaction errors
    Other(String),
}

impl TransactionError {
    /// Transient errors are worth retrying the whole transaction for
    pub fn is_transient(&self) -> bool {
        match self {
            TransactionError::Aborted(_) => true,
            TransactionError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Store(e) => write!(f, "Store error: {e}"),
            TransactionError::Aborted(s) => write!(f, "Transaction aborted: {s}"),
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            TransactionError::ReadAfterWrite(path) => {
                write!(f, "Transaction read {path} after a write was buffered")
            }
            TransactionError::Other(s) => write!(f, "Transaction error: {s}"),
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<StoreError> for TransactionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Aborted(s) => TransactionError::Aborted(s),
            other => TransactionError::Store(other),
        }
    }
}

/// A document store transaction
///
/// Reads record the version they observed; writes are buffered. On commit the
/// store checks that every read document is still at the recorded version (or
/// still absent) and applies all writes atomically. If any read went stale the
/// commit fails with [`TransactionError::Aborted`] and nothing is written.
///
/// # Examples
///
/// ```
/// use halo::store::{DocumentPath, DocumentStore, FieldUpdates, MemoryStore};
/// use halo::transaction::{Transaction, TransactionError};
///
/// # fn main() -> Result<(), TransactionError> {
/// let store = MemoryStore::new();
/// let path = DocumentPath::new("sharedFoodItems", "f1");
/// store.set_document(&path, FieldUpdates::new().with("status", "Available"), false)?;
///
/// let mut txn = Transaction::begin(&store);
/// let doc = txn.get(&path)?.expect("seeded above");
/// if doc.get_str("status") == Some("Available") {
///     txn.update(&path, FieldUpdates::new().with("status", "Claimed"))?;
/// }
/// txn.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    reads: BTreeMap<DocumentPath, Option<Version>>,
    writes: Vec<Write>,
    closed: bool,
}

impl<'a> Transaction<'a> {
    /// Start a new transaction against `store`
    pub fn begin(store: &'a dyn DocumentStore) -> Self {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        Self {
            store,
            reads: BTreeMap::new(),
            writes: Vec::new(),
            closed: false,
        }
    }

    /// Read a document and remember its version for the commit check
    ///
    /// Reading the same document twice returns the current snapshot again but
    /// keeps the first recorded version, so a change in between still aborts
    /// the commit.
    pub fn get(&mut self, path: &DocumentPath) -> Result<Option<Document>, TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        if !self.writes.is_empty() {
            return Err(TransactionError::ReadAfterWrite(path.clone()));
        }

        let doc = self.store.read_document(path)?;
        self.reads
            .entry(path.clone())
            .or_insert_with(|| doc.as_ref().map(|d| d.version));
        Ok(doc)
    }

    /// Buffer creation of a document that must not exist yet
    pub fn create(&mut self, path: &DocumentPath, fields: FieldUpdates) -> Result<(), TransactionError> {
        self.push(Write::Create {
            path: path.clone(),
            fields,
        })
    }

    /// Buffer a replace (or merge, when `merge` is set) of a document
    pub fn set(
        &mut self,
        path: &DocumentPath,
        fields: FieldUpdates,
        merge: bool,
    ) -> Result<(), TransactionError> {
        self.push(Write::Set {
            path: path.clone(),
            fields,
            merge,
        })
    }

    /// Buffer a field update of a document that must exist
    pub fn update(&mut self, path: &DocumentPath, fields: FieldUpdates) -> Result<(), TransactionError> {
        self.push(Write::Update {
            path: path.clone(),
            fields,
        })
    }

    fn push(&mut self, write: Write) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        self.writes.push(write);
        Ok(())
    }

    /// Commit the transaction
    ///
    /// All buffered writes are applied atomically, provided no document read
    /// by this transaction has changed since. After committing, the
    /// transaction is closed.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::Aborted` if a read went stale, or the store
    /// error that rejected a write. Either way nothing was written.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span =
            tracing_helpers::commit_transaction_span(self.reads.len(), self.writes.len()).entered();

        let preconditions: Vec<Precondition> = std::mem::take(&mut self.reads)
            .into_iter()
            .map(|(path, expected)| Precondition { path, expected })
            .collect();
        let writes = std::mem::take(&mut self.writes);
        self.closed = true;

        self.store.commit(&preconditions, writes)?;
        Ok(())
    }

    /// Roll back the transaction
    ///
    /// All buffered writes are discarded. After rolling back, the transaction
    /// is closed.
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.writes.clear();
        self.reads.clear();
        self.closed = true;
        Ok(())
    }

    /// Number of buffered writes
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Check if the transaction is closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
///
/// Makes exactly one attempt. A stale read surfaces as
/// `TransactionError::Aborted` converted into `E`; retrying is the caller's
/// decision.
pub fn run_transaction<T, E, F>(store: &dyn DocumentStore, f: F) -> Result<T, E>
where
    F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
    E: From<TransactionError>,
{
    let mut txn = Transaction::begin(store);
    match f(&mut txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(e) => {
            txn.rollback()?;
            Err(e)
        }
    }
}
