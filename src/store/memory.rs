//! In-memory `DocumentStore`
//!
//! Reference implementation of the document store contract. All state lives
//! behind one mutex: a commit checks its preconditions, stages its writes and
//! publishes them while holding the lock, so concurrent readers only ever see
//! whole commits.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossbeam_channel::{unbounded, Sender};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

use super::types::{Document, DocumentId, DocumentPath, FieldUpdates, Precondition, Query, Write};
use super::{DocumentStore, StoreError, Subscription};

struct Subscriber {
    query: Query,
    tx: Sender<Vec<Document>>,
}

struct StoreState {
    docs: HashMap<DocumentPath, Document>,
    subscribers: Vec<Subscriber>,
    last_commit_time: Option<DateTime<Utc>>,
}

impl StoreState {
    /// Commit timestamps are strictly increasing even when the wall clock is not
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_commit_time {
            if now <= last {
                now = last + ChronoDuration::microseconds(1);
            }
        }
        self.last_commit_time = Some(now);
        now
    }

    fn run_query(&self, query: &Query) -> Vec<Document> {
        let docs = self
            .docs
            .values()
            .filter(|d| d.path.collection == query.collection)
            .cloned()
            .collect();
        query.apply(docs)
    }

    fn notify(&mut self, touched: &BTreeSet<String>) {
        let mut subscribers = std::mem::take(&mut self.subscribers);
        subscribers.retain(|sub| {
            if !touched.contains(&sub.query.collection) {
                return true;
            }
            // A failed send means the `Subscription` was dropped.
            sub.tx.send(self.run_query(&sub.query)).is_ok()
        });
        self.subscribers = subscribers;
    }
}

/// Thread-safe in-memory document store
pub struct MemoryStore {
    state: Mutex<StoreState>,
    writes_committed: AtomicU64,
    commits: AtomicU64,
    aborted_commits: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                docs: HashMap::new(),
                subscribers: Vec::new(),
                last_commit_time: None,
            }),
            writes_committed: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            aborted_commits: AtomicU64::new(0),
        }
    }

    /// Total number of individual writes applied by successful commits
    pub fn writes_committed(&self) -> u64 {
        self.writes_committed.load(Ordering::SeqCst)
    }

    /// Number of successful commits that carried at least one write
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of commits rejected by a failed precondition
    pub fn aborted_commits(&self) -> u64 {
        self.aborted_commits.load(Ordering::SeqCst)
    }

    /// Number of stored documents across all collections
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store state lock poisoned".to_string()))
    }
}

fn validate_path(path: &DocumentPath) -> Result<(), StoreError> {
    if path.collection.is_empty() {
        return Err(StoreError::InvalidArgument(
            "Collection name cannot be empty".to_string(),
        ));
    }
    if path.id.is_empty() {
        return Err(StoreError::InvalidArgument(
            "Document id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn new_document(path: DocumentPath, fields: &FieldUpdates, now: DateTime<Utc>) -> Document {
    Document {
        path,
        fields: fields.resolve(now),
        version: 1,
        create_time: now,
        update_time: now,
    }
}

fn merge_into(mut doc: Document, fields: &FieldUpdates, now: DateTime<Utc>) -> Document {
    for (key, value) in fields.resolve(now) {
        doc.fields.insert(key, value);
    }
    doc.version += 1;
    doc.update_time = now;
    doc
}

/// Stage one write on top of `current`
fn stage_write(
    current: Option<Document>,
    write: &Write,
    now: DateTime<Utc>,
) -> Result<Document, StoreError> {
    match (write, current) {
        (Write::Create { path, .. }, Some(_)) => Err(StoreError::AlreadyExists(path.clone())),
        (Write::Create { path, fields }, None) => Ok(new_document(path.clone(), fields, now)),
        (Write::Update { path, .. }, None) => Err(StoreError::NotFound(path.clone())),
        (Write::Update { fields, .. }, Some(doc)) => Ok(merge_into(doc, fields, now)),
        (Write::Set { path, fields, .. }, None) => Ok(new_document(path.clone(), fields, now)),
        (Write::Set { fields, merge: true, .. }, Some(doc)) => Ok(merge_into(doc, fields, now)),
        (Write::Set { fields, merge: false, .. }, Some(mut doc)) => {
            doc.fields = fields.resolve(now);
            doc.version += 1;
            doc.update_time = now;
            Ok(doc)
        }
    }
}

impl DocumentStore for MemoryStore {
    fn read_document(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        validate_path(path)?;
        let state = self.lock()?;
        Ok(state.docs.get(path).cloned())
    }

    fn create_document(
        &self,
        collection: &str,
        fields: FieldUpdates,
    ) -> Result<DocumentId, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let path = DocumentPath::new(collection, id.clone());
        self.commit(&[], vec![Write::Create { path, fields }])?;
        Ok(id)
    }

    fn commit(&self, preconditions: &[Precondition], writes: Vec<Write>) -> Result<(), StoreError> {
        for write in &writes {
            validate_path(write.path())?;
        }

        let mut state = self.lock()?;

        for pre in preconditions {
            let current = state.docs.get(&pre.path).map(|d| d.version);
            if current != pre.expected {
                self.aborted_commits.fetch_add(1, Ordering::SeqCst);
                #[cfg(feature = "metrics")]
                METRICS.record_commit_aborted();
                log::debug!(
                    "commit aborted: {} expected version {:?}, found {:?}",
                    pre.path,
                    pre.expected,
                    current
                );
                return Err(StoreError::Aborted(format!(
                    "{} changed since it was read",
                    pre.path
                )));
            }
        }

        if writes.is_empty() {
            return Ok(());
        }

        // Stage everything first so a failing write leaves the store untouched.
        let now = state.next_timestamp();
        let mut staged: HashMap<DocumentPath, Document> = HashMap::new();
        for write in &writes {
            let path = write.path();
            let current = staged
                .remove(path)
                .or_else(|| state.docs.get(path).cloned());
            let next = stage_write(current, write, now)?;
            staged.insert(path.clone(), next);
        }

        let touched: BTreeSet<String> = staged.keys().map(|p| p.collection.clone()).collect();
        state.docs.extend(staged);

        self.writes_committed
            .fetch_add(writes.len() as u64, Ordering::SeqCst);
        self.commits.fetch_add(1, Ordering::SeqCst);
        #[cfg(feature = "metrics")]
        METRICS.record_commit(writes.len());
        log::trace!("committed {} write(s) at {now}", writes.len());

        state.notify(&touched);
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let state = self.lock()?;
        Ok(state.run_query(query))
    }

    fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let (tx, rx) = unbounded();
        let mut state = self.lock()?;
        // The initial snapshot is queued before the subscriber is registered,
        // under the same lock, so no commit can slip in between.
        let initial = state.run_query(&query);
        tx.send(initial)
            .map_err(|e| StoreError::Unavailable(format!("subscription channel closed: {e}")))?;
        state.subscribers.push(Subscriber {
            query: query.clone(),
            tx,
        });
        Ok(Subscription::new(query, rx))
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
