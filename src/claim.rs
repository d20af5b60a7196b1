//! Claim arbitration.
//!
//! A claim moves a food listing from `Available` to `Claimed` for exactly one
//! user. The check and the write happen in one optimistic transaction: the
//! item is read, its status checked, and the three claim fields written; the
//! store refuses the commit if the item changed after the read. Of any number
//! of racing claimants only the first commit lands, and every other claimant
//! either aborts (and re-reads a claimed item) or reads it already claimed.
//!
//! [`claim_food_item`] makes a single attempt. [`ClaimArbiter`] is the calling
//! layer: it retries transient contention within a bounded attempt budget and
//! deadline, then reports [`ClaimError::Unavailable`].

use may::coroutine;
use may::sync::mpsc;
use rand::Rng;
use std::fmt;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::AuthProvider;
use crate::config::{ClaimConfig, StoreConfig};
use crate::model::food_item::{CLAIMED_AT_FIELD, CLAIMED_BY_FIELD, STATUS_FIELD};
use crate::model::FoodStatus;
use crate::store::{DocumentPath, DocumentStore, FieldUpdates, StoreError};
use crate::transaction::{run_transaction, TransactionError};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Stack for attempt coroutines, in words
const ATTEMPT_STACK_SIZE: usize = 0x8000;

/// Claim error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// No signed-in user, or an empty claimant id
    NotAuthenticated,
    /// The item id does not resolve to a document
    NotFound { item_id: String },
    /// The item exists but was not available when read
    ClaimConflict {
        item_id: String,
        claimed_by: Option<String>,
    },
    /// A single attempt lost a race or hit a transient store failure
    Contention(String),
    /// Retry budget or deadline exhausted
    Unavailable { attempts: u32, reason: String },
    /// Non-transient store failure
    Store(StoreError),
}

impl ClaimError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClaimError::Contention(_))
    }

    fn outcome(&self) -> &'static str {
        match self {
            ClaimError::NotAuthenticated => "not_authenticated",
            ClaimError::NotFound { .. } => "not_found",
            ClaimError::ClaimConflict { .. } => "conflict",
            ClaimError::Contention(_) => "contention",
            ClaimError::Unavailable { .. } => "unavailable",
            ClaimError::Store(_) => "store_error",
        }
    }
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::NotAuthenticated => write!(f, "Log in to claim items"),
            ClaimError::NotFound { item_id } => write!(f, "Food item {item_id} does not exist"),
            ClaimError::ClaimConflict { item_id, .. } => {
                write!(f, "Food item {item_id} is no longer available")
            }
            ClaimError::Contention(s) => write!(f, "Claim attempt contended: {s}"),
            ClaimError::Unavailable { attempts, reason } => write!(
                f,
                "Could not claim item after {attempts} attempt(s): {reason}"
            ),
            ClaimError::Store(e) => write!(f, "Store error: {e}"),
        }
    }
}

impl std::error::Error for ClaimError {}

impl From<TransactionError> for ClaimError {
    fn from(err: TransactionError) -> Self {
        if err.is_transient() {
            return ClaimError::Contention(err.to_string());
        }
        match err {
            TransactionError::Store(e) => ClaimError::Store(e),
            other => ClaimError::Store(StoreError::InvalidArgument(other.to_string())),
        }
    }
}

/// One claim attempt: read `collection/item_id`, check it is available, write
/// the claim. Nothing is written on any error path.
pub fn claim_food_item(
    store: &dyn DocumentStore,
    collection: &str,
    item_id: &str,
    claimant_user_id: &str,
) -> Result<(), ClaimError> {
    if claimant_user_id.trim().is_empty() {
        return Err(ClaimError::NotAuthenticated);
    }
    if item_id.is_empty() {
        return Err(ClaimError::NotFound {
            item_id: String::new(),
        });
    }

    let path = DocumentPath::new(collection, item_id);
    run_transaction(store, |txn| {
        let doc = txn.get(&path)?.ok_or_else(|| ClaimError::NotFound {
            item_id: item_id.to_string(),
        })?;

        let available = doc
            .get_str(STATUS_FIELD)
            .and_then(FoodStatus::parse)
            .map_or(false, |s| s == FoodStatus::Available);
        if !available {
            return Err(ClaimError::ClaimConflict {
                item_id: item_id.to_string(),
                claimed_by: doc.get_str(CLAIMED_BY_FIELD).map(str::to_string),
            });
        }

        txn.update(
            &path,
            FieldUpdates::new()
                .with(STATUS_FIELD, FoodStatus::Claimed.as_str())
                .with(CLAIMED_BY_FIELD, claimant_user_id)
                .with_server_timestamp(CLAIMED_AT_FIELD),
        )?;
        Ok(())
    })
}

/// Retrying front end for [`claim_food_item`]
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use halo::claim::{ClaimArbiter, ClaimError};
/// use halo::config::{ClaimConfig, StoreConfig};
/// use halo::listing::share_food_item;
/// use halo::model::NewFoodItem;
/// use halo::store::MemoryStore;
///
/// let store = Arc::new(MemoryStore::new());
/// let cfg = StoreConfig::default();
/// let item = share_food_item(store.as_ref(), &cfg, "donor-1", &NewFoodItem::new("Bread")).unwrap();
///
/// let arbiter = ClaimArbiter::new(store, &cfg, ClaimConfig::default());
/// assert_eq!(arbiter.claim(&item.id, "u1"), Ok(()));
/// assert!(matches!(arbiter.claim(&item.id, "u2"), Err(ClaimError::ClaimConflict { .. })));
/// ```
pub struct ClaimArbiter {
    store: Arc<dyn DocumentStore>,
    collection: String,
    config: ClaimConfig,
}

impl ClaimArbiter {
    pub fn new(store: Arc<dyn DocumentStore>, store_config: &StoreConfig, config: ClaimConfig) -> Self {
        Self {
            store,
            collection: store_config.food_items_collection.clone(),
            config,
        }
    }

    pub fn config(&self) -> &ClaimConfig {
        &self.config
    }

    /// Claim `item_id` for the user currently signed in to `auth`
    pub fn claim_as_current_user(
        &self,
        auth: &dyn AuthProvider,
        item_id: &str,
    ) -> Result<(), ClaimError> {
        let user = auth.current_user().ok_or(ClaimError::NotAuthenticated)?;
        self.claim(item_id, &user.id)
    }

    /// Claim `item_id` for `claimant_user_id`, retrying transient contention
    pub fn claim(&self, item_id: &str, claimant_user_id: &str) -> Result<(), ClaimError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::claim_span(item_id, claimant_user_id).entered();

        let start = Instant::now();
        let result = self.claim_with_retry(item_id, claimant_user_id, start);
        let outcome = match &result {
            Ok(()) => "claimed",
            Err(e) => e.outcome(),
        };

        #[cfg(feature = "metrics")]
        METRICS.record_claim(outcome, start.elapsed());

        match &result {
            Ok(()) => log::info!("item {item_id} claimed by {claimant_user_id}"),
            Err(e) => log::info!("claim of {item_id} by {claimant_user_id} failed ({outcome}): {e}"),
        }
        result
    }

    fn claim_with_retry(
        &self,
        item_id: &str,
        claimant_user_id: &str,
        start: Instant,
    ) -> Result<(), ClaimError> {
        // `None` when the timeout is too large to represent: no deadline
        let deadline = start.checked_add(self.config.timeout());
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_reason = String::from("no attempt made");
        let mut attempts = 0;

        while attempts < max_attempts {
            if deadline.map_or(false, |d| Instant::now() >= d) {
                return Err(self.timed_out(attempts));
            }
            attempts += 1;

            #[cfg(feature = "tracing")]
            let _attempt = tracing_helpers::claim_attempt_span(attempts).entered();

            let err = match self.run_attempt(attempts, item_id, claimant_user_id, deadline) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            log::debug!("claim attempt {attempts}/{max_attempts} on {item_id} contended: {err}");
            last_reason = err.to_string();
            if attempts < max_attempts {
                #[cfg(feature = "metrics")]
                METRICS.record_claim_retry();
                self.backoff(attempts, deadline);
            }
        }

        Err(ClaimError::Unavailable {
            attempts,
            reason: last_reason,
        })
    }

    /// Run one attempt on its own coroutine and wait for it until `deadline`.
    ///
    /// Past the deadline the caller stops waiting and gets `Unavailable`; the
    /// attempt itself runs to completion in the background.
    fn run_attempt(
        &self,
        attempt: u32,
        item_id: &str,
        claimant_user_id: &str,
        deadline: Option<Instant>,
    ) -> Result<(), ClaimError> {
        let (tx, rx) = mpsc::channel();
        let store = Arc::clone(&self.store);
        let collection = self.collection.clone();
        let item = item_id.to_string();
        let claimant = claimant_user_id.to_string();

        let builder = coroutine::Builder::new().stack_size(ATTEMPT_STACK_SIZE);
        may::go!(builder, move || {
            let result = claim_food_item(store.as_ref(), &collection, &item, &claimant);
            // A closed channel means the caller already gave up.
            let _ = tx.send(result);
        })
        .map_err(|e| ClaimError::Unavailable {
            attempts: attempt,
            reason: format!("could not start claim attempt: {e}"),
        })?;

        let received = match deadline {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("claim attempt {attempt} on {item_id} still running at the deadline");
                Err(self.timed_out(attempt))
            }
            Err(RecvTimeoutError::Disconnected) => Err(ClaimError::Unavailable {
                attempts: attempt,
                reason: "claim attempt ended without a result".to_string(),
            }),
        }
    }

    fn timed_out(&self, attempts: u32) -> ClaimError {
        ClaimError::Unavailable {
            attempts,
            reason: format!("timed out after {:?}", self.config.timeout()),
        }
    }

    /// Linear backoff with jitter, never sleeping past the deadline
    fn backoff(&self, attempt: u32, deadline: Option<Instant>) {
        let base = self.config.retry_backoff().saturating_mul(attempt);
        if base.is_zero() {
            return;
        }
        let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = rand::thread_rng().gen_range(0..=base_ms);
        let mut delay = base.saturating_add(Duration::from_millis(jitter_ms));
        if let Some(deadline) = deadline {
            delay = delay.min(deadline.saturating_duration_since(Instant::now()));
        }
        may::coroutine::sleep(delay);
    }
}
