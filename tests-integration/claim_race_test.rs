//! Integration tests for claim arbitration
//!
//! These tests drive the public claim API against `MemoryStore`:
//! 1. Single-user claims, conflicts and missing items
//! 2. Many concurrent claimants on one item (threads and coroutines)
//! 3. Readers racing a claim never observe a partial write
//! 4. Retry, give-up and timeout behaviour under injected store failures

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use halo::claim::{claim_food_item, ClaimArbiter, ClaimError};
use halo::config::{ClaimConfig, StoreConfig};
use halo::model::FoodItem;
use halo::store::{DocumentPath, DocumentStore, MemoryStore, StoreError};
use halo::test_helpers::{seed_food_item, ContendedStore, FixedAuth, SlowStore};

fn fixture(ids: &[&str]) -> (Arc<MemoryStore>, StoreConfig) {
    let store = Arc::new(MemoryStore::new());
    let cfg = StoreConfig::default();
    for id in ids {
        seed_food_item(store.as_ref(), &cfg, id, "donor-1").unwrap();
    }
    (store, cfg)
}

fn read_item(store: &dyn DocumentStore, cfg: &StoreConfig, id: &str) -> FoodItem {
    let doc = store
        .read_document(&DocumentPath::new(&cfg.food_items_collection, id))
        .unwrap()
        .unwrap();
    FoodItem::from_document(&doc).unwrap()
}

fn quick_retries() -> ClaimConfig {
    ClaimConfig {
        retry_backoff_millis: 1,
        ..ClaimConfig::default()
    }
}

#[test]
fn test_claim_then_conflict() {
    let (store, cfg) = fixture(&["f1"]);
    let items = &cfg.food_items_collection;

    claim_food_item(store.as_ref(), items, "f1", "u1").unwrap();
    let after_first = read_item(store.as_ref(), &cfg, "f1");
    assert!(after_first.is_claimed_by("u1"));
    assert!(after_first.claimed_at.is_some());

    let writes_before = store.writes_committed();
    let err = claim_food_item(store.as_ref(), items, "f1", "u2").unwrap_err();
    assert_eq!(
        err,
        ClaimError::ClaimConflict {
            item_id: "f1".to_string(),
            claimed_by: Some("u1".to_string()),
        }
    );
    assert_eq!(store.writes_committed(), writes_before);
    assert_eq!(read_item(store.as_ref(), &cfg, "f1"), after_first);
}

#[test]
fn test_claim_missing_item_writes_nothing() {
    let (store, cfg) = fixture(&[]);
    let err = claim_food_item(store.as_ref(), &cfg.food_items_collection, "missing-id", "u1")
        .unwrap_err();
    assert!(matches!(err, ClaimError::NotFound { .. }));
    assert_eq!(store.writes_committed(), 0);
    assert!(store.is_empty());
}

#[test]
fn test_threaded_claimants_single_winner() {
    let (store, cfg) = fixture(&["f2"]);
    let arbiter = Arc::new(ClaimArbiter::new(store.clone(), &cfg, quick_retries()));
    let barrier = Arc::new(Barrier::new(50));

    let handles: Vec<_> = (1..=50)
        .map(|i| {
            let arbiter = arbiter.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let user = format!("u_{i}");
                barrier.wait();
                (user.clone(), arbiter.claim("f2", &user))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    let conflicts = results
        .iter()
        .filter(|(_, r)| matches!(r, Err(ClaimError::ClaimConflict { .. })))
        .count();
    assert_eq!(conflicts, 49);

    let item = read_item(store.as_ref(), &cfg, "f2");
    assert!(item.is_claimed_by(&winners[0].0));
}

#[test]
fn test_coroutine_claimants_single_winner() {
    // claim path logs, formats and records metrics; the default stack is too small
    may::config().set_stack_size(0x10000);
    let (store, cfg) = fixture(&["f3"]);
    let arbiter = Arc::new(ClaimArbiter::new(store.clone(), &cfg, quick_retries()));

    let handles: Vec<_> = (1..=50)
        .map(|i| {
            let arbiter = arbiter.clone();
            may::go!(move || arbiter.claim("f3", &format!("u_{i}")))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(ClaimError::ClaimConflict { .. })))
            .count(),
        49
    );
    assert_eq!(store.commits(), 2);
}

#[test]
fn test_readers_never_see_partial_claim() {
    let (store, cfg) = fixture(&["f4"]);
    let done = Arc::new(AtomicBool::new(false));
    let path = DocumentPath::new(&cfg.food_items_collection, "f4");

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let done = done.clone();
            let path = path.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let doc = store.read_document(&path).unwrap().unwrap();
                    let claimed = doc.get_str("status") == Some("Claimed");
                    let has_claimant = doc.get("claimedByUserId").is_some();
                    let has_time = doc.get("claimedAt").is_some();
                    assert_eq!(claimed, has_claimant, "status and claimant out of step");
                    assert_eq!(claimed, has_time, "status and claim time out of step");
                }
            })
        })
        .collect();

    let arbiter = ClaimArbiter::new(store.clone(), &cfg, quick_retries());
    thread::scope(|s| {
        for i in 0..8 {
            let arbiter = &arbiter;
            s.spawn(move || {
                let _ = arbiter.claim("f4", &format!("u_{i}"));
            });
        }
    });
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().unwrap();
    }
    assert!(read_item(store.as_ref(), &cfg, "f4").claimed_by_user_id.is_some());
}

#[test]
fn test_retry_recovers_from_contention() {
    let cfg = StoreConfig::default();
    let inner = MemoryStore::new();
    seed_food_item(&inner, &cfg, "f5", "donor-1").unwrap();
    let store = Arc::new(ContendedStore::new(inner, 2));
    let arbiter = ClaimArbiter::new(store.clone(), &cfg, quick_retries());

    arbiter.claim("f5", "u1").unwrap();
    assert_eq!(store.commit_calls(), 3);
    assert!(read_item(store.as_ref(), &cfg, "f5").is_claimed_by("u1"));
}

#[test]
fn test_exhausted_retries_report_unavailable() {
    let cfg = StoreConfig::default();
    let inner = MemoryStore::new();
    seed_food_item(&inner, &cfg, "f6", "donor-1").unwrap();
    let store = Arc::new(ContendedStore::new(inner, 10));
    let arbiter = ClaimArbiter::new(store.clone(), &cfg, quick_retries());

    match arbiter.claim("f6", "u1") {
        Err(ClaimError::Unavailable { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert_eq!(store.commit_calls(), 3);
    assert!(read_item(store.as_ref(), &cfg, "f6").is_available());
}

#[test]
fn test_slow_store_claim_times_out() {
    let cfg = StoreConfig::default();
    let inner = MemoryStore::new();
    seed_food_item(&inner, &cfg, "f9", "donor-1").unwrap();
    let store = Arc::new(SlowStore::new(inner, Duration::from_secs(3)));
    let config = ClaimConfig {
        timeout_seconds: 1,
        ..quick_retries()
    };
    let arbiter = ClaimArbiter::new(store, &cfg, config);

    let start = Instant::now();
    let result = arbiter.claim("f9", "u1");
    assert!(matches!(result, Err(ClaimError::Unavailable { .. })), "got {result:?}");
    assert!(start.elapsed() < Duration::from_millis(2500));
}

#[test]
fn test_terminal_store_error_is_not_retried() {
    let cfg = StoreConfig::default();
    let inner = MemoryStore::new();
    seed_food_item(&inner, &cfg, "f10", "donor-1").unwrap();
    let store = Arc::new(ContendedStore::failing_with(
        inner,
        5,
        StoreError::InvalidArgument("rejected".to_string()),
    ));
    let arbiter = ClaimArbiter::new(store.clone(), &cfg, quick_retries());

    assert!(matches!(arbiter.claim("f10", "u1"), Err(ClaimError::Store(_))));
    assert_eq!(store.commit_calls(), 1);
}

#[test]
fn test_signed_out_user_cannot_claim() {
    let (store, cfg) = fixture(&["f7"]);
    let arbiter = ClaimArbiter::new(store.clone(), &cfg, quick_retries());

    assert_eq!(
        arbiter.claim_as_current_user(&FixedAuth::signed_out(), "f7"),
        Err(ClaimError::NotAuthenticated)
    );
    assert_eq!(arbiter.claim("f7", ""), Err(ClaimError::NotAuthenticated));
    assert!(read_item(store.as_ref(), &cfg, "f7").is_available());

    arbiter
        .claim_as_current_user(&FixedAuth::signed_in("u9"), "f7")
        .unwrap();
    assert!(read_item(store.as_ref(), &cfg, "f7").is_claimed_by("u9"));
}

#[test]
fn test_donor_may_claim_own_item() {
    let (store, cfg) = fixture(&["f8"]);
    claim_food_item(store.as_ref(), &cfg.food_items_collection, "f8", "donor-1").unwrap();
    assert!(read_item(store.as_ref(), &cfg, "f8").is_claimed_by("donor-1"));
}
