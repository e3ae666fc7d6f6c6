use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::group::{Loader, LoaderFn, Registry};
use crate::peers::protocol::{FetchRequest, FetchResponse};
use crate::peers::{PeerClient, PeerPicker};

/// The demo score table, with a call counter so tests can assert how often
/// the authoritative source was hit.
fn scores_loader(calls: Arc<AtomicUsize>) -> Box<dyn Loader> {
    Box::new(LoaderFn(move |key: &str| {
        calls.fetch_add(1, Ordering::SeqCst);
        match key {
            "Tom" => Ok(b"630".to_vec()),
            "Jack" => Ok(b"589".to_vec()),
            "Sam" => Ok(b"567".to_vec()),
            _ => anyhow::bail!("{key} not exist"),
        }
    }))
}

/// Loader that stalls long enough for concurrent callers to pile up.
struct SlowLoader {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Loader for SlowLoader {
    async fn load(&self, _key: &str) -> anyhow::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(b"slow".to_vec())
    }
}

/// Picker that routes every key to one fixed client.
struct StaticPicker(Arc<dyn PeerClient>);

impl PeerPicker for StaticPicker {
    fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
        Some(self.0.clone())
    }
}

struct FailingPeer;

#[async_trait]
impl PeerClient for FailingPeer {
    async fn fetch(&self, _req: &FetchRequest) -> Result<FetchResponse> {
        Err(CacheError::PeerFetch("connection refused".to_string()))
    }
}

struct CountingPeer {
    calls: Arc<AtomicUsize>,
    value: Vec<u8>,
}

#[async_trait]
impl PeerClient for CountingPeer {
    async fn fetch(&self, _req: &FetchRequest) -> Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(FetchResponse {
            value: self.value.clone(),
        })
    }
}

// ============================================================
// LOOKUP PIPELINE
// ============================================================

#[tokio::test]
async fn test_hit_after_first_load() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let group = registry
        .new_group("scores", 1024, scores_loader(calls.clone()))
        .unwrap();

    let view = group.get("Tom", None).await.unwrap();
    assert_eq!(view.as_bytes(), b"630");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Second lookup is served from the cache.
    let view = group.get("Tom", None).await.unwrap();
    assert_eq!(view.as_bytes(), b"630");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(group.cached_entries(), 1);
}

#[tokio::test]
async fn test_loader_error_is_verbatim_and_not_cached() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let group = registry
        .new_group("scores", 1024, scores_loader(calls.clone()))
        .unwrap();

    let err = group.get("Nobody", None).await.unwrap_err();
    assert_eq!(err, CacheError::Loader("Nobody not exist".to_string()));
    assert_eq!(err.to_string(), "Nobody not exist");
    assert_eq!(group.cached_entries(), 0);

    // Failures are not cached, so the loader is consulted again.
    let _ = group.get("Nobody", None).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_key_is_rejected_before_the_loader() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let group = registry
        .new_group("scores", 1024, scores_loader(calls.clone()))
        .unwrap();

    let err = group.get("", None).await.unwrap_err();
    assert_eq!(err, CacheError::KeyRequired);
    assert_eq!(err.to_string(), "key is required");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_misses_hit_the_loader_once() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let group = registry
        .new_group(
            "slow",
            1024,
            Box::new(SlowLoader {
                calls: calls.clone(),
            }),
        )
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let group = group.clone();
        handles.push(tokio::spawn(
            async move { group.get("k", None).await },
        ));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().as_bytes(), b"slow");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================
// PEER ROUTING
// ============================================================

#[tokio::test]
async fn test_peer_failure_falls_back_to_loader_and_caches() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let group = registry
        .new_group("scores", 1024, scores_loader(calls.clone()))
        .unwrap();
    group
        .register_peers(Arc::new(StaticPicker(Arc::new(FailingPeer))))
        .unwrap();

    let view = group.get("Tom", None).await.unwrap();
    assert_eq!(view.as_bytes(), b"630");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(group.cached_entries(), 1, "fallback result is cached");
}

#[tokio::test]
async fn test_peer_success_skips_loader_and_local_cache() {
    let registry = Registry::new();
    let loader_calls = Arc::new(AtomicUsize::new(0));
    let peer_calls = Arc::new(AtomicUsize::new(0));
    let group = registry
        .new_group("scores", 1024, scores_loader(loader_calls.clone()))
        .unwrap();
    group
        .register_peers(Arc::new(StaticPicker(Arc::new(CountingPeer {
            calls: peer_calls.clone(),
            value: b"remote-630".to_vec(),
        }))))
        .unwrap();

    let view = group.get("Tom", None).await.unwrap();
    assert_eq!(view.as_bytes(), b"remote-630");
    assert_eq!(loader_calls.load(Ordering::SeqCst), 0);
    assert_eq!(peer_calls.load(Ordering::SeqCst), 1);

    // The owner is the authority: nothing was cached here, so the next
    // lookup goes back to the peer.
    assert_eq!(group.cached_entries(), 0);
    let _ = group.get("Tom", None).await.unwrap();
    assert_eq!(peer_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_register_peers_twice_is_a_configuration_error() {
    let registry = Registry::new();
    let group = registry
        .new_group("scores", 1024, scores_loader(Arc::new(AtomicUsize::new(0))))
        .unwrap();

    let picker = || Arc::new(StaticPicker(Arc::new(FailingPeer)));
    group.register_peers(picker()).unwrap();
    let err = group.register_peers(picker()).unwrap_err();
    assert!(matches!(err, CacheError::Config(_)));
}

// ============================================================
// REGISTRY
// ============================================================

#[tokio::test]
async fn test_registry_lookup_and_duplicate_rejection() {
    let registry = Registry::new();
    let group = registry
        .new_group("scores", 1024, scores_loader(Arc::new(AtomicUsize::new(0))))
        .unwrap();

    assert_eq!(registry.get_group("scores").unwrap().name(), group.name());
    assert!(registry.get_group("missing").is_none());

    let err = registry
        .new_group("scores", 1024, scores_loader(Arc::new(AtomicUsize::new(0))))
        .unwrap_err();
    assert!(matches!(err, CacheError::Config(_)));
}

#[tokio::test]
async fn test_ttl_applies_to_loader_results() {
    let registry = Registry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let group = registry
        .new_group("scores", 1024, scores_loader(calls.clone()))
        .unwrap();

    group
        .get("Tom", Some(Duration::from_millis(30)))
        .await
        .unwrap();
    assert_eq!(group.cached_entries(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    group.get("Tom", None).await.unwrap();
    assert_eq!(
        calls.load(Ordering::SeqCst),
        2,
        "expired entry forced a reload"
    );
}
