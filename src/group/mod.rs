//! Cache Groups & Registry
//!
//! A `Group` is a named cache namespace: it composes the local LRU store, the
//! single-flight coalescer, an optional peer picker, and the consumer's
//! authoritative loader into the lookup pipeline.
//!
//! ## Lookup pipeline
//! 1. Probe the local store (expired entries count as misses).
//! 2. On miss, enter the coalescer so one load runs per key however many
//!    callers pile up.
//! 3. Inside the load: if a picker is registered and a remote peer owns the
//!    key, fetch from that peer; on peer failure fall back to the local
//!    loader so availability beats routing purity.
//! 4. Loader results populate the local store; peer results do not (the
//!    owning peer is the authority for its key range).
//!
//! Groups are created through a [`Registry`], which the embedder constructs
//! and hands to the peer-server handlers. There is no process-wide singleton.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::synced::SyncedCache;
use crate::cache::view::ByteView;
use crate::error::{CacheError, Result};
use crate::flight::Flight;
use crate::peers::protocol::FetchRequest;
use crate::peers::{PeerClient, PeerPicker};

#[cfg(test)]
mod tests;

/// Loads authoritative data for a key on a cache miss.
///
/// Implementations wrap whatever slow source backs the cache (database,
/// remote service, file). Errors are surfaced to the caller verbatim and
/// never cached.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts a plain closure into a [`Loader`].
pub struct LoaderFn<F>(pub F);

#[async_trait]
impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.0)(key)
    }
}

/// A named cache namespace with its own byte budget, loader, and peers.
pub struct Group {
    name: String,
    loader: Box<dyn Loader>,
    store: SyncedCache,
    picker: OnceLock<Arc<dyn PeerPicker>>,
    flight: Flight<ByteView, CacheError>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("name", &self.name).finish()
    }
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the peer picker. Allowed at most once per group.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) -> Result<()> {
        self.picker.set(picker).map_err(|_| {
            CacheError::Config(format!(
                "peers already registered for group {}",
                self.name
            ))
        })
    }

    /// Looks up `key`, loading it on a miss.
    ///
    /// `ttl` only applies when the value comes from the local loader; it
    /// becomes the new entry's relative expiry. `None` means no expiry.
    pub async fn get(&self, key: &str, ttl: Option<Duration>) -> Result<ByteView> {
        if key.is_empty() {
            return Err(CacheError::KeyRequired);
        }

        if let Some(view) = self.store.get(key) {
            debug!(group = %self.name, key, "cache hit");
            return Ok(view);
        }

        self.load(key, ttl).await
    }

    /// Coalesced miss path: one peer RPC or one loader call per key, no
    /// matter how many callers are waiting.
    async fn load(&self, key: &str, ttl: Option<Duration>) -> Result<ByteView> {
        self.flight
            .run(key, async {
                if let Some(picker) = self.picker.get()
                    && let Some(peer) = picker.pick_peer(key)
                {
                    match self.fetch_from_peer(peer.as_ref(), key).await {
                        Ok(view) => return Ok(view),
                        Err(err) => {
                            warn!(group = %self.name, key, %err, "peer fetch failed, falling back to loader");
                        }
                    }
                }
                self.load_locally(key, ttl).await
            })
            .await
    }

    async fn fetch_from_peer(&self, peer: &dyn PeerClient, key: &str) -> Result<ByteView> {
        let req = FetchRequest {
            group: self.name.clone(),
            key: key.to_string(),
        };
        let res = peer.fetch(&req).await?;
        // Not inserted into the local store: the owner caches it, we relay it.
        Ok(ByteView::from(res.value))
    }

    async fn load_locally(&self, key: &str, ttl: Option<Duration>) -> Result<ByteView> {
        let bytes = self
            .loader
            .load(key)
            .await
            .map_err(|err| CacheError::Loader(err.to_string()))?;
        let view = ByteView::from(bytes);
        let expire = ttl.map(|ttl| Instant::now() + ttl);
        self.store.add(key, view.clone(), expire);
        Ok(view)
    }

    /// Entries currently held in the local store.
    pub fn cached_entries(&self) -> usize {
        self.store.len()
    }
}

/// Owns the name-to-group table for one embedder.
///
/// Reads (every peer request resolves a group) vastly outnumber writes
/// (startup registration), hence the reader/writer lock.
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            groups: RwLock::new(HashMap::new()),
        })
    }

    /// Creates and registers a group. Duplicate names are rejected so two
    /// subsystems cannot silently share (or shadow) a namespace.
    pub fn new_group(
        &self,
        name: &str,
        cache_bytes: usize,
        loader: Box<dyn Loader>,
    ) -> Result<Arc<Group>> {
        let mut groups = self.groups.write().expect("registry lock poisoned");
        if groups.contains_key(name) {
            return Err(CacheError::Config(format!(
                "group {name} already registered"
            )));
        }
        let group = Arc::new(Group {
            name: name.to_string(),
            loader,
            store: SyncedCache::new(cache_bytes),
            picker: OnceLock::new(),
            flight: Flight::new(),
        });
        groups.insert(name.to_string(), group.clone());
        Ok(group)
    }

    /// Returns the named group, if registered.
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }
}
