//! Peer Selection & Transports
//!
//! Everything needed to route a cache lookup to the node that owns the key.
//!
//! ## Core Concepts
//! - **Picker**: maps a key to the client for its owning peer via the
//!   consistent-hash ring, or reports that the local node owns it.
//! - **Client**: a transport-specific handle that performs one synchronous
//!   fetch against a remote peer.
//! - **Pools**: a pool bundles the ring, the per-peer client table, and the
//!   server side of one transport. `set_peers` replaces ring and clients
//!   atomically under the pool lock.
//!
//! ## Submodules
//! - **`protocol`**: wire DTOs and protocol constants shared by transports.
//! - **`http`**: HTTP transport (axum handler + reqwest clients).
//! - **`rpc`**: minimal TCP transport with length-prefixed bincode frames.

pub mod http;
pub mod protocol;
pub mod rpc;


use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use self::protocol::{FetchRequest, FetchResponse};

/// Picks the peer that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the client for the key's owning peer, or `None` when the local
    /// node owns the key (or no peers are known) and the caller should load
    /// locally.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>>;
}

/// Transport-specific handle to one remote peer.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Fetches the payload for `req` from the remote peer. A successful
    /// return carries the authoritative bytes from the owner.
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}
