//! Peer Wire Protocol
//!
//! DTOs and constants shared by the HTTP and RPC transports. Payloads travel
//! bincode-encoded: a length-delimited structured message whose single field
//! holds the raw value bytes.

use serde::{Deserialize, Serialize};

/// URL prefix the HTTP transport serves the peer protocol under.
pub const DEFAULT_BASE_PATH: &str = "/_dcache_/";

/// Virtual nodes placed on the ring per peer. Wire-visible: every node in a
/// cluster must use the same count or routing diverges.
pub const DEFAULT_REPLICAS: usize = 50;

/// Upper bound for one RPC frame. A cache payload has no business being
/// larger, and the cap keeps a bad frame header from provoking a huge
/// allocation.
pub const MAX_FRAME_BYTES: u32 = 32 * 1024 * 1024;

/// A fetch addressed to the peer owning `key` within `group`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub group: String,
    pub key: String,
}

/// Payload answered by the owning peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    /// The raw cached bytes.
    pub value: Vec<u8>,
}

/// Reply frame of the RPC transport. Errors travel as text and surface as
/// peer-fetch failures at the calling node.
pub type RpcReply = std::result::Result<FetchResponse, String>;
