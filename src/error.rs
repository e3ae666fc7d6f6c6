//! Unified error type for the cache library.
//!
//! `CacheError` is `Clone`: a coalesced load publishes one outcome to every
//! waiting caller, so errors travel by value just like cache hits do.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by groups, pools, and the peer protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Construction or wiring misuse: duplicate group name, picker registered twice.
    #[error("configuration error: {0}")]
    Config(String),

    /// Lookup with an empty key.
    #[error("key is required")]
    KeyRequired,

    /// Malformed peer request (bad path, unparseable expire parameter).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A peer asked for a group this node has not registered.
    #[error("no such group: {0}")]
    UnknownGroup(String),

    /// Network or protocol failure while fetching from the owning peer.
    #[error("peer fetch failed: {0}")]
    PeerFetch(String),

    /// The consumer-supplied loader failed. The message is the loader's, verbatim.
    #[error("{0}")]
    Loader(String),

    /// Response payload could not be encoded for the wire.
    #[error("encoding response: {0}")]
    Encode(String),
}

impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::KeyRequired | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::UnknownGroup(_) => StatusCode::NOT_FOUND,
            CacheError::Config(_)
            | CacheError::PeerFetch(_)
            | CacheError::Loader(_)
            | CacheError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, CacheError>;
