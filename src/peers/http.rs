//! HTTP Peer Pool
//!
//! Serves the peer protocol at `/<base_path>/:group/:key?expire=<secs>` and
//! fetches from remote peers with per-peer `reqwest` clients. One pool per
//! node; it owns the consistent-hash ring and the client table together so
//! `set_peers` can swap both atomically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::debug;

use super::protocol::{DEFAULT_BASE_PATH, DEFAULT_REPLICAS, FetchRequest, FetchResponse};
use super::{PeerClient, PeerPicker};
use crate::error::{CacheError, Result};
use crate::group::Registry;
use crate::ring::HashRing;

const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_millis(500);

struct PoolState {
    ring: HashRing,
    clients: HashMap<String, Arc<HttpPeer>>,
}

/// Picker + server for a pool of HTTP peers.
///
/// Peers are identified by their base URL, e.g. `http://10.0.0.2:8008`.
pub struct HttpPool {
    /// This node's own base URL; keys it owns are loaded locally.
    self_url: String,
    base_path: String,
    replicas: usize,
    timeout: Duration,
    registry: Arc<Registry>,
    http: reqwest::Client,
    state: Mutex<PoolState>,
}

impl HttpPool {
    pub fn new(self_url: impl Into<String>, registry: Arc<Registry>) -> Arc<Self> {
        Self::new_with(
            self_url,
            registry,
            DEFAULT_BASE_PATH,
            DEFAULT_REPLICAS,
            DEFAULT_PEER_TIMEOUT,
        )
    }

    pub fn new_with(
        self_url: impl Into<String>,
        registry: Arc<Registry>,
        base_path: &str,
        replicas: usize,
        timeout: Duration,
    ) -> Arc<Self> {
        let cleaned = base_path.trim_matches('/');
        let base_path = if cleaned.is_empty() {
            "/".to_string()
        } else {
            format!("/{cleaned}/")
        };

        Arc::new(Self {
            self_url: self_url.into(),
            base_path,
            replicas,
            timeout,
            registry,
            http: reqwest::Client::new(),
            state: Mutex::new(PoolState {
                ring: HashRing::new(replicas, None),
                clients: HashMap::new(),
            }),
        })
    }

    /// Replaces the pool's set of peers: a fresh ring and a fresh client
    /// table, swapped in together under the lock.
    pub fn set_peers<S: AsRef<str>>(&self, peers: &[S]) {
        let mut ring = HashRing::new(self.replicas, None);
        ring.add(peers);

        let clients = peers
            .iter()
            .map(|peer| {
                let peer = peer.as_ref().to_string();
                let client = Arc::new(HttpPeer {
                    base_url: format!("{}{}", peer, self.base_path),
                    http: self.http.clone(),
                    timeout: self.timeout,
                });
                (peer, client)
            })
            .collect();

        let mut state = self.state.lock().expect("pool lock poisoned");
        state.ring = ring;
        state.clients = clients;
    }

    /// Router serving the peer protocol under this pool's base path. Any
    /// other path on this listener is a malformed peer request.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(&format!("{}:group/:key", self.base_path), get(handle_fetch))
            .fallback(handle_bad_path)
            .layer(Extension(self.clone()))
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let state = self.state.lock().expect("pool lock poisoned");
        let owner = state.ring.get(key)?;
        if owner == self.self_url {
            return None;
        }
        let client: Arc<dyn PeerClient> = state.clients.get(owner).cloned()?;
        debug!(peer = owner, key, "picked remote peer");
        Some(client)
    }
}

/// `GET /<base_path>/:group/:key?expire=<secs>`
///
/// `expire` is a relative TTL in whole seconds; absent or `0` applies none.
/// The payload goes back as a bincode-encoded [`FetchResponse`].
async fn handle_fetch(
    Extension(pool): Extension<Arc<HttpPool>>,
    Path((group_name, key)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let ttl = match params.get("expire").map(String::as_str) {
        None | Some("") | Some("0") => None,
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) => Some(Duration::from_secs(secs)),
            Err(_) => {
                return (StatusCode::NOT_FOUND, format!("expire wrong type {raw}"))
                    .into_response();
            }
        },
    };

    let Some(group) = pool.registry.get_group(&group_name) else {
        return CacheError::UnknownGroup(group_name).into_response();
    };

    match group.get(&key, ttl).await {
        Ok(view) => match bincode::serialize(&FetchResponse {
            value: view.to_vec(),
        }) {
            Ok(body) => (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                body,
            )
                .into_response(),
            Err(err) => CacheError::Encode(err.to_string()).into_response(),
        },
        Err(err) => err.into_response(),
    }
}

/// Anything that is not `<base_path><group>/<key>`.
async fn handle_bad_path() -> Response {
    CacheError::InvalidRequest("bad request".to_string()).into_response()
}

/// Client for one remote HTTP peer.
struct HttpPeer {
    /// Peer base URL including the protocol base path, trailing slash kept.
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

#[async_trait]
impl PeerClient for HttpPeer {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|err| CacheError::PeerFetch(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CacheError::PeerFetch(format!("invalid peer URL {}", self.base_url)))?
            .pop_if_empty()
            .extend([req.group.as_str(), req.key.as_str()]);

        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| CacheError::PeerFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(CacheError::PeerFetch(format!(
                "server returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| CacheError::PeerFetch(format!("reading response body: {err}")))?;

        bincode::deserialize(&body)
            .map_err(|err| CacheError::PeerFetch(format!("decoding response body: {err}")))
    }
}
