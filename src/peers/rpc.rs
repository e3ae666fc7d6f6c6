//! TCP RPC Peer Pool
//!
//! A minimal unary transport: one request and one reply per connection,
//! each a 4-byte big-endian length prefix followed by a bincode frame.
//! Clients dial per call; there is no connection pooling, which keeps the
//! failure model trivial (a broken peer costs one connect attempt).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::ensure;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::protocol::{DEFAULT_REPLICAS, FetchRequest, FetchResponse, MAX_FRAME_BYTES, RpcReply};
use super::{PeerClient, PeerPicker};
use crate::error::{CacheError, Result};
use crate::group::Registry;
use crate::ring::HashRing;

const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_millis(500);

struct PoolState {
    ring: HashRing,
    clients: HashMap<String, Arc<RpcPeer>>,
}

/// Picker + server for a pool of TCP RPC peers.
///
/// Peers are identified by `host:port`.
pub struct RpcPool {
    self_addr: String,
    replicas: usize,
    timeout: Duration,
    registry: Arc<Registry>,
    state: Mutex<PoolState>,
}

impl RpcPool {
    pub fn new(self_addr: impl Into<String>, registry: Arc<Registry>) -> Arc<Self> {
        Self::new_with(self_addr, registry, DEFAULT_REPLICAS, DEFAULT_PEER_TIMEOUT)
    }

    pub fn new_with(
        self_addr: impl Into<String>,
        registry: Arc<Registry>,
        replicas: usize,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            self_addr: self_addr.into(),
            replicas,
            timeout,
            registry,
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
                let client = Arc::new(RpcPeer {
                    addr: peer.clone(),
                    timeout: self.timeout,
                });
                (peer, client)
            })
            .collect();

        let mut state = self.state.lock().expect("pool lock poisoned");
        state.ring = ring;
        state.clients = clients;
    }

    /// Binds `self_addr` and serves inbound peer fetches until the task is
    /// dropped.
    pub async fn serve(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.self_addr).await?;
        self.serve_with(listener).await
    }

    /// Serves on an already-bound listener. Tests bind port 0 and pass the
    /// listener in.
    pub async fn serve_with(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        info!(addr = %self.self_addr, "rpc peer server listening");
        loop {
            let (stream, remote) = listener.accept().await?;
            let pool = self.clone();
            tokio::spawn(async move {
                if let Err(err) = pool.handle_conn(stream).await {
                    warn!(%remote, %err, "rpc connection failed");
                }
            });
        }
    }

    async fn handle_conn(&self, mut stream: TcpStream) -> anyhow::Result<()> {
        let frame = read_frame(&mut stream).await?;
        let req: FetchRequest = bincode::deserialize(&frame)?;
        debug!(group = %req.group, key = %req.key, "rpc fetch");

        let reply: RpcReply = match self.registry.get_group(&req.group) {
            None => Err(CacheError::UnknownGroup(req.group.clone()).to_string()),
            Some(group) => group
                .get(&req.key, None)
                .await
                .map(|view| FetchResponse {
                    value: view.to_vec(),
                })
                .map_err(|err| err.to_string()),
        };

        write_frame(&mut stream, &bincode::serialize(&reply)?).await
    }
}

impl PeerPicker for RpcPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let state = self.state.lock().expect("pool lock poisoned");
        let owner = state.ring.get(key)?;
        if owner == self.self_addr {
            return None;
        }
        let client: Arc<dyn PeerClient> = state.clients.get(owner).cloned()?;
        debug!(peer = owner, key, "picked remote peer");
        Some(client)
    }
}

/// Client for one remote RPC peer. Dials per call.
struct RpcPeer {
    addr: String,
    timeout: Duration,
}

impl RpcPeer {
    async fn call(&self, req: &FetchRequest) -> anyhow::Result<RpcReply> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        write_frame(&mut stream, &bincode::serialize(req)?).await?;
        let frame = read_frame(&mut stream).await?;
        Ok(bincode::deserialize(&frame)?)
    }
}

#[async_trait]
impl PeerClient for RpcPeer {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let reply = tokio::time::timeout(self.timeout, self.call(req))
            .await
            .map_err(|_| CacheError::PeerFetch(format!("peer {} timed out", self.addr)))?
            .map_err(|err| CacheError::PeerFetch(err.to_string()))?;
        reply.map_err(CacheError::PeerFetch)
    }
}

async fn read_frame(stream: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    ensure!(len <= MAX_FRAME_BYTES, "frame of {len} bytes exceeds limit");
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> anyhow::Result<()> {
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}
