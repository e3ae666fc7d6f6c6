use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use distributed_cache::config::Config;
use distributed_cache::group::{Group, LoaderFn, Registry};
use distributed_cache::peers::http::HttpPool;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "distributed_cache=info,info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut bind_addr: Option<SocketAddr> = None;
    let mut api_addr: Option<SocketAddr> = None;
    let mut peer_urls: Vec<String> = vec![];

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--peer" => {
                peer_urls.push(args[i + 1].clone());
                i += 2;
            }
            "--api-bind" => {
                api_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let Some(bind_addr) = bind_addr else {
        eprintln!(
            "Usage: {} --bind <addr:port> [--peer <url>]... [--api-bind <addr:port>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:8001", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:8002 --peer http://127.0.0.1:8001 --api-bind 127.0.0.1:9999",
            args[0]
        );
        std::process::exit(1);
    };

    let config = Config::from_env();
    info!(
        "Configuration: cache_bytes={}, replicas={}, base_path={}",
        config.cache_bytes, config.replicas, config.base_path
    );

    // 1. Groups:
    let registry = Registry::new();
    let group = registry.new_group(
        "scores",
        config.cache_bytes,
        Box::new(LoaderFn(slow_db_loader())),
    )?;

    // 2. Peer pool; this node is always part of its own peer set.
    let self_url = format!("http://{bind_addr}");
    let pool = HttpPool::new_with(
        self_url.clone(),
        registry.clone(),
        &config.base_path,
        config.replicas,
        config.peer_timeout,
    );
    let mut peers = vec![self_url.clone()];
    peers.extend(peer_urls);
    pool.set_peers(&peers);
    group.register_peers(pool.clone())?;

    info!(
        "cache node running at {} with {} peer(s)",
        self_url,
        peers.len()
    );

    // 3. Optional front-end API server on its own port.
    if let Some(api_addr) = api_addr {
        let api = Router::new()
            .route("/api", get(handle_api))
            .layer(Extension(group.clone()));
        tokio::spawn(async move {
            info!("api server running at http://{api_addr}");
            let listener = match tokio::net::TcpListener::bind(api_addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind api server: {err}");
                    return;
                }
            };
            if let Err(err) = axum::serve(listener, api).await {
                tracing::error!("api server failed: {err}");
            }
        });
    }

    // 4. Peer protocol server.
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, pool.router()).await?;

    Ok(())
}

/// `GET /api?key=<key>`: raw bytes for the key, via the full cache pipeline.
async fn handle_api(
    Extension(group): Extension<Arc<Group>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // A missing key parameter flows through the pipeline as an empty key and
    // comes back as "key is required".
    let key = params.get("key").map(String::as_str).unwrap_or("");
    match group.get(key, None).await {
        Ok(view) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            view.to_vec(),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// The demo authoritative source: an in-memory score table that logs every
/// lookup, standing in for a slow database.
fn slow_db_loader() -> impl Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync {
    let db: HashMap<&'static str, &'static str> = [("Tom", "630"), ("Jack", "589"), ("Sam", "567")]
        .into_iter()
        .collect();
    move |key: &str| {
        info!("[SlowDB] search key {key}");
        match db.get(key) {
            Some(value) => Ok(value.as_bytes().to_vec()),
            None => anyhow::bail!("{key} not exist"),
        }
    }
}
