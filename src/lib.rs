//! Distributed Cache Cluster Library
//!
//! This library crate defines the core modules of a peer-to-peer in-memory
//! cache. It serves as the foundation for the node binary (`main.rs`).
//!
//! ## Architecture Modules
//! A lookup flows through five loosely coupled subsystems:
//!
//! - **`cache`**: The local storage layer. A byte-bounded LRU store with
//!   per-entry expiry, wrapped in a mutex, handing out immutable `ByteView`
//!   payloads.
//! - **`ring`**: The routing layer. A consistent-hash ring with virtual nodes
//!   that maps every key to exactly one owning peer.
//! - **`flight`**: The coalescing layer. Deduplicates concurrent loads so a
//!   burst of requests for one missing key costs one load.
//! - **`peers`**: The transport layer. Peer picker + client capabilities with
//!   HTTP and TCP-RPC pools that serve and perform remote fetches.
//! - **`group`**: The composition layer. A named namespace tying the store,
//!   the coalescer, the picker, and the consumer's loader into the cache
//!   lookup pipeline, managed by an embedder-owned `Registry`.

pub mod cache;
pub mod config;
pub mod error;
pub mod flight;
pub mod group;
pub mod peers;
pub mod ring;
