//! # cidrelay
//!
//! HTTP relay that serves IPFS content through several public gateways.
//!
//! This crate provides:
//! - **Gateway selection**: Inspect and switch the primary gateway at runtime
//! - **Metadata and listings**: Cached per-CID metadata, directory browsing
//! - **Content relay**: Inline previews and downloads streamed in 8 KiB chunks
//! - **Uploads**: Add files and folders to the local node, announcing public ones to the DHT
//! - **Private previews**: Content read straight from the offline private repo
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │             (browser front end, curl)               │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                      cidrelay                       │
//! ├─────────────────────────────────────────────────────┤
//! │       CORS │ Trace │ Body limit │ Request log       │
//! ├─────────────────────────────────────────────────────┤
//! │                    Handlers                         │
//! │   (gateway, metadata, ls, preview, download, ...)   │
//! ├─────────────────────────────────────────────────────┤
//! │                 cidrelay-resolver                   │
//! │     (registry, fallback resolution, LRU cache)      │
//! ├──────────────────────────┬──────────────────────────┤
//! │      Public gateways     │    Local Kubo node       │
//! └──────────────────────────┴──────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::RelayConfig;
pub use error::{ApiError, ErrorCode};
pub use server::run_server_with_shutdown;
pub use state::AppState;
