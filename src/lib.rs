//! # minidfs
//!
//! A small clustered file store with:
//! - A single coordinator tracking which nodes hold which files
//! - Session tokens and per-department authorization
//! - Load-aware node selection with single-attempt failover
//! - Per-file mutual exclusion (a busy file rejects, never queues)
//! - Best-effort multicast replication between nodes, repaired by a
//!   scheduled reconciler
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!            ┌──────────────────────────────┐
//!  client ──▶│         Coordinator          │
//!    ▲       │  sessions · busy gate        │
//!    │       │  node registry · replicas    │
//!    │       │  health monitor · reconciler │
//!    │       └──────────────┬───────────────┘
//!    │                      │ HTTP/JSON
//!    │        ┌─────────────┼─────────────┐
//!    │      ┌─▼──────┐  ┌───▼────┐  ┌─────▼──┐
//!    └──────│ Node 1 │  │ Node 2 │  │ Node 3 │
//!  dial-back└───┬────┘  └───┬────┘  └───┬────┘
//!   TCP         └──── UDP multicast ────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a coordinator
//! ```bash
//! minidfs-coord --bind 0.0.0.0:5000 --sync-at 03:00
//! ```
//!
//! ### Start a storage node
//! ```bash
//! minidfs-node --id node-1 \
//!   --bind 0.0.0.0:6000 \
//!   --advertise http://10.0.0.5:6000 \
//!   --storage ./storage \
//!   --coordinator http://localhost:5000
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minidfs login man 123
//! minidfs put IT/report.txt --file ./report.txt --token <token>
//! minidfs get IT/report.txt --output ./copy.txt --token <token>
//! minidfs sync --token <token>
//! ```

pub mod client;
pub mod common;
pub mod coordinator;
pub mod node;

// Re-export commonly used types
pub use client::CoordinatorClient;
pub use common::{CoordinatorConfig, Error, FullName, NodeConfig, Result};
pub use coordinator::Coordinator;
pub use node::NodeServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
