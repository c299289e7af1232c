//! Storage node implementation
//!
//! Handles file bytes with:
//! - A node-private directory tree, one directory per department
//! - Dial-back byte streams for client creates, reads and updates
//! - Best-effort multicast replication to peer nodes
//! - Self-registration with the coordinator at startup

pub mod api;
pub mod http;
pub mod replication;
pub mod server;
pub mod storage;
pub mod transfer;

pub use server::NodeServer;
pub use storage::{FileDigest, Storage};
pub use transfer::TransferEndpoint;
