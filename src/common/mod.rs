//! Common utilities and types shared across minidfs

pub mod auth;
pub mod config;
pub mod error;
pub mod utils;

pub use auth::{Principal, SessionAuthority, MANAGER_ROLE};
pub use config::{CoordinatorConfig, NodeConfig};
pub use error::{Error, ErrorBody, ErrorKind, Result};
pub use utils::{format_bytes, parse_duration, timestamp_now_millis, FullName};
