//! Request/response bodies of the node RPC surface

use crate::common::FullName;
use crate::node::storage::FileDigest;
use serde::{Deserialize, Serialize};

/// Dial-back transfer: the node connects to `addr:port`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub addr: String,
    pub port: u16,
    pub name: FullName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: FullName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdResponse {
    pub node_id: String,
}

/// `digest` is `None` when the node does not hold the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatResponse {
    pub digest: Option<FileDigest>,
}
