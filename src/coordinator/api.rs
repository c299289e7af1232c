//! Request/response bodies of the coordinator RPC surface
//!
//! File calls authenticate with `Authorization: Bearer <token>`; the token is
//! never part of a body.

use crate::common::FullName;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidResponse {
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentsResponse {
    pub departments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

/// Create or update: the chosen node dials `addr:port` and reads the bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferRequest {
    pub addr: String,
    pub port: u16,
    pub full_name: FullName,
}

/// Get: the chosen node dials `addr:port` and writes the bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileRequest {
    pub addr: String,
    pub port: u16,
    pub name: String,
    pub department: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub full_name: FullName,
}

/// The request passed validation and its task was launched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNodeRequest {
    pub node_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEmployeeRequest {
    pub username: String,
    pub password: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub load: u64,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub nodes: Vec<NodeStatus>,
    pub files: usize,
    pub tombstones: usize,
    pub busy: usize,
}
