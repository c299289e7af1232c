//! HTTP client for the coordinator RPC surface
//!
//! Used by the `minidfs` CLI and by storage nodes registering themselves.

use crate::common::{Error, ErrorBody, FullName, Result};
use crate::coordinator::api::*;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let req = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: TokenResponse = self.post("/login", None, &req).await?;
        Ok(resp.token)
    }

    pub async fn is_valid_token(&self, token: &str) -> Result<bool> {
        let resp: ValidResponse = self.get("/session", Some(token)).await?;
        Ok(resp.valid)
    }

    pub async fn list_departments(&self, token: &str) -> Result<Vec<String>> {
        let resp: DepartmentsResponse = self.get("/departments", Some(token)).await?;
        Ok(resp.departments)
    }

    pub async fn list_department_files(
        &self,
        token: &str,
        department: &str,
    ) -> Result<Vec<String>> {
        let url = self.department_files_url(department)?;
        let req = self.http.get(url);
        let resp: FilesResponse = decode_json(with_token(req, Some(token)).send().await?).await?;
        Ok(resp.files)
    }

    pub async fn create_file(
        &self,
        token: &str,
        addr: &str,
        port: u16,
        full_name: &FullName,
    ) -> Result<bool> {
        let req = FileTransferRequest {
            addr: addr.to_string(),
            port,
            full_name: full_name.clone(),
        };
        let resp: AcceptedResponse = self.post("/files/create", Some(token), &req).await?;
        Ok(resp.accepted)
    }

    pub async fn get_file(
        &self,
        token: &str,
        addr: &str,
        port: u16,
        name: &str,
        department: &str,
    ) -> Result<bool> {
        let req = GetFileRequest {
            addr: addr.to_string(),
            port,
            name: name.to_string(),
            department: department.to_string(),
        };
        let resp: AcceptedResponse = self.post("/files/get", Some(token), &req).await?;
        Ok(resp.accepted)
    }

    pub async fn update_file(
        &self,
        token: &str,
        addr: &str,
        port: u16,
        full_name: &FullName,
    ) -> Result<bool> {
        let req = FileTransferRequest {
            addr: addr.to_string(),
            port,
            full_name: full_name.clone(),
        };
        let resp: AcceptedResponse = self.post("/files/update", Some(token), &req).await?;
        Ok(resp.accepted)
    }

    pub async fn delete_file(&self, token: &str, full_name: &FullName) -> Result<bool> {
        let req = DeleteFileRequest {
            full_name: full_name.clone(),
        };
        let resp: AcceptedResponse = self.post("/files/delete", Some(token), &req).await?;
        Ok(resp.accepted)
    }

    pub async fn add_node(&self, node_id: &str, url: &str) -> Result<()> {
        let req = AddNodeRequest {
            node_id: node_id.to_string(),
            url: url.to_string(),
        };
        let _: OkResponse = self.post("/nodes", None, &req).await?;
        Ok(())
    }

    pub async fn add_employee(
        &self,
        token: &str,
        username: &str,
        password: &str,
        roles: Vec<String>,
    ) -> Result<bool> {
        let req = AddEmployeeRequest {
            username: username.to_string(),
            password: password.to_string(),
            roles,
        };
        let resp: OkResponse = self.post("/admin/employees", Some(token), &req).await?;
        Ok(resp.ok)
    }

    pub async fn trigger_sync(&self, token: &str) -> Result<bool> {
        let resp: OkResponse = self
            .post("/admin/sync", Some(token), &serde_json::json!({}))
            .await?;
        Ok(resp.ok)
    }

    pub async fn status(&self) -> Result<ClusterStatus> {
        self.get("/admin/status", None).await
    }

    /// `/departments/<department>/files` with the department percent-encoded
    fn department_files_url(&self, department: &str) -> Result<reqwest::Url> {
        let invalid = || Error::InvalidConfig(format!("coordinator url {}", self.base_url));
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["departments", department, "files"]);
        Ok(url)
    }

    async fn get<R: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<R> {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        decode_json(with_token(req, token).send().await?).await
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<R> {
        let req = self.http.post(format!("{}{}", self.base_url, path)).json(body);
        decode_json(with_token(req, token).send().await?).await
    }
}

fn with_token(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => req.bearer_auth(token),
        None => req,
    }
}

/// Decode a JSON success body, or rebuild the remote error from its `ErrorBody`
pub(crate) async fn decode_json<R: DeserializeOwned>(resp: Response) -> Result<R> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<R>().await?);
    }
    match resp.json::<ErrorBody>().await {
        Ok(body) => Err(Error::from_body(body)),
        Err(_) => Err(Error::Http(format!("unexpected status {}", status))),
    }
}
