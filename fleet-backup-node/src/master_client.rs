// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The Node's view of Master's HTTP surface (§6.3): quota pre-flight,
//! credential fetch, backup reporting, enrollment, and command polling.
//! `MasterApiClient` is a trait so stages and the worker loop can be
//! exercised against a fake in tests without a live Master.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::{NodeId, SiteId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub can_proceed: bool,
    pub projected_site_used_bytes: u64,
    pub projected_node_used_bytes: u64,
    pub exceeds: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCredentials {
    pub provider_type: String,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    pub site_id: SiteId,
    pub success: bool,
    pub object_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub request_id: String,
    pub registration_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    Pending,
    Active,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinStatusResponse {
    pub status: JoinStatus,
    pub node_id: Option<NodeId>,
    /// Present exactly once: the first poll that observes ACTIVE.
    pub api_key: Option<String>,
}

/// A pending start/stop instruction the Node has not yet acted on (§9's
/// resolution of the daemon-queue open question: the Node polls for these
/// rather than Master calling back, since Nodes may sit behind NAT).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCommand {
    pub site_id: SiteId,
    pub action: CommandAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    Start,
    Stop,
}

#[async_trait]
pub trait MasterApiClient: Send + Sync {
    async fn join(&self, hostname: &str, address: &str) -> Result<JoinResponse, BackupError>;
    async fn poll_join_status(&self, code: &str) -> Result<JoinStatusResponse, BackupError>;
    async fn quota_check(&self, site_id: SiteId, estimated_bytes: u64) -> Result<QuotaCheck, BackupError>;
    async fn fetch_storage_config(&self) -> Result<StorageCredentials, BackupError>;
    async fn report_backup_result(&self, report: BackupReport) -> Result<(), BackupError>;
    async fn poll_commands(&self, node_id: NodeId) -> Result<Vec<PendingCommand>, BackupError>;
}

/// Talks to Master over HTTPS with the Node's API key in the `X-Node-Key`
/// header, the header the spec's "dedicated request header" calls for
/// (§4.4 Node auth).
pub struct HttpMasterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: parking_lot::RwLock<Option<String>>,
}

impl HttpMasterClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: parking_lot::RwLock::new(api_key),
        }
    }

    pub fn set_api_key(&self, key: String) {
        *self.api_key.write() = Some(key);
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.read().clone() {
            Some(key) => builder.header("X-Node-Key", key),
            None => builder,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn map_transport_err(err: reqwest::Error) -> BackupError {
    BackupError::transient(format!("master request failed: {err}"))
}

#[async_trait]
impl MasterApiClient for HttpMasterClient {
    async fn join(&self, hostname: &str, address: &str) -> Result<JoinResponse, BackupError> {
        self.http
            .post(self.url("/nodes/join-request"))
            .json(&serde_json::json!({ "hostname": hostname, "address": address }))
            .send()
            .await
            .map_err(map_transport_err)?
            .error_for_status()
            .map_err(map_transport_err)?
            .json()
            .await
            .map_err(map_transport_err)
    }

    async fn poll_join_status(&self, code: &str) -> Result<JoinStatusResponse, BackupError> {
        self.http
            .get(self.url(&format!("/nodes/status/code/{code}")))
            .send()
            .await
            .map_err(map_transport_err)?
            .error_for_status()
            .map_err(map_transport_err)?
            .json()
            .await
            .map_err(map_transport_err)
    }

    async fn quota_check(&self, site_id: SiteId, estimated_bytes: u64) -> Result<QuotaCheck, BackupError> {
        let request = self
            .http
            .get(self.url(&format!("/sites/{site_id}/quota/check")))
            .query(&[("estimated_bytes", estimated_bytes.to_string())]);
        self.authed(request)
            .send()
            .await
            .map_err(map_transport_err)?
            .error_for_status()
            .map_err(map_transport_err)?
            .json()
            .await
            .map_err(map_transport_err)
    }

    async fn fetch_storage_config(&self) -> Result<StorageCredentials, BackupError> {
        let request = self.http.get(self.url("/nodes/storage-config"));
        self.authed(request)
            .send()
            .await
            .map_err(map_transport_err)?
            .error_for_status()
            .map_err(map_transport_err)?
            .json()
            .await
            .map_err(map_transport_err)
    }

    async fn report_backup_result(&self, report: BackupReport) -> Result<(), BackupError> {
        let request = self
            .http
            .post(self.url(&format!("/sites/{}/backup/report", report.site_id)))
            .json(&report);
        self.authed(request)
            .send()
            .await
            .map_err(map_transport_err)?
            .error_for_status()
            .map_err(map_transport_err)?;
        Ok(())
    }

    async fn poll_commands(&self, node_id: NodeId) -> Result<Vec<PendingCommand>, BackupError> {
        let request = self.http.get(self.url(&format!("/nodes/{node_id}/commands")));
        self.authed(request)
            .send()
            .await
            .map_err(map_transport_err)?
            .error_for_status()
            .map_err(map_transport_err)?
            .json()
            .await
            .map_err(map_transport_err)
    }
}
