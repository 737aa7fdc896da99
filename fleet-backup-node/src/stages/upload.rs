// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `upload` (§4.1, §4.4, §4.6): pre-flight quota check, sealed-credential
//! fetch + unseal (Master hands back plaintext already unsealed, over TLS -
//! the Node never writes it to disk), multipart put to
//! `{bucket}/{node_uuid}/{site_uuid}/{filename}`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::services::object_store::ObjectStore;
use fleet_backup_domain::value_objects::NodeId;
use fleet_backup_engine::object_store::{LocalObjectStore, S3ObjectStore};
use fleet_backup_engine::{Context, Stage, StageResult};

use crate::master_client::MasterApiClient;

pub struct UploadStage {
    master: Arc<dyn MasterApiClient>,
    node_id: NodeId,
}

impl UploadStage {
    pub fn new(master: Arc<dyn MasterApiClient>, node_id: NodeId) -> Self {
        Self { master, node_id }
    }
}

fn build_store(creds: &crate::master_client::StorageCredentials) -> Box<dyn ObjectStore> {
    if creds.provider_type == "local" {
        Box::new(LocalObjectStore::new(&creds.bucket))
    } else {
        Box::new(S3ObjectStore::new(&creds.endpoint, &creds.region, &creds.bucket, &creds.access_key, &creds.secret_key))
    }
}

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> &'static str {
        "upload"
    }

    async fn run(&self, ctx: &mut Context) -> StageResult {
        let start = Instant::now();

        if ctx.is_cancelled() {
            return StageResult::stopped(start.elapsed());
        }

        let archive_path = match &ctx.archive_path {
            Some(path) => path.clone(),
            None => return StageResult::failed("no archive produced by bundle stage", start.elapsed()),
        };

        let size = match tokio::fs::metadata(&archive_path).await {
            Ok(meta) => meta.len(),
            Err(err) => return StageResult::failed(format!("cannot stat archive: {err}"), start.elapsed()),
        };

        let quota = match self.master.quota_check(ctx.site_id, size).await {
            Ok(quota) => quota,
            Err(err) => return StageResult::failed(format!("quota pre-flight check failed: {err}"), start.elapsed()),
        };
        if !quota.can_proceed {
            let reason = quota.exceeds.unwrap_or_else(|| "quota exceeded".to_string());
            return StageResult::failed(BackupError::quota_exceeded(reason).to_string(), start.elapsed());
        }

        let creds = match self.master.fetch_storage_config().await {
            Ok(creds) => creds,
            Err(err) => return StageResult::failed(format!("failed to fetch storage credentials: {err}"), start.elapsed()),
        };
        let store = build_store(&creds);

        let filename = archive_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let object_path = format!("{}/{}/{}", self.node_id, ctx.site_id, filename);

        let permit = match ctx.resource_governor().acquire_network(&ctx.cancellation).await {
            Ok(permit) => permit,
            Err(err) => return StageResult::failed(err.to_string(), start.elapsed()),
        };
        ctx.resource_governor().throttle_upload(size).await;
        let outcome = store.put(&archive_path, &object_path, &ctx.cancellation).await;
        drop(permit);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => return StageResult::failed(format!("upload failed: {err}"), start.elapsed()),
        };

        ctx.object_path = Some(outcome.object_path.clone());
        ctx.scratchpad.insert("uploaded_bytes".to_string(), outcome.size_bytes.bytes().to_string());
        if let Err(err) = ctx.report_progress(self.name(), 1.0, size, size, true).await {
            tracing::warn!(error = %err, "failed to report upload progress");
        }

        StageResult::ok("archive uploaded", start.elapsed())
            .with_detail("object_path", outcome.object_path)
            .with_detail("bytes", outcome.size_bytes.bytes().to_string())
    }
}
