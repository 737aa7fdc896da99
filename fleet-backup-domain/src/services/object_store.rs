// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Port for the object-store backing a `StorageProvider` (§4.6). One
//! implementation wraps `aws-sdk-s3` for anything S3-compatible; a second,
//! filesystem-backed implementation satisfies `ProviderType::Local` and
//! doubles as the fixture for tests that would otherwise need a real
//! bucket.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::BackupError;
use crate::value_objects::ByteSize;

#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub object_path: String,
    pub size_bytes: ByteSize,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `local_path` to `object_path`, using multipart upload once the
    /// file crosses the adapter's configured part-size threshold.
    /// `cancellation` is checked between stages and, for a multipart put,
    /// before every part - an adapter that has already begun a multipart
    /// upload aborts it server-side rather than leaving an orphaned upload
    /// behind when cancellation lands mid-transfer.
    async fn put(&self, local_path: &Path, object_path: &str, cancellation: &CancellationToken) -> Result<PutOutcome, BackupError>;

    /// Produces a time-limited, presigned GET for ad-hoc retrieval; not used
    /// by the backup pipeline itself but required by §4.6 for download
    /// links surfaced through the Master API.
    async fn presign_get(&self, object_path: &str, expires_in_secs: u64) -> Result<String, BackupError>;

    async fn delete(&self, object_path: &str) -> Result<(), BackupError>;

    /// Lists every object under the given prefix, for reconciliation's drift
    /// scan against what the database thinks exists (§4.5 step 5).
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BackupError>;
}
