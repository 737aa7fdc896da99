// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! S3-compatible object store adapter. Credentials are supplied per call
//! site as plaintext already unsealed by the caller (§4.6: "the adapter is
//! the only place that sees unsealed credentials; they are passed in per
//! call and dropped when the call returns") - this type is constructed
//! fresh for the duration of one upload stage, never cached across jobs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio_util::sync::CancellationToken;

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::services::object_store::{ObjectStore, PutOutcome};
use fleet_backup_domain::value_objects::ByteSize;

/// Files at or above this size are uploaded via multipart (S3's own minimum
/// part size is 5 MiB).
const MULTIPART_THRESHOLD_BYTES: u64 = 16 * 1024 * 1024;
const PART_SIZE_BYTES: u64 = 16 * 1024 * 1024;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(endpoint: &str, region: &str, bucket: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "fleet-backup-sealed");
        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .behavior_version_latest()
            .build();
        Self {
            client: Client::from_conf(config),
            bucket: bucket.to_string(),
        }
    }

    async fn put_single(&self, local_path: &Path, object_path: &str) -> Result<(), BackupError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|err| BackupError::transient(format!("failed to open archive for upload: {err}")))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_path)
            .body(body)
            .send()
            .await
            .map_err(|err| BackupError::transient(format!("s3 put_object failed: {err}")))?;
        Ok(())
    }

    async fn put_multipart(&self, local_path: &Path, object_path: &str, size: u64, cancellation: &CancellationToken) -> Result<(), BackupError> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(object_path)
            .send()
            .await
            .map_err(|err| BackupError::transient(format!("s3 create_multipart_upload failed: {err}")))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| BackupError::transient("s3 did not return an upload id"))?
            .to_string();

        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1i32;

        while offset < size {
            if cancellation.is_cancelled() {
                self.abort_multipart(object_path, &upload_id).await;
                return Err(BackupError::cancelled("upload cancelled before next multipart part"));
            }

            let length = PART_SIZE_BYTES.min(size - offset);
            let body = match ByteStream::read_from()
                .path(local_path)
                .offset(offset)
                .length(aws_sdk_s3::primitives::Length::Exact(length))
                .build()
                .await
            {
                Ok(body) => body,
                Err(err) => {
                    self.abort_multipart(object_path, &upload_id).await;
                    return Err(BackupError::transient(format!("failed to stream archive part: {err}")));
                }
            };

            let uploaded = match self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(object_path)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
            {
                Ok(uploaded) => uploaded,
                Err(err) => {
                    self.abort_multipart(object_path, &upload_id).await;
                    return Err(BackupError::transient(format!("s3 upload_part failed: {err}")));
                }
            };

            let etag = uploaded.e_tag().unwrap_or_default().to_string();
            parts.push(
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(etag)
                    .build(),
            );

            offset += length;
            part_number += 1;
        }

        let completed = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        if let Err(err) = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(object_path)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            self.abort_multipart(object_path, &upload_id).await;
            return Err(BackupError::transient(format!("s3 complete_multipart_upload failed: {err}")));
        }
        Ok(())
    }

    /// Best-effort cleanup: an abort failure is only logged, never returned,
    /// so it never shadows the error that triggered the abort in the first
    /// place.
    async fn abort_multipart(&self, object_path: &str, upload_id: &str) {
        if let Err(err) = self.client.abort_multipart_upload().bucket(&self.bucket).key(object_path).upload_id(upload_id).send().await {
            tracing::warn!(object_path, upload_id, error = %err, "failed to abort multipart upload");
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, local_path: &Path, object_path: &str, cancellation: &CancellationToken) -> Result<PutOutcome, BackupError> {
        if cancellation.is_cancelled() {
            return Err(BackupError::cancelled("upload cancelled before start"));
        }

        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|err| BackupError::transient(format!("cannot stat archive before upload: {err}")))?;
        let size = metadata.len();

        if size >= MULTIPART_THRESHOLD_BYTES {
            self.put_multipart(local_path, object_path, size, cancellation).await?;
        } else {
            self.put_single(local_path, object_path).await?;
        }

        Ok(PutOutcome {
            object_path: object_path.to_string(),
            size_bytes: ByteSize::from_bytes(size),
        })
    }

    async fn presign_get(&self, object_path: &str, expires_in_secs: u64) -> Result<String, BackupError> {
        let presign_config = PresigningConfig::expires_in(Duration::from_secs(expires_in_secs))
            .map_err(|err| BackupError::config(format!("invalid presign duration: {err}")))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_path)
            .presigned(presign_config)
            .await
            .map_err(|err| BackupError::transient(format!("s3 presign failed: {err}")))?;
        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, object_path: &str) -> Result<(), BackupError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_path)
            .send()
            .await
            .map_err(|err| BackupError::transient(format!("s3 delete_object failed: {err}")))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BackupError> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|err| BackupError::transient(format!("s3 list_objects_v2 failed: {err}")))?;

            keys.extend(response.contents().iter().filter_map(|obj| obj.key().map(str::to_string)));

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(keys)
    }
}
