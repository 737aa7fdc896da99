// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for `StorageProvider` (§3, §4.6).

use async_trait::async_trait;

use crate::entities::StorageProvider;
use crate::error::BackupError;
use crate::value_objects::StorageProviderId;

#[async_trait]
pub trait StorageProviderRepository: Send + Sync {
    async fn insert(&self, provider: &StorageProvider) -> Result<(), BackupError>;

    async fn find_by_id(&self, id: StorageProviderId) -> Result<Option<StorageProvider>, BackupError>;

    async fn find_default(&self) -> Result<Option<StorageProvider>, BackupError>;

    async fn list_all(&self) -> Result<Vec<StorageProvider>, BackupError>;

    async fn update(&self, provider: &StorageProvider) -> Result<(), BackupError>;
}
