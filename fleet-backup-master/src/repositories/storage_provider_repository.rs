// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite adapter for `StorageProviderRepository` (§3, §4.6). Credentials are
//! persisted only in their sealed form - this adapter never sees plaintext
//! and never needs to, since `StorageProvider` only ever carries
//! `SealedSecret` values. No `delete`: providers are retired via `is_active`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use fleet_backup_domain::entities::{ProviderType, SealedSecret, StorageProvider};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::StorageProviderRepository;
use fleet_backup_domain::value_objects::{ByteSize, StorageProviderId};

pub struct SqliteStorageProviderRepository {
    pool: SqlitePool,
}

impl SqliteStorageProviderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, provider: &StorageProvider) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO storage_providers (id, provider_type, endpoint, region, bucket, \
             sealed_access_key_ciphertext, sealed_access_key_nonce, sealed_access_key_generation, \
             sealed_secret_key_ciphertext, sealed_secret_key_nonce, sealed_secret_key_generation, \
             storage_limit_bytes, storage_used_bytes, is_default, is_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(provider.id.to_string())
        .bind(provider_type_str(provider.provider_type))
        .bind(&provider.endpoint)
        .bind(&provider.region)
        .bind(&provider.bucket)
        .bind(&provider.sealed_access_key.ciphertext)
        .bind(provider.sealed_access_key.nonce.to_vec())
        .bind(provider.sealed_access_key.key_generation as i64)
        .bind(&provider.sealed_secret_key.ciphertext)
        .bind(provider.sealed_secret_key.nonce.to_vec())
        .bind(provider.sealed_secret_key.key_generation as i64)
        .bind(provider.storage_limit_bytes.bytes() as i64)
        .bind(provider.storage_used_bytes.bytes() as i64)
        .bind(provider.is_default as i64)
        .bind(provider.is_active as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: StorageProviderId) -> Result<Option<StorageProvider>, BackupError> {
        let row = sqlx::query("SELECT * FROM storage_providers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_provider(&row)).transpose()
    }

    pub async fn find_default(&self) -> Result<Option<StorageProvider>, BackupError> {
        let row = sqlx::query("SELECT * FROM storage_providers WHERE is_default = 1 AND is_active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_provider(&row)).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<StorageProvider>, BackupError> {
        let rows = sqlx::query("SELECT * FROM storage_providers")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_provider).collect()
    }

    pub async fn update(&self, provider: &StorageProvider) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "UPDATE storage_providers SET endpoint = ?, region = ?, bucket = ?, \
             sealed_access_key_ciphertext = ?, sealed_access_key_nonce = ?, sealed_access_key_generation = ?, \
             sealed_secret_key_ciphertext = ?, sealed_secret_key_nonce = ?, sealed_secret_key_generation = ?, \
             storage_limit_bytes = ?, storage_used_bytes = ?, is_default = ?, is_active = ? WHERE id = ?",
        )
        .bind(&provider.endpoint)
        .bind(&provider.region)
        .bind(&provider.bucket)
        .bind(&provider.sealed_access_key.ciphertext)
        .bind(provider.sealed_access_key.nonce.to_vec())
        .bind(provider.sealed_access_key.key_generation as i64)
        .bind(&provider.sealed_secret_key.ciphertext)
        .bind(provider.sealed_secret_key.nonce.to_vec())
        .bind(provider.sealed_secret_key.key_generation as i64)
        .bind(provider.storage_limit_bytes.bytes() as i64)
        .bind(provider.storage_used_bytes.bytes() as i64)
        .bind(provider.is_default as i64)
        .bind(provider.is_active as i64)
        .bind(provider.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

fn provider_type_str(provider_type: ProviderType) -> &'static str {
    match provider_type {
        ProviderType::S3Compatible => "s3_compatible",
        ProviderType::Local => "local",
    }
}

fn parse_provider_type(value: &str) -> Result<ProviderType, BackupError> {
    match value {
        "s3_compatible" => Ok(ProviderType::S3Compatible),
        "local" => Ok(ProviderType::Local),
        other => Err(BackupError::integrity(format!("unknown provider type '{other}' in database"))),
    }
}

fn row_to_provider(row: &sqlx::sqlite::SqliteRow) -> Result<StorageProvider, BackupError> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let provider_type: String = row.try_get("provider_type").map_err(db_err)?;
    let storage_limit_bytes: i64 = row.try_get("storage_limit_bytes").map_err(db_err)?;
    let storage_used_bytes: i64 = row.try_get("storage_used_bytes").map_err(db_err)?;
    let is_default: i64 = row.try_get("is_default").map_err(db_err)?;
    let is_active: i64 = row.try_get("is_active").map_err(db_err)?;

    let sealed_access_key = sealed_secret_from_row(row, "sealed_access_key")?;
    let sealed_secret_key = sealed_secret_from_row(row, "sealed_secret_key")?;

    Ok(StorageProvider {
        id: StorageProviderId::parse(&id)?,
        provider_type: parse_provider_type(&provider_type)?,
        endpoint: row.try_get("endpoint").map_err(db_err)?,
        region: row.try_get("region").map_err(db_err)?,
        bucket: row.try_get("bucket").map_err(db_err)?,
        sealed_access_key,
        sealed_secret_key,
        storage_limit_bytes: ByteSize::from_bytes(storage_limit_bytes as u64),
        storage_used_bytes: ByteSize::from_bytes(storage_used_bytes as u64),
        is_default: is_default != 0,
        is_active: is_active != 0,
    })
}

fn sealed_secret_from_row(row: &sqlx::sqlite::SqliteRow, prefix: &str) -> Result<SealedSecret, BackupError> {
    let ciphertext: Vec<u8> = row.try_get(format!("{prefix}_ciphertext").as_str()).map_err(db_err)?;
    let nonce_bytes: Vec<u8> = row.try_get(format!("{prefix}_nonce").as_str()).map_err(db_err)?;
    let generation: i64 = row.try_get(format!("{prefix}_generation").as_str()).map_err(db_err)?;
    let nonce: [u8; 12] = nonce_bytes
        .try_into()
        .map_err(|_| BackupError::integrity(format!("{prefix}_nonce is not 12 bytes in database")))?;
    Ok(SealedSecret { ciphertext, nonce, key_generation: generation as u32 })
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("storage provider repository: {err}"))
}

#[async_trait]
impl StorageProviderRepository for SqliteStorageProviderRepository {
    async fn insert(&self, provider: &StorageProvider) -> Result<(), BackupError> {
        SqliteStorageProviderRepository::insert(self, provider).await
    }

    async fn find_by_id(&self, id: StorageProviderId) -> Result<Option<StorageProvider>, BackupError> {
        SqliteStorageProviderRepository::find_by_id(self, id).await
    }

    async fn find_default(&self) -> Result<Option<StorageProvider>, BackupError> {
        SqliteStorageProviderRepository::find_default(self).await
    }

    async fn list_all(&self) -> Result<Vec<StorageProvider>, BackupError> {
        SqliteStorageProviderRepository::list_all(self).await
    }

    async fn update(&self, provider: &StorageProvider) -> Result<(), BackupError> {
        SqliteStorageProviderRepository::update(self, provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;

    fn sample_provider() -> StorageProvider {
        StorageProvider {
            id: StorageProviderId::new(),
            provider_type: ProviderType::S3Compatible,
            endpoint: "https://s3.example.com".into(),
            region: "us-east-1".into(),
            bucket: "fleet-backups".into(),
            sealed_access_key: SealedSecret { ciphertext: vec![1, 2, 3], nonce: [0u8; 12], key_generation: 0 },
            sealed_secret_key: SealedSecret { ciphertext: vec![4, 5, 6], nonce: [1u8; 12], key_generation: 0 },
            storage_limit_bytes: ByteSize::tib(1),
            storage_used_bytes: ByteSize::gib(10),
            is_default: true,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn insert_then_find_round_trips_sealed_secrets() {
        let pool = initialize_database(":memory:").await.unwrap();
        let repo = SqliteStorageProviderRepository::new(pool);
        let provider = sample_provider();
        repo.insert(&provider).await.unwrap();

        let found = repo.find_by_id(provider.id).await.unwrap().unwrap();
        assert_eq!(found.sealed_access_key.ciphertext, vec![1, 2, 3]);
        assert_eq!(found.sealed_secret_key.nonce, [1u8; 12]);
    }

    #[tokio::test]
    async fn find_default_only_matches_active_default_provider() {
        let pool = initialize_database(":memory:").await.unwrap();
        let repo = SqliteStorageProviderRepository::new(pool);
        let mut inactive_default = sample_provider();
        inactive_default.is_active = false;
        repo.insert(&inactive_default).await.unwrap();

        assert!(repo.find_default().await.unwrap().is_none());

        let active_default = sample_provider();
        repo.insert(&active_default).await.unwrap();
        let found = repo.find_default().await.unwrap().unwrap();
        assert_eq!(found.id, active_default.id);
    }
}
