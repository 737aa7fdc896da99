// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite adapter for `NodeRepository` (§3, §4.4), following the same
//! transaction-per-write / delegate-to-inherent-impl shape the teacher uses
//! for its pipeline repository adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use fleet_backup_domain::entities::{Node, NodeStatus};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::NodeRepository;
use fleet_backup_domain::value_objects::{ByteSize, NodeId};

pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, node: &Node) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO nodes (id, hostname, last_known_address, status, registration_code, api_key_hash, \
             storage_quota_bytes, storage_used_bytes, created_at, last_seen_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(node.id.to_string())
        .bind(&node.hostname)
        .bind(&node.last_known_address)
        .bind(status_str(node.status))
        .bind(&node.registration_code)
        .bind(&node.api_key_hash)
        .bind(node.storage_quota_bytes.bytes() as i64)
        .bind(node.storage_used_bytes.bytes() as i64)
        .bind(node.created_at)
        .bind(node.last_seen_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, BackupError> {
        let row = sqlx::query("SELECT * FROM nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_node(&row)).transpose()
    }

    pub async fn find_by_registration_code(&self, code: &str) -> Result<Option<Node>, BackupError> {
        let row = sqlx::query("SELECT * FROM nodes WHERE registration_code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_node(&row)).transpose()
    }

    pub async fn find_by_api_key_hash(&self, hash: &str) -> Result<Option<Node>, BackupError> {
        let row = sqlx::query("SELECT * FROM nodes WHERE api_key_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_node(&row)).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<Node>, BackupError> {
        let rows = sqlx::query("SELECT * FROM nodes ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_node).collect()
    }

    pub async fn update(&self, node: &Node) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "UPDATE nodes SET hostname = ?, last_known_address = ?, status = ?, registration_code = ?, \
             api_key_hash = ?, storage_quota_bytes = ?, storage_used_bytes = ?, last_seen_at = ? WHERE id = ?",
        )
        .bind(&node.hostname)
        .bind(&node.last_known_address)
        .bind(status_str(node.status))
        .bind(&node.registration_code)
        .bind(&node.api_key_hash)
        .bind(node.storage_quota_bytes.bytes() as i64)
        .bind(node.storage_used_bytes.bytes() as i64)
        .bind(node.last_seen_at)
        .bind(node.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn delete(&self, id: NodeId) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM nodes WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

fn status_str(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "pending",
        NodeStatus::Active => "active",
        NodeStatus::Blocked => "blocked",
        NodeStatus::Inactive => "inactive",
    }
}

fn parse_status(value: &str) -> Result<NodeStatus, BackupError> {
    match value {
        "pending" => Ok(NodeStatus::Pending),
        "active" => Ok(NodeStatus::Active),
        "blocked" => Ok(NodeStatus::Blocked),
        "inactive" => Ok(NodeStatus::Inactive),
        other => Err(BackupError::integrity(format!("unknown node status '{other}' in database"))),
    }
}

fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> Result<Node, BackupError> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let quota: i64 = row.try_get("storage_quota_bytes").map_err(db_err)?;
    let used: i64 = row.try_get("storage_used_bytes").map_err(db_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
    let last_seen_at: Option<DateTime<Utc>> = row.try_get("last_seen_at").map_err(db_err)?;

    Ok(Node {
        id: NodeId::parse(&id)?,
        hostname: row.try_get("hostname").map_err(db_err)?,
        last_known_address: row.try_get("last_known_address").map_err(db_err)?,
        status: parse_status(&status)?,
        registration_code: row.try_get("registration_code").map_err(db_err)?,
        api_key_hash: row.try_get("api_key_hash").map_err(db_err)?,
        storage_quota_bytes: ByteSize::from_bytes(quota as u64),
        storage_used_bytes: ByteSize::from_bytes(used as u64),
        created_at,
        last_seen_at,
    })
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("node repository: {err}"))
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn insert(&self, node: &Node) -> Result<(), BackupError> {
        SqliteNodeRepository::insert(self, node).await
    }

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, BackupError> {
        SqliteNodeRepository::find_by_id(self, id).await
    }

    async fn find_by_registration_code(&self, code: &str) -> Result<Option<Node>, BackupError> {
        SqliteNodeRepository::find_by_registration_code(self, code).await
    }

    async fn find_by_api_key_hash(&self, hash: &str) -> Result<Option<Node>, BackupError> {
        SqliteNodeRepository::find_by_api_key_hash(self, hash).await
    }

    async fn list_all(&self) -> Result<Vec<Node>, BackupError> {
        SqliteNodeRepository::list_all(self).await
    }

    async fn update(&self, node: &Node) -> Result<(), BackupError> {
        SqliteNodeRepository::update(self, node).await
    }

    async fn delete(&self, id: NodeId) -> Result<(), BackupError> {
        SqliteNodeRepository::delete(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;

    async fn repo() -> SqliteNodeRepository {
        let pool = initialize_database(":memory:").await.unwrap();
        SqliteNodeRepository::new(pool)
    }

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let repo = repo().await;
        let node = Node::new_pending("api1".into(), "10.0.0.1".into(), "XK7M2".into());
        repo.insert(&node).await.unwrap();

        let found = repo.find_by_id(node.id).await.unwrap().unwrap();
        assert_eq!(found.hostname, "api1");
        assert_eq!(found.status, NodeStatus::Pending);
        assert_eq!(found.registration_code.as_deref(), Some("XK7M2"));
    }

    #[tokio::test]
    async fn approve_persists_through_update() {
        let repo = repo().await;
        let mut node = Node::new_pending("api1".into(), "10.0.0.1".into(), "XK7M2".into());
        repo.insert(&node).await.unwrap();

        node.approve("hashed-key".into()).unwrap();
        repo.update(&node).await.unwrap();

        let found = repo.find_by_api_key_hash("hashed-key").await.unwrap().unwrap();
        assert_eq!(found.id, node.id);
        assert!(found.registration_code.is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let repo = repo().await;
        let node = Node::new_pending("api1".into(), "10.0.0.1".into(), "XK7M2".into());
        repo.insert(&node).await.unwrap();
        repo.delete(node.id).await.unwrap();
        assert!(repo.find_by_id(node.id).await.unwrap().is_none());
    }
}
