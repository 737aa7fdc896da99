// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite adapter for `ActivityLogRepository` (§3, §6.6). `append` is
//! transactional: insert the new row, then trim the same actor's history
//! down to `ACTIVITY_LOG_RETENTION`, oldest first, in the same transaction.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use fleet_backup_domain::entities::{ActivityLogEntry, ACTIVITY_LOG_RETENTION};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::ActivityLogRepository;
use fleet_backup_domain::value_objects::UserId;

pub struct SqliteActivityLogRepository {
    pool: SqlitePool,
}

impl SqliteActivityLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, entry: ActivityLogEntry) -> Result<(), BackupError> {
        let detail_json = serde_json::to_string(&entry.detail)
            .map_err(|err| BackupError::serialization(format!("activity log detail: {err}")))?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO activity_log (actor, action, target, source_address, user_agent, timestamp, detail) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.actor.to_string())
        .bind(&entry.action)
        .bind(&entry.target)
        .bind(&entry.source_address)
        .bind(&entry.user_agent)
        .bind(entry.timestamp)
        .bind(detail_json)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "DELETE FROM activity_log WHERE actor = ? AND id NOT IN ( \
                 SELECT id FROM activity_log WHERE actor = ? ORDER BY timestamp DESC LIMIT ? \
             )",
        )
        .bind(entry.actor.to_string())
        .bind(entry.actor.to_string())
        .bind(ACTIVITY_LOG_RETENTION as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn list_for_actor(&self, actor: UserId, limit: usize) -> Result<Vec<ActivityLogEntry>, BackupError> {
        let rows = sqlx::query(
            "SELECT * FROM activity_log WHERE actor = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(actor.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ActivityLogEntry, BackupError> {
    let actor: String = row.try_get("actor").map_err(db_err)?;
    let detail_json: String = row.try_get("detail").map_err(db_err)?;
    let detail: BTreeMap<String, serde_json::Value> = serde_json::from_str(&detail_json)
        .map_err(|err| BackupError::serialization(format!("activity log detail: {err}")))?;

    Ok(ActivityLogEntry {
        actor: UserId::parse(&actor)?,
        action: row.try_get("action").map_err(db_err)?,
        target: row.try_get("target").map_err(db_err)?,
        source_address: row.try_get("source_address").map_err(db_err)?,
        user_agent: row.try_get("user_agent").map_err(db_err)?,
        timestamp: row.try_get("timestamp").map_err(db_err)?,
        detail,
    })
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("activity log repository: {err}"))
}

#[async_trait]
impl ActivityLogRepository for SqliteActivityLogRepository {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), BackupError> {
        SqliteActivityLogRepository::append(self, entry).await
    }

    async fn list_for_actor(&self, actor: UserId, limit: usize) -> Result<Vec<ActivityLogEntry>, BackupError> {
        SqliteActivityLogRepository::list_for_actor(self, actor, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;

    async fn repo() -> SqliteActivityLogRepository {
        let pool = initialize_database(":memory:").await.unwrap();
        SqliteActivityLogRepository::new(pool)
    }

    #[tokio::test]
    async fn append_then_list_round_trips_detail() {
        let repo = repo().await;
        let actor = UserId::new();
        let entry = ActivityLogEntry::new(actor, "approve-node".into(), "node:abc".into(), "10.0.0.5".into())
            .with_detail("hostname", serde_json::json!("api1"));
        repo.append(entry).await.unwrap();

        let found = repo.list_for_actor(actor, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].detail.get("hostname").unwrap(), "api1");
    }

    #[tokio::test]
    async fn append_trims_to_retention_limit_per_actor() {
        let repo = repo().await;
        let actor = UserId::new();
        for i in 0..(ACTIVITY_LOG_RETENTION + 10) {
            let entry = ActivityLogEntry::new(actor, "action".into(), format!("target-{i}"), "10.0.0.5".into());
            repo.append(entry).await.unwrap();
        }

        let found = repo.list_for_actor(actor, ACTIVITY_LOG_RETENTION + 50).await.unwrap();
        assert_eq!(found.len(), ACTIVITY_LOG_RETENTION);
        assert_eq!(found[0].target, format!("target-{}", ACTIVITY_LOG_RETENTION + 9));
    }

    #[tokio::test]
    async fn list_for_actor_does_not_see_other_actors_entries() {
        let repo = repo().await;
        let actor_a = UserId::new();
        let actor_b = UserId::new();
        repo.append(ActivityLogEntry::new(actor_a, "action".into(), "target".into(), "10.0.0.5".into())).await.unwrap();
        repo.append(ActivityLogEntry::new(actor_b, "action".into(), "target".into(), "10.0.0.6".into())).await.unwrap();

        let found = repo.list_for_actor(actor_a, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].actor, actor_a);
    }
}
