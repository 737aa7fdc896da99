// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite adapter for `SiteRepository` (§3, §4.7). `DbCredentials` and
//! `Schedule` are flattened into the `sites` row rather than given their own
//! tables - both are 1:1 with a site and neither is ever queried on its own.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use fleet_backup_domain::entities::{DbCredentials, Site};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::SiteRepository;
use fleet_backup_domain::value_objects::{ByteSize, Frequency, NodeId, Schedule, SiteId};

pub struct SqliteSiteRepository {
    pool: SqlitePool,
}

impl SqliteSiteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, site: &Site) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let creds = site.db_credentials.as_ref();
        sqlx::query(
            "INSERT INTO sites (id, node_id, name, wp_config_path, wp_content_path, db_host, db_port, \
             db_database, db_username, db_password, storage_quota_bytes, storage_used_bytes, quota_exceeded_at, \
             schedule_frequency, schedule_local_time, schedule_day_mask, schedule_retention_copies, \
             schedule_timezone, next_run_at, last_backup_size_bytes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(site.id.to_string())
        .bind(site.node_id.to_string())
        .bind(&site.name)
        .bind(&site.wp_config_path)
        .bind(&site.wp_content_path)
        .bind(creds.map(|c| c.host.clone()))
        .bind(creds.map(|c| c.port as i64))
        .bind(creds.map(|c| c.database.clone()))
        .bind(creds.map(|c| c.username.clone()))
        .bind(creds.map(|c| c.password.clone()))
        .bind(site.storage_quota_bytes.bytes() as i64)
        .bind(site.storage_used_bytes.bytes() as i64)
        .bind(site.quota_exceeded_at)
        .bind(frequency_str(site.schedule.frequency))
        .bind(site.schedule.local_time.format("%H:%M:%S").to_string())
        .bind(site.schedule.day_mask as i64)
        .bind(site.schedule.retention_copies as i64)
        .bind(site.schedule.timezone.name())
        .bind(site.next_run_at)
        .bind(site.last_backup_size_bytes.map(|b| b.bytes() as i64))
        .bind(site.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, BackupError> {
        let row = sqlx::query("SELECT * FROM sites WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_site(&row)).transpose()
    }

    pub async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<Site>, BackupError> {
        let rows = sqlx::query("SELECT * FROM sites WHERE node_id = ? ORDER BY created_at")
            .bind(node_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_site).collect()
    }

    pub async fn list_all(&self) -> Result<Vec<Site>, BackupError> {
        let rows = sqlx::query("SELECT * FROM sites ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_site).collect()
    }

    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Site>, BackupError> {
        let rows = sqlx::query("SELECT * FROM sites WHERE next_run_at IS NOT NULL AND next_run_at <= ? ORDER BY next_run_at")
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_site).collect()
    }

    pub async fn update(&self, site: &Site) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let creds = site.db_credentials.as_ref();
        sqlx::query(
            "UPDATE sites SET name = ?, wp_config_path = ?, wp_content_path = ?, db_host = ?, db_port = ?, \
             db_database = ?, db_username = ?, db_password = ?, storage_quota_bytes = ?, storage_used_bytes = ?, \
             quota_exceeded_at = ?, schedule_frequency = ?, schedule_local_time = ?, schedule_day_mask = ?, \
             schedule_retention_copies = ?, schedule_timezone = ?, next_run_at = ?, last_backup_size_bytes = ? \
             WHERE id = ?",
        )
        .bind(&site.name)
        .bind(&site.wp_config_path)
        .bind(&site.wp_content_path)
        .bind(creds.map(|c| c.host.clone()))
        .bind(creds.map(|c| c.port as i64))
        .bind(creds.map(|c| c.database.clone()))
        .bind(creds.map(|c| c.username.clone()))
        .bind(creds.map(|c| c.password.clone()))
        .bind(site.storage_quota_bytes.bytes() as i64)
        .bind(site.storage_used_bytes.bytes() as i64)
        .bind(site.quota_exceeded_at)
        .bind(frequency_str(site.schedule.frequency))
        .bind(site.schedule.local_time.format("%H:%M:%S").to_string())
        .bind(site.schedule.day_mask as i64)
        .bind(site.schedule.retention_copies as i64)
        .bind(site.schedule.timezone.name())
        .bind(site.next_run_at)
        .bind(site.last_backup_size_bytes.map(|b| b.bytes() as i64))
        .bind(site.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn delete(&self, id: SiteId) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM sites WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

fn frequency_str(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Manual => "manual",
        Frequency::Daily => "daily",
        Frequency::Weekly => "weekly",
        Frequency::Monthly => "monthly",
    }
}

fn parse_frequency(value: &str) -> Result<Frequency, BackupError> {
    match value {
        "manual" => Ok(Frequency::Manual),
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        "monthly" => Ok(Frequency::Monthly),
        other => Err(BackupError::integrity(format!("unknown schedule frequency '{other}' in database"))),
    }
}

fn row_to_site(row: &sqlx::sqlite::SqliteRow) -> Result<Site, BackupError> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let node_id: String = row.try_get("node_id").map_err(db_err)?;
    let quota: i64 = row.try_get("storage_quota_bytes").map_err(db_err)?;
    let used: i64 = row.try_get("storage_used_bytes").map_err(db_err)?;

    let db_host: Option<String> = row.try_get("db_host").map_err(db_err)?;
    let db_credentials = db_host.map(|host| -> Result<DbCredentials, BackupError> {
        Ok(DbCredentials {
            host,
            port: row.try_get::<i64, _>("db_port").map_err(db_err)? as u16,
            database: row.try_get("db_database").map_err(db_err)?,
            username: row.try_get("db_username").map_err(db_err)?,
            password: row.try_get("db_password").map_err(db_err)?,
        })
    }).transpose()?;

    let frequency: String = row.try_get("schedule_frequency").map_err(db_err)?;
    let local_time: String = row.try_get("schedule_local_time").map_err(db_err)?;
    let timezone_name: String = row.try_get("schedule_timezone").map_err(db_err)?;
    let day_mask: i64 = row.try_get("schedule_day_mask").map_err(db_err)?;
    let retention_copies: i64 = row.try_get("schedule_retention_copies").map_err(db_err)?;

    let schedule = Schedule {
        frequency: parse_frequency(&frequency)?,
        local_time: NaiveTime::parse_from_str(&local_time, "%H:%M:%S")
            .map_err(|e| BackupError::integrity(format!("invalid stored local_time '{local_time}': {e}")))?,
        day_mask: day_mask as u32,
        retention_copies: retention_copies as u32,
        timezone: chrono_tz::Tz::from_str(&timezone_name)
            .map_err(|e| BackupError::integrity(format!("invalid stored timezone '{timezone_name}': {e}")))?,
    };

    let last_backup_size_bytes: Option<i64> = row.try_get("last_backup_size_bytes").map_err(db_err)?;

    Ok(Site {
        id: SiteId::parse(&id)?,
        node_id: NodeId::parse(&node_id)?,
        name: row.try_get("name").map_err(db_err)?,
        wp_config_path: row.try_get("wp_config_path").map_err(db_err)?,
        wp_content_path: row.try_get("wp_content_path").map_err(db_err)?,
        db_credentials,
        storage_quota_bytes: ByteSize::from_bytes(quota as u64),
        storage_used_bytes: ByteSize::from_bytes(used as u64),
        quota_exceeded_at: row.try_get("quota_exceeded_at").map_err(db_err)?,
        schedule,
        next_run_at: row.try_get("next_run_at").map_err(db_err)?,
        last_backup_size_bytes: last_backup_size_bytes.map(|b| ByteSize::from_bytes(b as u64)),
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("site repository: {err}"))
}

#[async_trait]
impl SiteRepository for SqliteSiteRepository {
    async fn insert(&self, site: &Site) -> Result<(), BackupError> {
        SqliteSiteRepository::insert(self, site).await
    }

    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, BackupError> {
        SqliteSiteRepository::find_by_id(self, id).await
    }

    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<Site>, BackupError> {
        SqliteSiteRepository::list_for_node(self, node_id).await
    }

    async fn list_all(&self) -> Result<Vec<Site>, BackupError> {
        SqliteSiteRepository::list_all(self).await
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Site>, BackupError> {
        SqliteSiteRepository::list_due(self, now).await
    }

    async fn update(&self, site: &Site) -> Result<(), BackupError> {
        SqliteSiteRepository::update(self, site).await
    }

    async fn delete(&self, id: SiteId) -> Result<(), BackupError> {
        SqliteSiteRepository::delete(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;
    use chrono::Utc;

    fn sample_site() -> Site {
        Site {
            id: SiteId::new(),
            node_id: NodeId::new(),
            name: "example".into(),
            wp_config_path: "/var/www/example/wp-config.php".into(),
            wp_content_path: "/var/www/example/wp-content".into(),
            db_credentials: Some(DbCredentials {
                host: "127.0.0.1".into(),
                port: 3306,
                database: "wp".into(),
                username: "wp".into(),
                password: "secret".into(),
            }),
            storage_quota_bytes: ByteSize::gib(20),
            storage_used_bytes: ByteSize::gib(5),
            quota_exceeded_at: None,
            schedule: Schedule::default(),
            next_run_at: Some(Utc::now()),
            last_backup_size_bytes: Some(ByteSize::gib(3)),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_find_round_trips_credentials_and_schedule() {
        let pool = initialize_database(":memory:").await.unwrap();
        let repo = SqliteSiteRepository::new(pool);
        let site = sample_site();
        repo.insert(&site).await.unwrap();

        let found = repo.find_by_id(site.id).await.unwrap().unwrap();
        assert_eq!(found.name, "example");
        assert_eq!(found.db_credentials.unwrap().database, "wp");
        assert_eq!(found.schedule.retention_copies, 3);
        assert_eq!(found.schedule.timezone.name(), "Africa/Harare");
    }

    #[tokio::test]
    async fn list_due_only_returns_past_next_run_at() {
        let pool = initialize_database(":memory:").await.unwrap();
        let repo = SqliteSiteRepository::new(pool);
        let mut due = sample_site();
        due.next_run_at = Some(Utc::now() - chrono::Duration::minutes(5));
        let mut not_due = sample_site();
        not_due.next_run_at = Some(Utc::now() + chrono::Duration::hours(1));
        repo.insert(&due).await.unwrap();
        repo.insert(&not_due).await.unwrap();

        let results = repo.list_due(Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, due.id);
    }
}
