// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Operator accounts and RBAC assignments (§6.2). Unlike the other
//! repositories in this module this one has no counterpart trait in
//! `fleet_backup_domain::repositories` - there is no `User` entity in the
//! domain, since a user is purely a control-plane concept (it manages nodes
//! and sites, it is not backed up). `SqliteUserRepository` is this crate's
//! own port, following the same shape as the domain ones for consistency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::{NodeId, SiteId, UserId};

use crate::auth::jwt::Role;

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub mfa_secret: Option<String>,
    pub mfa_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<(), BackupError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, BackupError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, BackupError>;
    async fn list_all(&self) -> Result<Vec<User>, BackupError>;
    async fn update(&self, user: &User) -> Result<(), BackupError>;
    async fn assigned_node_ids(&self, user_id: UserId) -> Result<HashSet<NodeId>, BackupError>;
    async fn assigned_site_ids(&self, user_id: UserId) -> Result<HashSet<SiteId>, BackupError>;
    async fn assign_node(&self, user_id: UserId, node_id: NodeId) -> Result<(), BackupError>;
    async fn assign_site(&self, user_id: UserId, site_id: SiteId) -> Result<(), BackupError>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, user: &User) -> Result<(), BackupError> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, mfa_secret, mfa_enabled, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(role_str(user.role))
        .bind(&user.mfa_secret)
        .bind(user.mfa_enabled as i64)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: UserId) -> Result<Option<User>, BackupError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_user(&row)).transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, BackupError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_user(&row)).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<User>, BackupError> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_user).collect()
    }

    pub async fn update(&self, user: &User) -> Result<(), BackupError> {
        sqlx::query(
            "UPDATE users SET password_hash = ?, role = ?, mfa_secret = ?, mfa_enabled = ? WHERE id = ?",
        )
        .bind(&user.password_hash)
        .bind(role_str(user.role))
        .bind(&user.mfa_secret)
        .bind(user.mfa_enabled as i64)
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn assigned_node_ids(&self, user_id: UserId) -> Result<HashSet<NodeId>, BackupError> {
        let rows = sqlx::query("SELECT node_id FROM user_node_assignments WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let node_id: String = row.try_get("node_id").map_err(db_err)?;
                NodeId::parse(&node_id)
            })
            .collect()
    }

    pub async fn assigned_site_ids(&self, user_id: UserId) -> Result<HashSet<SiteId>, BackupError> {
        let rows = sqlx::query("SELECT site_id FROM user_site_assignments WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let site_id: String = row.try_get("site_id").map_err(db_err)?;
                SiteId::parse(&site_id)
            })
            .collect()
    }

    pub async fn assign_node(&self, user_id: UserId, node_id: NodeId) -> Result<(), BackupError> {
        sqlx::query("INSERT OR IGNORE INTO user_node_assignments (user_id, node_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(node_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn assign_site(&self, user_id: UserId, site_id: SiteId) -> Result<(), BackupError> {
        sqlx::query("INSERT OR IGNORE INTO user_site_assignments (user_id, site_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(site_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::SuperAdmin => "super_admin",
        Role::NodeAdmin => "node_admin",
        Role::SiteAdmin => "site_admin",
    }
}

fn parse_role(value: &str) -> Result<Role, BackupError> {
    match value {
        "super_admin" => Ok(Role::SuperAdmin),
        "node_admin" => Ok(Role::NodeAdmin),
        "site_admin" => Ok(Role::SiteAdmin),
        other => Err(BackupError::integrity(format!("unknown role '{other}' in database"))),
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, BackupError> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let role: String = row.try_get("role").map_err(db_err)?;
    let mfa_enabled: i64 = row.try_get("mfa_enabled").map_err(db_err)?;

    Ok(User {
        id: UserId::parse(&id)?,
        email: row.try_get("email").map_err(db_err)?,
        password_hash: row.try_get("password_hash").map_err(db_err)?,
        role: parse_role(&role)?,
        mfa_secret: row.try_get("mfa_secret").map_err(db_err)?,
        mfa_enabled: mfa_enabled != 0,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("user repository: {err}"))
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn insert(&self, user: &User) -> Result<(), BackupError> {
        SqliteUserRepository::insert(self, user).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, BackupError> {
        SqliteUserRepository::find_by_id(self, id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, BackupError> {
        SqliteUserRepository::find_by_email(self, email).await
    }

    async fn list_all(&self) -> Result<Vec<User>, BackupError> {
        SqliteUserRepository::list_all(self).await
    }

    async fn update(&self, user: &User) -> Result<(), BackupError> {
        SqliteUserRepository::update(self, user).await
    }

    async fn assigned_node_ids(&self, user_id: UserId) -> Result<HashSet<NodeId>, BackupError> {
        SqliteUserRepository::assigned_node_ids(self, user_id).await
    }

    async fn assigned_site_ids(&self, user_id: UserId) -> Result<HashSet<SiteId>, BackupError> {
        SqliteUserRepository::assigned_site_ids(self, user_id).await
    }

    async fn assign_node(&self, user_id: UserId, node_id: NodeId) -> Result<(), BackupError> {
        SqliteUserRepository::assign_node(self, user_id, node_id).await
    }

    async fn assign_site(&self, user_id: UserId, site_id: SiteId) -> Result<(), BackupError> {
        SqliteUserRepository::assign_site(self, user_id, site_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;

    fn sample_user(role: Role) -> User {
        User {
            id: UserId::new(),
            email: "admin@example.com".into(),
            password_hash: "hash".into(),
            role,
            mfa_secret: None,
            mfa_enabled: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_find_by_email_round_trips() {
        let pool = initialize_database(":memory:").await.unwrap();
        let repo = SqliteUserRepository::new(pool);
        let user = sample_user(Role::SiteAdmin);
        repo.insert(&user).await.unwrap();

        let found = repo.find_by_email("admin@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.role, Role::SiteAdmin);
    }

    #[tokio::test]
    async fn assignments_are_scoped_per_user() {
        let pool = initialize_database(":memory:").await.unwrap();
        let repo = SqliteUserRepository::new(pool);
        let admin = sample_user(Role::SiteAdmin);
        repo.insert(&admin).await.unwrap();

        let node_id = NodeId::new();
        // user_node_assignments references nodes(id); nothing enforces this
        // at the SQLite layer without foreign_keys = ON, so the test can
        // assign a node id without first inserting a node row.
        repo.assign_node(admin.id, node_id).await.unwrap();

        let assigned = repo.assigned_node_ids(admin.id).await.unwrap();
        assert!(assigned.contains(&node_id));
        assert!(repo.assigned_site_ids(admin.id).await.unwrap().is_empty());
    }
}
