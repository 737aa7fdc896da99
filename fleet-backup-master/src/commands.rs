// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Backing store for the Node command queue (§9 open-question-1). Not a
//! domain entity: `pending_commands` is purely an implementation detail of
//! how Master hands a Node an instruction it cannot deliver by calling back
//! (the Node may be behind NAT, so it polls instead). A row is consumed the
//! moment a Node polls for it - there is no acknowledgement step, matching
//! the Node's own `poll_commands` which just drains whatever comes back.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::{NodeId, SiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Start,
    Stop,
}

#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub site_id: SiteId,
    pub action: CommandAction,
}

fn action_str(action: CommandAction) -> &'static str {
    match action {
        CommandAction::Start => "start",
        CommandAction::Stop => "stop",
    }
}

fn parse_action(value: &str) -> Result<CommandAction, BackupError> {
    match value {
        "start" => Ok(CommandAction::Start),
        "stop" => Ok(CommandAction::Stop),
        other => Err(BackupError::integrity(format!("unknown pending command action '{other}' in database"))),
    }
}

pub async fn enqueue_command(pool: &SqlitePool, node_id: NodeId, site_id: SiteId, action: CommandAction) -> Result<(), BackupError> {
    sqlx::query("INSERT INTO pending_commands (node_id, site_id, action, created_at) VALUES (?, ?, ?, ?)")
        .bind(node_id.to_string())
        .bind(site_id.to_string())
        .bind(action_str(action))
        .bind(Utc::now())
        .execute(pool)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Drains every command queued for `node_id`, oldest first, deleting each
/// row as part of the same transaction that reads it.
pub async fn poll_commands(pool: &SqlitePool, node_id: NodeId) -> Result<Vec<PendingCommand>, BackupError> {
    let mut tx = pool.begin().await.map_err(db_err)?;
    let rows = sqlx::query("SELECT id, site_id, action FROM pending_commands WHERE node_id = ? ORDER BY created_at")
        .bind(node_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

    let mut commands = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.try_get("id").map_err(db_err)?;
        let site_id: String = row.try_get("site_id").map_err(db_err)?;
        let action: String = row.try_get("action").map_err(db_err)?;
        commands.push(PendingCommand { site_id: SiteId::parse(&site_id)?, action: parse_action(&action)? });
        sqlx::query("DELETE FROM pending_commands WHERE id = ?").bind(id).execute(&mut *tx).await.map_err(db_err)?;
    }

    tx.commit().await.map_err(db_err)?;
    Ok(commands)
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("command queue: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;

    #[tokio::test]
    async fn enqueue_then_poll_drains_in_order() {
        let pool = initialize_database(":memory:").await.unwrap();
        let node_id = NodeId::new();
        let site_a = SiteId::new();
        let site_b = SiteId::new();

        enqueue_command(&pool, node_id, site_a, CommandAction::Start).await.unwrap();
        enqueue_command(&pool, node_id, site_b, CommandAction::Stop).await.unwrap();

        let commands = poll_commands(&pool, node_id).await.unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].site_id, site_a);
        assert_eq!(commands[0].action, CommandAction::Start);
        assert_eq!(commands[1].action, CommandAction::Stop);
    }

    #[tokio::test]
    async fn polling_consumes_the_queue() {
        let pool = initialize_database(":memory:").await.unwrap();
        let node_id = NodeId::new();
        enqueue_command(&pool, node_id, SiteId::new(), CommandAction::Start).await.unwrap();

        assert_eq!(poll_commands(&pool, node_id).await.unwrap().len(), 1);
        assert!(poll_commands(&pool, node_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commands_for_other_nodes_are_not_returned() {
        let pool = initialize_database(":memory:").await.unwrap();
        let node_a = NodeId::new();
        let node_b = NodeId::new();
        enqueue_command(&pool, node_a, SiteId::new(), CommandAction::Start).await.unwrap();

        assert!(poll_commands(&pool, node_b).await.unwrap().is_empty());
        assert_eq!(poll_commands(&pool, node_a).await.unwrap().len(), 1);
    }
}
