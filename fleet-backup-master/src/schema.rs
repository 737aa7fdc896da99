// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Database bootstrap: create-if-missing plus embedded migrations, mirroring
//! the node-local pattern the teacher crate uses for its own SQLite store.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    use sqlx::Sqlite;
    use sqlx::migrate::MigrateDatabase;

    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

/// Normalizes `database_path` into a `sqlite://` URL, creates the database
/// file if missing, connects, and runs every pending migration.
pub async fn initialize_database(database_path: &str) -> Result<SqlitePool, sqlx::Error> {
    let database_url = if database_path == ":memory:" || database_path.starts_with("sqlite::memory:") {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite://{database_path}")
    };

    if database_url != "sqlite::memory:" {
        create_database_if_missing(&database_url).await?;
    }

    let pool = SqlitePoolOptions::new().max_connections(8).connect(&database_url).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_gets_full_schema() {
        let pool = initialize_database(":memory:").await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&pool)
            .await
            .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        for expected in [
            "nodes", "sites", "backups", "storage_providers", "progress_rows", "activity_log",
            "pending_commands", "users", "user_node_assignments", "user_site_assignments",
        ] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }
}
