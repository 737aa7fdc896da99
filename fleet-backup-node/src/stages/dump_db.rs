// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `dump_db` (§4.1): dumps the site's database to `temp/database.sql` in
//! add-drop-table, single-transaction mode. Credentials come from the site
//! record or, failing that, are parsed out of `wp-config.php`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use fleet_backup_domain::entities::DbCredentials;
use fleet_backup_engine::{Context, Stage, StageResult};

pub struct DumpDbStage {
    timeout: Duration,
}

impl DumpDbStage {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Pulls `DB_NAME`/`DB_USER`/`DB_PASSWORD`/`DB_HOST` out of a `wp-config.php`
/// by scanning for `define('KEY', 'VALUE');` lines. No regex dependency:
/// WordPress always emits these as simple single-statement defines, and a
/// hand-rolled scan is the cheaper dependency to carry.
fn parse_wp_config(contents: &str) -> Option<DbCredentials> {
    let field = |key: &str| -> Option<String> {
        let needle = format!("'{key}'");
        let start = contents.find(&needle)? + needle.len();
        let rest = &contents[start..];
        let quote_start = rest.find(['\'', '"'])?;
        let quote_char = rest.as_bytes()[quote_start] as char;
        let value_start = quote_start + 1;
        let value_end = rest[value_start..].find(quote_char)? + value_start;
        Some(rest[value_start..value_end].to_string())
    };

    let database = field("DB_NAME")?;
    let username = field("DB_USER")?;
    let password = field("DB_PASSWORD").unwrap_or_default();
    let host_field = field("DB_HOST").unwrap_or_else(|| "localhost".to_string());
    let (host, port) = match host_field.split_once(':') {
        Some((h, p)) => (h.to_string(), p.parse().unwrap_or(3306)),
        None => (host_field, 3306),
    };

    Some(DbCredentials {
        host,
        port,
        database,
        username,
        password,
    })
}

async fn resolve_credentials(ctx: &Context) -> Result<DbCredentials, fleet_backup_domain::error::BackupError> {
    if let Some(creds) = &ctx.db_credentials {
        return Ok(creds.clone());
    }
    let contents = tokio::fs::read_to_string(&ctx.wp_config_path)
        .await
        .map_err(|err| fleet_backup_domain::error::BackupError::config(format!("cannot read wp-config.php: {err}")))?;
    parse_wp_config(&contents)
        .ok_or_else(|| fleet_backup_domain::error::BackupError::config("could not locate DB credentials in wp-config.php"))
}

#[async_trait]
impl Stage for DumpDbStage {
    fn name(&self) -> &'static str {
        "dump_db"
    }

    async fn run(&self, ctx: &mut Context) -> StageResult {
        let start = std::time::Instant::now();

        if ctx.is_cancelled() {
            return StageResult::stopped(start.elapsed());
        }

        let creds = match resolve_credentials(ctx).await {
            Ok(creds) => creds,
            Err(err) => return StageResult::failed(err.to_string(), start.elapsed()).with_detail("phase", "resolve_credentials"),
        };

        let permit = match ctx.resource_governor().acquire_io(&ctx.cancellation).await {
            Ok(permit) => permit,
            Err(err) => return StageResult::failed(err.to_string(), start.elapsed()),
        };

        let dest = ctx.temp_dir.join("database.sql");
        let child = match Command::new("mysqldump")
            .arg("--add-drop-table")
            .arg("--single-transaction")
            .arg(format!("--host={}", creds.host))
            .arg(format!("--port={}", creds.port))
            .arg(format!("--user={}", creds.username))
            .arg(format!("--password={}", creds.password))
            .arg(&creds.database)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                drop(permit);
                return StageResult::failed(format!("failed to spawn mysqldump: {err}"), start.elapsed());
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => {
                drop(permit);
                return StageResult::failed(
                    fleet_backup_domain::error::BackupError::transient(format!("mysqldump timed out after {:?}", self.timeout)).to_string(),
                    start.elapsed(),
                );
            }
        };
        drop(permit);

        let output = match output {
            Ok(output) => output,
            Err(err) => return StageResult::failed(format!("failed to run mysqldump: {err}"), start.elapsed()),
        };

        if !output.status.success() {
            return StageResult::failed(
                format!("mysqldump exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr)),
                start.elapsed(),
            );
        }

        if let Err(err) = tokio::fs::write(&dest, &output.stdout).await {
            return StageResult::failed(format!("failed to write database.sql: {err}"), start.elapsed());
        }

        ctx.db_path_hint = Some(dest);
        if let Err(err) = ctx.report_progress(self.name(), 1.0, output.stdout.len() as u64, output.stdout.len() as u64, true).await {
            tracing::warn!(error = %err, "failed to report dump_db progress");
        }

        StageResult::ok("database dumped", start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_wp_config() {
        let php = r#"
            define('DB_NAME', 'wordpress');
            define('DB_USER', 'wp_user');
            define('DB_PASSWORD', 'secret');
            define('DB_HOST', 'db.internal:3307');
        "#;
        let creds = parse_wp_config(php).unwrap();
        assert_eq!(creds.database, "wordpress");
        assert_eq!(creds.username, "wp_user");
        assert_eq!(creds.password, "secret");
        assert_eq!(creds.host, "db.internal");
        assert_eq!(creds.port, 3307);
    }

    #[test]
    fn missing_db_name_fails_to_resolve() {
        assert!(parse_wp_config("define('DB_USER', 'wp_user');").is_none());
    }
}
