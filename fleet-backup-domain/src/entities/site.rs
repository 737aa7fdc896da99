// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Site entity (§3) - one WordPress installation on a Node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ByteSize, NodeId, Schedule, SiteId};

/// Explicit database credentials, when not sourced from `wp-config.php`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub node_id: NodeId,
    pub name: String,
    pub wp_config_path: String,
    pub wp_content_path: String,
    pub db_credentials: Option<DbCredentials>,
    pub storage_quota_bytes: ByteSize,
    pub storage_used_bytes: ByteSize,
    pub quota_exceeded_at: Option<DateTime<Utc>>,
    pub schedule: Schedule,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_backup_size_bytes: Option<ByteSize>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    /// Marks `quota_exceeded_at` when usage crosses the site's own quota;
    /// clears it when usage falls back under (§4.5 post-flight step 4,
    /// specialized to the site level).
    pub fn refresh_quota_flag(&mut self, now: DateTime<Utc>) {
        if self.storage_used_bytes > self.storage_quota_bytes {
            if self.quota_exceeded_at.is_none() {
                self.quota_exceeded_at = Some(now);
            }
        } else {
            self.quota_exceeded_at = None;
        }
    }

    /// §3 invariant: recorded usage must equal the sum of non-deleted
    /// SUCCESS backups - callers recompute this from the Backup table and
    /// call `set_storage_used`, never mutating the field directly elsewhere.
    pub fn set_storage_used(&mut self, used: ByteSize, now: DateTime<Utc>) {
        self.storage_used_bytes = used;
        self.refresh_quota_flag(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Schedule;

    fn site_with_usage(used: u64, quota: u64) -> Site {
        Site {
            id: SiteId::new(),
            node_id: NodeId::new(),
            name: "example".into(),
            wp_config_path: "/var/www/example/wp-config.php".into(),
            wp_content_path: "/var/www/example/wp-content".into(),
            db_credentials: None,
            storage_quota_bytes: ByteSize::from_bytes(quota),
            storage_used_bytes: ByteSize::from_bytes(used),
            quota_exceeded_at: None,
            schedule: Schedule::default(),
            next_run_at: None,
            last_backup_size_bytes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn crossing_quota_sets_timestamp() {
        let mut site = site_with_usage(5, 20);
        site.set_storage_used(ByteSize::from_bytes(25), Utc::now());
        assert!(site.quota_exceeded_at.is_some());
    }

    #[test]
    fn falling_back_under_clears_timestamp() {
        let mut site = site_with_usage(25, 20);
        site.quota_exceeded_at = Some(Utc::now());
        site.set_storage_used(ByteSize::from_bytes(5), Utc::now());
        assert!(site.quota_exceeded_at.is_none());
    }
}
