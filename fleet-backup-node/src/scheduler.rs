// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Scheduler (§4.7): a coarse 1-minute tick that enqueues any configured
//! site whose `next_run_at` has passed. `next_run_at` is tracked in memory,
//! keyed by site id - the Node is the sole authority on its own sites'
//! schedules, computed fresh from each `Schedule` on every tick.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_backup_domain::value_objects::{ByteSize, SiteId};

use crate::settings::SiteConfig;
use crate::worker::{BackupJob, JobQueue};

const TICK: Duration = Duration::from_secs(60);

/// Used as the pre-flight size estimate when the Node has no record of a
/// prior successful backup for the site (§4.5: "1 GB if unknown").
const DEFAULT_ESTIMATE: ByteSize = ByteSize::gib(1);

pub struct Scheduler {
    sites: Vec<SiteConfig>,
    next_run_at: HashMap<SiteId, DateTime<Utc>>,
    queue: JobQueue,
}

impl Scheduler {
    pub fn new(sites: Vec<SiteConfig>, queue: JobQueue) -> Self {
        Self {
            sites,
            next_run_at: HashMap::new(),
            queue,
        }
    }

    pub async fn run(mut self, shutdown: fleet_backup_bootstrap::CancellationToken) {
        let mut interval = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(Utc::now()),
                _ = shutdown.cancelled() => {
                    tracing::info!("scheduler stopping");
                    return;
                }
            }
        }
    }

    fn tick(&mut self, now: DateTime<Utc>) {
        for site in self.sites.clone() {
            let site_id = match SiteId::parse(&site.site_id) {
                Ok(id) => id,
                Err(err) => {
                    tracing::error!(site = %site.name, error = %err, "invalid site id in local configuration");
                    continue;
                }
            };

            let due_at = match self.next_run_at.get(&site_id) {
                Some(&at) => at,
                None => {
                    // First tick that has seen this site: seed its next
                    // run time without enqueuing immediately.
                    self.advance(&site, site_id, now);
                    continue;
                }
            };
            if due_at > now {
                continue;
            }

            tracing::info!(site = %site.name, "enqueuing scheduled backup");
            self.queue.submit(BackupJob {
                site_id,
                site_name: site.name.clone(),
                wp_config_path: site.wp_config_path.clone(),
                wp_content_path: site.wp_content_path.clone(),
                db_credentials: site.db_credentials.clone(),
                estimated_bytes: DEFAULT_ESTIMATE.bytes(),
            });

            self.advance(&site, site_id, now);
        }
    }

    /// Recomputes and stores `next_run_at` for `site`. A `Manual` schedule
    /// computes to `None`; such sites are simply re-checked every tick
    /// forever, since the operator may switch them to an automatic
    /// schedule at any time.
    fn advance(&mut self, site: &SiteConfig, site_id: SiteId, now: DateTime<Utc>) {
        match site.schedule.next_run_after(now) {
            Ok(Some(next)) => {
                self.next_run_at.insert(site_id, next);
            }
            Ok(None) => {
                self.next_run_at.remove(&site_id);
            }
            Err(err) => {
                tracing::error!(site = %site.name, error = %err, "failed to compute next run time");
            }
        }
    }
}
