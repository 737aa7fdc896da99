// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Site backup schedule (§4.7) and its `next_run_at` projection.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::BackupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Manual,
    Daily,
    Weekly,
    Monthly,
}

/// A schedule as declared on a `Site`. `day_mask` is the CSV bitfield from
/// the API (§4.7): for `Weekly`, bit 0 = Monday .. bit 6 = Sunday; for
/// `Monthly`, bit 0 = day 1 .. bit 30 = day 31.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    pub local_time: NaiveTime,
    pub day_mask: u32,
    pub retention_copies: u32,
    pub timezone: Tz,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            frequency: Frequency::Manual,
            local_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            day_mask: 0,
            retention_copies: 3,
            timezone: chrono_tz::Africa::Harare,
        }
    }
}

impl Schedule {
    /// Computes the next run instant strictly after `after`, in UTC.
    /// Returns `None` for `Manual` schedules - they are never auto-enqueued.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, BackupError> {
        if self.frequency == Frequency::Manual {
            return Ok(None);
        }

        let local_after = after.with_timezone(&self.timezone);
        let mut candidate_date = local_after.date_naive();

        // Try today first if the time-of-day hasn't passed yet, then walk
        // forward day by day until the day mask (or, for Daily, every day)
        // matches. A year is a generous upper bound that still catches a
        // malformed all-zero monthly mask without looping forever.
        for _ in 0..370 {
            let candidate_local = candidate_date.and_time(self.local_time);
            let candidate_utc = self
                .timezone
                .from_local_datetime(&candidate_local)
                .single()
                .map(|dt| dt.with_timezone(&Utc));

            if let Some(candidate_utc) = candidate_utc {
                if candidate_utc > after && self.day_matches(candidate_date) {
                    return Ok(Some(candidate_utc));
                }
            }
            candidate_date = candidate_date.succ_opt().ok_or_else(|| BackupError::internal("date overflow"))?;
        }

        Err(BackupError::config("schedule day_mask never matches any day"))
    }

    fn day_matches(&self, date: chrono::NaiveDate) -> bool {
        match self.frequency {
            Frequency::Manual => false,
            Frequency::Daily => true,
            Frequency::Weekly => {
                let bit = date.weekday().num_days_from_monday();
                self.day_mask & (1 << bit) != 0
            }
            Frequency::Monthly => {
                let bit = date.day0();
                self.day_mask & (1 << bit) != 0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_schedule_never_runs() {
        let schedule = Schedule {
            frequency: Frequency::Manual,
            ..Schedule::default()
        };
        assert_eq!(schedule.next_run_after(Utc::now()).unwrap(), None);
    }

    #[test]
    fn daily_schedule_advances_one_day_at_a_time() {
        let schedule = Schedule {
            frequency: Frequency::Daily,
            local_time: NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
            ..Schedule::default()
        };
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = schedule.next_run_after(after).unwrap().unwrap();
        assert!(next > after);
    }

    #[test]
    fn weekly_schedule_respects_day_mask() {
        // Monday only (bit 0).
        let schedule = Schedule {
            frequency: Frequency::Weekly,
            day_mask: 0b0000001,
            local_time: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            ..Schedule::default()
        };
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(); // Thursday
        let next = schedule.next_run_after(after).unwrap().unwrap();
        let local = next.with_timezone(&schedule.timezone);
        assert_eq!(local.weekday(), chrono::Weekday::Mon);
    }
}
