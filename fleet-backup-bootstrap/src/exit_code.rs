// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Maps a top-level `BackupError` to a Unix `sysexits.h`-style process exit
//! code, so operators and systemd unit `Restart=` policies can distinguish
//! "retry me" from "fix my config and redeploy".

use fleet_backup_domain::error::{BackupError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Ok = 0,
    /// Generic failure, no more specific code applies.
    Failure = 1,
    /// EX_CONFIG - invalid configuration.
    Config = 78,
    /// EX_TEMPFAIL - transient failure, safe to retry.
    Transient = 75,
    /// EX_SOFTWARE - internal invariant violated.
    Integrity = 70,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

pub fn error_to_exit_code(err: &BackupError) -> ExitCode {
    match err.kind() {
        ErrorKind::Config => ExitCode::Config,
        ErrorKind::Transient => ExitCode::Transient,
        ErrorKind::Integrity | ErrorKind::Fatal => ExitCode::Integrity,
        ErrorKind::QuotaExceeded
        | ErrorKind::Conflict
        | ErrorKind::Cancelled
        | ErrorKind::Other => ExitCode::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_ex_config() {
        assert_eq!(error_to_exit_code(&BackupError::config("bad yaml")), ExitCode::Config);
    }

    #[test]
    fn transient_errors_are_distinguishable_from_fatal() {
        assert_eq!(error_to_exit_code(&BackupError::transient("timeout")), ExitCode::Transient);
        assert_eq!(error_to_exit_code(&BackupError::fatal("disk full")), ExitCode::Integrity);
    }
}
