// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite adapters for every `fleet_backup_domain::repositories` port.

pub mod activity_log_repository;
pub mod backup_repository;
pub mod node_repository;
pub mod progress_repository;
pub mod site_repository;
pub mod storage_provider_repository;
pub mod user_repository;

pub use activity_log_repository::SqliteActivityLogRepository;
pub use backup_repository::SqliteBackupRepository;
pub use node_repository::SqliteNodeRepository;
pub use progress_repository::SqliteProgressRepository;
pub use site_repository::SqliteSiteRepository;
pub use storage_provider_repository::SqliteStorageProviderRepository;
pub use user_repository::{SqliteUserRepository, User, UserRepository};
