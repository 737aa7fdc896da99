// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Repository Ports
//!
//! The domain depends on these traits, never on a concrete storage
//! technology. `fleet-backup-master` provides the only implementation
//! (SQLite via `sqlx`) today, but nothing in this crate or its tests knows
//! that - an in-memory implementation backs the unit tests for services
//! that depend on a repository, and a second backend could be dropped in
//! without touching a single entity or service.
//!
//! ## Implementation guidelines
//!
//! Implementations should:
//! - map every storage failure to `BackupError::Database` or
//!   `BackupError::Io`, never let a `sqlx::Error` or similar escape this
//!   boundary;
//! - treat "no row" as `Ok(None)` from finder methods, reserving
//!   `BackupError::NotFound` for callers that need it (mutating a row that
//!   should exist, for instance);
//! - keep writes that must be atomic (approving a node, applying a progress
//!   update) inside a single transaction rather than relying on the caller
//!   to serialize calls.

pub mod activity_log_repository;
pub mod backup_repository;
pub mod node_repository;
pub mod progress_repository;
pub mod site_repository;
pub mod storage_provider_repository;

pub use activity_log_repository::ActivityLogRepository;
pub use backup_repository::BackupRepository;
pub use node_repository::NodeRepository;
pub use progress_repository::ProgressRepository;
pub use site_repository::SiteRepository;
pub use storage_provider_repository::StorageProviderRepository;
