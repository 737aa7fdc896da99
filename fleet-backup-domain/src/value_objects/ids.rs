// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete opaque id types, one per entity category in §3.

use super::opaque_id::opaque_id;

opaque_id!(NodeId, "node");
opaque_id!(SiteId, "site");
opaque_id!(BackupId, "backup");
opaque_id!(StorageProviderId, "storage_provider");
opaque_id!(JobId, "job");
opaque_id!(UserId, "user");
