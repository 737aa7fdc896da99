// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Authentication and authorization (§4.4 node auth, §6.1 wire auth, §6.2
//! RBAC): node API keys for the Node-facing surface, bearer JWTs for the
//! operator-facing surface, and the RBAC filter both surfaces route through.

pub mod api_key;
pub mod jwt;
pub mod password;
pub mod rbac;

pub use jwt::{Claims, Role, Scope, TokenIssuer};
pub use rbac::Assignments;
