// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete `ObjectStore` adapters (§4.6): one backed by `aws-sdk-s3` for
//! any S3-compatible endpoint, one backed by the local filesystem for
//! `ProviderType::Local` and for tests that would otherwise need a bucket.

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;
