// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Opaque Identifier Value Object
//!
//! Every entity that appears in an externally visible path (URLs, object-store
//! keys) is identified by a 128-bit UUID rather than a ULID or a surrogate
//! integer, so enumeration of the population is not possible from the id
//! alone. `OpaqueId<Marker>` is a phantom-typed newtype over `uuid::Uuid`:
//! `NodeId` and `SiteId` are distinct types at compile time even though both
//! wrap the same representation, so a handler cannot accidentally pass a
//! `SiteId` where a `NodeId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BackupError;

/// Marks a phantom-typed category for [`OpaqueId`].
pub trait IdCategory {
    fn category_name() -> &'static str;
}

/// A 128-bit opaque identifier, tagged at compile time with its entity
/// category so ids of different entities cannot be confused.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpaqueId<C> {
    inner: Uuid,
    #[serde(skip)]
    _marker: PhantomData<C>,
}

impl<C> OpaqueId<C> {
    /// Generates a fresh random (v4) id. Random, not time-ordered: nothing
    /// about when an entity was created should be recoverable from its id.
    pub fn new() -> Self {
        Self {
            inner: Uuid::new_v4(),
            _marker: PhantomData,
        }
    }

    pub fn as_uuid(&self) -> Uuid {
        self.inner
    }
}

impl<C> OpaqueId<C>
where
    C: IdCategory,
{
    pub fn parse(s: &str) -> Result<Self, BackupError> {
        let inner = Uuid::parse_str(s)
            .map_err(|e| BackupError::validation(format!("invalid {} id '{}': {}", C::category_name(), s, e)))?;
        Ok(Self {
            inner,
            _marker: PhantomData,
        })
    }
}

impl<C> From<Uuid> for OpaqueId<C> {
    fn from(inner: Uuid) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<C> Default for OpaqueId<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for OpaqueId<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C> Copy for OpaqueId<C> {}

impl<C> PartialEq for OpaqueId<C> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}
impl<C> Eq for OpaqueId<C> {}

impl<C> std::hash::Hash for OpaqueId<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.hash(state)
    }
}

impl<C> fmt::Debug for OpaqueId<C>
where
    C: IdCategory,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", C::category_name(), self.inner)
    }
}

impl<C> fmt::Display for OpaqueId<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl<C> FromStr for OpaqueId<C>
where
    C: IdCategory,
{
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Declares a concrete opaque id type for one entity category.
macro_rules! opaque_id {
    ($name:ident, $category:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(crate::value_objects::opaque_id::OpaqueId<$name>);

        impl crate::value_objects::opaque_id::IdCategory for $name {
            fn category_name() -> &'static str {
                $category
            }
        }

        impl $name {
            pub fn new() -> Self {
                Self(crate::value_objects::opaque_id::OpaqueId::new())
            }

            pub fn parse(s: &str) -> Result<Self, crate::error::BackupError> {
                crate::value_objects::opaque_id::OpaqueId::parse(s).map(Self)
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0.as_uuid()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(u: uuid::Uuid) -> Self {
                Self(crate::value_objects::opaque_id::OpaqueId::from(u))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(&self.0, f)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::BackupError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

pub(crate) use opaque_id;

#[cfg(test)]
mod tests {
    use super::*;

    opaque_id!(TestId, "test");

    #[test]
    fn round_trips_through_string() {
        let id = TestId::new();
        let parsed = TestId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_garbage() {
        assert!(TestId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn two_ids_are_distinct() {
        assert_ne!(TestId::new(), TestId::new());
    }
}
