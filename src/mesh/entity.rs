//! Entity keys and global identifiers.
//!
//! An [`Entity`] is the process-local key for a mesh object: its rank plus a
//! local index that is stable only within a modification cycle. The global
//! [`EntityId`] wraps a nonzero `u64` so 0 stays reserved as an invalid or
//! sentinel value; it is unique within a rank across the distributed mesh.

use std::{fmt, num::NonZeroU64};

use crate::mesh_error::MeshBulkError;
use crate::topology::rank::EntityRank;

/// Globally-unique identifier of an entity within its rank.
///
/// # Memory layout
/// `repr(transparent)` over `NonZeroU64`: same ABI and alignment as a `u64`,
/// and `Option<EntityId>` is pointer-width thanks to the niche.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct EntityId(NonZeroU64);

impl EntityId {
    /// Creates an `EntityId` from a raw `u64`.
    ///
    /// # Errors
    /// Returns [`MeshBulkError::InvalidEntityId`] if `raw == 0`.
    #[inline]
    pub fn new(raw: u64) -> Result<Self, MeshBulkError> {
        NonZeroU64::new(raw)
            .map(EntityId)
            .ok_or(MeshBulkError::InvalidEntityId)
    }

    /// Returns the inner `u64` value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityId").field(&self.get()).finish()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Process-local entity key: (rank, local index).
///
/// The local index is only meaningful against the bulk store that issued it
/// and only until the next modification cycle destroys the entity.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    pub(crate) rank: EntityRank,
    pub(crate) index: u32,
}

impl Entity {
    /// Rank of this entity.
    #[inline]
    pub fn rank(self) -> EntityRank {
        self.rank
    }

    /// Local index within the rank's entity table.
    #[inline]
    pub fn local_index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.rank, self.index)
    }
}
