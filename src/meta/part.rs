//! Parts: named, ranked groupings of mesh entities.
//!
//! Parts live in a dense arena owned by [`MetaData`](crate::meta::MetaData)
//! and are referenced everywhere by [`PartId`] ordinal, which keeps the
//! subset/superset DAG free of ownership cycles.

use serde::{Deserialize, Serialize};

use crate::topology::cell_topology::CellTopology;
use crate::topology::rank::EntityRank;

/// Dense ordinal of a part within its schema.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct PartId(pub(crate) u32);

impl PartId {
    /// Index into the schema's part arena.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "part#{}", self.0)
    }
}

/// A named grouping of entities, optionally ranked and optionally carrying a
/// cell topology.
///
/// A part with `rank == None` is rank-invariant: it may hold entities of any
/// rank and is never induced downward (the built-in parts are of this kind).
#[derive(Clone, Debug)]
pub struct Part {
    pub(crate) id: PartId,
    pub(crate) name: String,
    pub(crate) rank: Option<EntityRank>,
    pub(crate) topology: Option<CellTopology>,
    pub(crate) subsets: Vec<PartId>,
    pub(crate) supersets: Vec<PartId>,
}

impl Part {
    /// Ordinal of this part.
    #[inline]
    pub fn id(&self) -> PartId {
        self.id
    }

    /// Unique name within the schema.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary rank, or `None` for a rank-invariant part.
    #[inline]
    pub fn rank(&self) -> Option<EntityRank> {
        self.rank
    }

    /// Cell topology carried by this part, if any. Immutable once set.
    #[inline]
    pub fn topology(&self) -> Option<CellTopology> {
        self.topology
    }

    /// Direct subset parts.
    #[inline]
    pub fn subsets(&self) -> &[PartId] {
        &self.subsets
    }

    /// Direct superset parts.
    #[inline]
    pub fn supersets(&self) -> &[PartId] {
        &self.supersets
    }
}
