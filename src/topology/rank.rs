//! `EntityRank`: the topological dimension class of a mesh entity.
//!
//! Ranks order as `Node < Edge < Face < Element`, the usual ordering for 3-D
//! meshes. Each rank has a dense index so per-rank tables can be plain arrays.

use serde::{Deserialize, Serialize};

/// Rank of a mesh entity.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum EntityRank {
    /// 0-D vertex.
    Node = 0,
    /// 1-D edge.
    Edge = 1,
    /// 2-D face/side.
    Face = 2,
    /// Highest-rank cell.
    Element = 3,
}

impl EntityRank {
    /// All ranks in ascending order.
    pub const ALL: [EntityRank; 4] = [
        EntityRank::Node,
        EntityRank::Edge,
        EntityRank::Face,
        EntityRank::Element,
    ];

    /// Number of ranks.
    pub const COUNT: usize = 4;

    /// Dense index of this rank, suitable for per-rank array tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Rank for a dense index, if in range.
    #[inline]
    pub const fn from_index(idx: usize) -> Option<EntityRank> {
        match idx {
            0 => Some(EntityRank::Node),
            1 => Some(EntityRank::Edge),
            2 => Some(EntityRank::Face),
            3 => Some(EntityRank::Element),
            _ => None,
        }
    }

    /// The side rank for a mesh of the given spatial dimension: the rank one
    /// below the element rank (`Node` for 1-D, `Edge` for 2-D, `Face` for 3-D).
    #[inline]
    pub const fn side_rank(spatial_dimension: usize) -> EntityRank {
        match spatial_dimension {
            0 | 1 => EntityRank::Node,
            2 => EntityRank::Edge,
            _ => EntityRank::Face,
        }
    }
}

impl std::fmt::Display for EntityRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityRank::Node => "NODE",
            EntityRank::Edge => "EDGE",
            EntityRank::Face => "FACE",
            EntityRank::Element => "ELEMENT",
        };
        write!(f, "{name}")
    }
}
