//! Cell topology catalog: node counts and sub-entity connectivity patterns.
//!
//! Each shape carries static tables describing which node ordinals form each
//! edge and face. The tables follow the Exodus-II conventions, so an element
//! populated from these patterns matches what mesh readers/writers expect.

use serde::{Deserialize, Serialize};

use crate::topology::rank::EntityRank;

/// Closed catalog of supported cell shapes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CellTopology {
    /// Single node.
    Node,
    /// 2-node line segment.
    Line2,
    /// 3-node triangle.
    Tri3,
    /// 4-node quadrilateral.
    Quad4,
    /// 4-node tetrahedron.
    Tet4,
    /// 8-node hexahedron.
    Hex8,
}

/// Hex8 edge patterns, Exodus ordering.
const HEX8_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Hex8 face patterns (outward-normal Quad4 loops), Exodus ordering.
const HEX8_FACES: [[usize; 4]; 6] = [
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [0, 4, 7, 3],
    [0, 3, 2, 1],
    [4, 5, 6, 7],
];

const TET4_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];

const TET4_FACES: [[usize; 3]; 4] = [[0, 1, 3], [1, 2, 3], [0, 3, 2], [0, 2, 1]];

const QUAD4_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];

const TRI3_EDGES: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];

impl CellTopology {
    /// Rank of entities carrying this shape.
    pub const fn rank(self) -> EntityRank {
        match self {
            CellTopology::Node => EntityRank::Node,
            CellTopology::Line2 => EntityRank::Edge,
            CellTopology::Tri3 | CellTopology::Quad4 => EntityRank::Face,
            CellTopology::Tet4 | CellTopology::Hex8 => EntityRank::Element,
        }
    }

    /// Number of nodes in the shape's connectivity pattern.
    pub const fn num_nodes(self) -> usize {
        match self {
            CellTopology::Node => 1,
            CellTopology::Line2 => 2,
            CellTopology::Tri3 => 3,
            CellTopology::Quad4 | CellTopology::Tet4 => 4,
            CellTopology::Hex8 => 8,
        }
    }

    /// Number of edge sub-entities.
    pub const fn num_edges(self) -> usize {
        match self {
            CellTopology::Node | CellTopology::Line2 => 0,
            CellTopology::Tri3 => 3,
            CellTopology::Quad4 => 4,
            CellTopology::Tet4 => 6,
            CellTopology::Hex8 => 12,
        }
    }

    /// Number of face sub-entities.
    pub const fn num_faces(self) -> usize {
        match self {
            CellTopology::Tet4 => 4,
            CellTopology::Hex8 => 6,
            _ => 0,
        }
    }

    /// Shape of every edge sub-entity (all supported shapes use `Line2`).
    pub const fn edge_topology(self) -> CellTopology {
        CellTopology::Line2
    }

    /// Shape of face sub-entity `face`.
    ///
    /// # Panics
    /// Panics if `face >= num_faces()`.
    pub fn face_topology(self, face: usize) -> CellTopology {
        assert!(face < self.num_faces(), "face ordinal out of range");
        match self {
            CellTopology::Tet4 => CellTopology::Tri3,
            CellTopology::Hex8 => CellTopology::Quad4,
            _ => unreachable!("shapes without faces have num_faces() == 0"),
        }
    }

    /// Node ordinals forming edge sub-entity `edge`.
    ///
    /// # Panics
    /// Panics if `edge >= num_edges()`.
    pub fn edge_node_ordinals(self, edge: usize) -> &'static [usize] {
        assert!(edge < self.num_edges(), "edge ordinal out of range");
        match self {
            CellTopology::Tri3 => &TRI3_EDGES[edge],
            CellTopology::Quad4 => &QUAD4_EDGES[edge],
            CellTopology::Tet4 => &TET4_EDGES[edge],
            CellTopology::Hex8 => &HEX8_EDGES[edge],
            _ => unreachable!("shapes without edges have num_edges() == 0"),
        }
    }

    /// Node ordinals forming face sub-entity `face`.
    ///
    /// # Panics
    /// Panics if `face >= num_faces()`.
    pub fn face_node_ordinals(self, face: usize) -> &'static [usize] {
        assert!(face < self.num_faces(), "face ordinal out of range");
        match self {
            CellTopology::Tet4 => &TET4_FACES[face],
            CellTopology::Hex8 => &HEX8_FACES[face],
            _ => unreachable!("shapes without faces have num_faces() == 0"),
        }
    }
}
