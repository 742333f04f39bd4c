//! Static topology metadata: entity ranks and the cell shape catalog.

pub mod cell_topology;
pub mod rank;

pub use cell_topology::CellTopology;
pub use rank::EntityRank;
