//! mesh-bulk: schema-driven storage for unstructured-mesh entities,
//! relations, and field data.
//!
//! The crate separates a frozen schema ([`MetaData`]: parts, fields,
//! restrictions) from the live store ([`BulkData`]: entities, relations,
//! buckets, field buffers). All structural mutation happens inside an
//! explicit modification cycle; between cycles every entity sits in exactly
//! one homogeneous [`Bucket`] per rank, field storage is contiguous per
//! bucket, and [`Selector`] expressions resolve per bucket rather than per
//! entity.
//!
//! Parallel context is an explicit [`Communicator`] value. `NoComm` gives a
//! serial store; the same code paths run collectives (identifier assignment,
//! cycle-counter checks) against whatever communicator is supplied.
//!
//! ```
//! use mesh_bulk::prelude::*;
//!
//! let mut meta = MetaData::new(3);
//! let block = meta.declare_part_with_topology("block_1", CellTopology::Hex8)?;
//! let pressure = meta.declare_field::<f64>("pressure", EntityRank::Node, 1)?;
//! let universal = meta.universal_part();
//! meta.put_field_on_part::<f64>(pressure, universal, 1, Some(&[20.0]))?;
//! meta.commit();
//!
//! let mut bulk = BulkData::new(meta, NoComm)?;
//! bulk.modification_begin()?;
//! let node = bulk.declare_entity(EntityRank::Node)?;
//! bulk.modification_end()?;
//!
//! let field = bulk.field::<f64>(pressure)?;
//! assert_eq!(field.entity_values(node)?, &[20.0]);
//! # let _ = block;
//! # Ok::<(), mesh_bulk::MeshBulkError>(())
//! ```

pub mod comm;
pub mod debug_invariants;
pub mod field;
pub mod mesh;
pub mod mesh_error;
pub mod meta;
pub mod selector;
pub mod topology;

pub use comm::{Communicator, LocalComm, NoComm};
pub use mesh::{BulkData, Bucket, BucketId, Entity, EntityId, BUCKET_CAPACITY};
pub use mesh_error::MeshBulkError;
pub use meta::{FieldId, FieldState, MetaData, Part, PartId};
pub use selector::Selector;
pub use topology::{CellTopology, EntityRank};

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::comm::{Communicator, NoComm};
    pub use crate::field::{FieldMut, FieldRef};
    pub use crate::mesh::{generate_box, BulkData, Bucket, Entity, EntityId};
    pub use crate::mesh_error::MeshBulkError;
    pub use crate::meta::{FieldId, FieldState, MetaData, PartId};
    pub use crate::selector::Selector;
    pub use crate::topology::{CellTopology, EntityRank};
}
