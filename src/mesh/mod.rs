//! The bulk store: entities, relations, buckets, and generated meshes.

pub mod bucket;
pub mod bulk;
pub mod entity;
pub mod generated;

pub use bucket::{Bucket, BucketId, BUCKET_CAPACITY};
pub use bulk::BulkData;
pub use entity::{Entity, EntityId};
pub use generated::{generate_box, BoxMeshHandles, COORDINATES_FIELD_NAME};
