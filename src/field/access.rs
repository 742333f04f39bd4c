//! Typed views into field storage.
//!
//! A [`FieldRef`]/[`FieldMut`] is a short-lived handle addressing one field
//! at one temporal state. Entity views and bucket views alias the same
//! backing buffer: a write through one is immediately visible through the
//! other.

use std::marker::PhantomData;

use crate::field::buffer::FieldValue;
use crate::field::storage::BucketData;
use crate::mesh::bucket::BucketId;
use crate::mesh::bulk::EntityRecord;
use crate::mesh::entity::Entity;
use crate::mesh_error::MeshBulkError;
use crate::topology::rank::EntityRank;

fn locate(
    name: &str,
    rank: EntityRank,
    records: &[EntityRecord],
    entity: Entity,
) -> Result<(BucketId, usize), MeshBulkError> {
    if entity.rank() != rank {
        return Err(MeshBulkError::FieldRankMismatch {
            field: name.to_string(),
            declared: rank,
            found: entity.rank(),
        });
    }
    let record = records
        .get(entity.local_index())
        .filter(|r| r.alive)
        .ok_or(MeshBulkError::EntityNotAlive(entity))?;
    let (bucket, ordinal) = record
        .placement
        .ok_or(MeshBulkError::EntityNotPlaced(entity))?;
    Ok((bucket, ordinal as usize))
}

fn bucket_slab<'a, T: FieldValue>(
    name: &str,
    buckets: &'a [Option<BucketData>],
    bucket: BucketId,
) -> Result<(&'a BucketData, &'a [T]), MeshBulkError> {
    let data = buckets
        .get(bucket)
        .and_then(|d| d.as_ref())
        .ok_or_else(|| MeshBulkError::FieldNotOnBucket(name.to_string(), bucket))?;
    let slab = T::as_slice(&data.buffer).ok_or_else(|| MeshBulkError::FieldTypeMismatch {
        field: name.to_string(),
        declared: data.buffer.data_type(),
        requested: T::DATA_TYPE,
    })?;
    Ok((data, slab))
}

/// Read-only handle to one field at one temporal state.
pub struct FieldRef<'a, T: FieldValue> {
    pub(crate) name: &'a str,
    pub(crate) rank: EntityRank,
    pub(crate) buckets: &'a [Option<BucketData>],
    pub(crate) records: &'a [EntityRecord],
    pub(crate) _marker: PhantomData<T>,
}

impl<'a, T: FieldValue> FieldRef<'a, T> {
    /// Field name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Components per entity on `bucket`, `None` if the field has no storage
    /// there.
    pub fn components(&self, bucket: BucketId) -> Option<usize> {
        self.buckets
            .get(bucket)
            .and_then(|d| d.as_ref())
            .map(|d| d.components)
    }

    /// Fixed-length view of the entity's values.
    pub fn entity_values(&self, entity: Entity) -> Result<&'a [T], MeshBulkError> {
        let (bucket, ordinal) = locate(self.name, self.rank, self.records, entity)?;
        let (data, slab) = bucket_slab::<T>(self.name, self.buckets, bucket)?;
        let start = ordinal * data.components;
        Ok(&slab[start..start + data.components])
    }

    /// Contiguous slab of the whole bucket, entity-major and
    /// component-minor: `size × components` values.
    pub fn bucket_values(&self, bucket: BucketId) -> Result<&'a [T], MeshBulkError> {
        let (data, slab) = bucket_slab::<T>(self.name, self.buckets, bucket)?;
        Ok(&slab[..data.size * data.components])
    }
}

/// Mutable handle to one field at one temporal state.
pub struct FieldMut<'a, T: FieldValue> {
    pub(crate) name: &'a str,
    pub(crate) rank: EntityRank,
    pub(crate) buckets: &'a mut [Option<BucketData>],
    pub(crate) records: &'a [EntityRecord],
    pub(crate) _marker: PhantomData<T>,
}

impl<'a, T: FieldValue> FieldMut<'a, T> {
    /// Field name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Components per entity on `bucket`, `None` if the field has no storage
    /// there.
    pub fn components(&self, bucket: BucketId) -> Option<usize> {
        self.buckets
            .get(bucket)
            .and_then(|d| d.as_ref())
            .map(|d| d.components)
    }

    fn slab_mut(&mut self, bucket: BucketId) -> Result<(usize, usize, &mut [T]), MeshBulkError> {
        let data = self
            .buckets
            .get_mut(bucket)
            .and_then(|d| d.as_mut())
            .ok_or_else(|| MeshBulkError::FieldNotOnBucket(self.name.to_string(), bucket))?;
        let components = data.components;
        let size = data.size;
        let declared = data.buffer.data_type();
        let slab =
            T::as_mut_slice(&mut data.buffer).ok_or_else(|| MeshBulkError::FieldTypeMismatch {
                field: self.name.to_string(),
                declared,
                requested: T::DATA_TYPE,
            })?;
        Ok((components, size, slab))
    }

    /// Read-only view of the entity's values.
    pub fn entity_values(&mut self, entity: Entity) -> Result<&[T], MeshBulkError> {
        let values = self.entity_values_mut(entity)?;
        Ok(&*values)
    }

    /// Mutable fixed-length view of the entity's values.
    pub fn entity_values_mut(&mut self, entity: Entity) -> Result<&mut [T], MeshBulkError> {
        let (bucket, ordinal) = locate(self.name, self.rank, self.records, entity)?;
        let (components, _, slab) = self.slab_mut(bucket)?;
        let start = ordinal * components;
        Ok(&mut slab[start..start + components])
    }

    /// Mutable contiguous slab of the whole bucket (`size × components`
    /// values, entity-major). Mutations here are visible through
    /// [`entity_values_mut`](Self::entity_values_mut) and vice versa: both
    /// views alias the same storage.
    pub fn bucket_values_mut(&mut self, bucket: BucketId) -> Result<&mut [T], MeshBulkError> {
        let (components, size, slab) = self.slab_mut(bucket)?;
        Ok(&mut slab[..size * components])
    }
}
