//! Per-bucket, multi-state backing storage for fields.
//!
//! Each field owns one buffer per (state, bucket) it is defined on, sized
//! `capacity × components`. Buffers are allocated when buckets are rebuilt,
//! initialized from the field's restriction init values, and migrated (value
//! copy) for entities that survive a repartition. State rotation swaps whole
//! buffer vectors and never copies values.

use log::trace;

use crate::field::buffer::{FieldBuffer, FieldDataType};
use crate::mesh::bucket::{Bucket, BucketId, BUCKET_CAPACITY};
use crate::mesh::entity::Entity;
use crate::meta::meta_data::MetaData;
use crate::topology::rank::EntityRank;

/// Storage for one field on one bucket (one temporal state).
#[derive(Clone, Debug)]
pub(crate) struct BucketData {
    pub(crate) components: usize,
    /// Occupied entity slots (the bucket's size at the last rebuild).
    pub(crate) size: usize,
    pub(crate) buffer: FieldBuffer,
}

/// All states of one field: `states[s][bucket_id]`, `None` where the field is
/// not defined on that bucket.
#[derive(Clone, Debug, Default)]
pub(crate) struct FieldInstance {
    pub(crate) states: Vec<Vec<Option<BucketData>>>,
}

/// Backing storage for every declared field, owned by the bulk store.
#[derive(Clone, Debug, Default)]
pub(crate) struct FieldStorage {
    instances: Vec<FieldInstance>,
}

impl FieldStorage {
    /// Empty storage shaped after the committed schema.
    pub(crate) fn new(meta: &MetaData) -> Self {
        let instances = meta
            .fields()
            .map(|f| FieldInstance {
                states: vec![Vec::new(); f.num_states()],
            })
            .collect();
        Self { instances }
    }

    #[inline]
    pub(crate) fn instance(&self, field: usize) -> &FieldInstance {
        &self.instances[field]
    }

    #[inline]
    pub(crate) fn instance_mut(&mut self, field: usize) -> &mut FieldInstance {
        &mut self.instances[field]
    }

    /// Storage for `field` at rotated slot `state` on `bucket`.
    pub(crate) fn bucket_data(
        &self,
        field: usize,
        state: usize,
        bucket: BucketId,
    ) -> Option<&BucketData> {
        self.instances[field].states[state]
            .get(bucket)
            .and_then(|d| d.as_ref())
    }

    /// Reallocate and migrate storage for every field of `rank` after that
    /// rank's buckets were rebuilt.
    ///
    /// `old_placement` maps an entity to its (bucket, ordinal) before the
    /// rebuild; surviving entities keep their values, entities newly covered
    /// by a restriction receive its init value (or zero).
    pub(crate) fn rebuild_rank<F>(
        &mut self,
        meta: &MetaData,
        rank: EntityRank,
        buckets: &[Bucket],
        old_placement: F,
    ) where
        F: Fn(Entity) -> Option<(BucketId, u32)>,
    {
        for field in meta.fields() {
            if field.rank() != rank {
                continue;
            }
            let instance = &mut self.instances[field.id().index()];
            let old_states = std::mem::replace(
                &mut instance.states,
                vec![Vec::new(); field.num_states()],
            );
            for (state, old_buckets) in old_states.into_iter().enumerate() {
                let mut new_buckets: Vec<Option<BucketData>> =
                    Vec::with_capacity(buckets.len());
                for bucket in buckets {
                    let Some(components) = field.components_for(bucket.parts()) else {
                        new_buckets.push(None);
                        continue;
                    };
                    let mut data = allocate_bucket_data(
                        field.data_type(),
                        components,
                        bucket,
                        field
                            .init_for(bucket.parts())
                            .and_then(|r| r.init_value().map(|v| (v, r.components()))),
                    );
                    for (ordinal, &entity) in bucket.entities().iter().enumerate() {
                        let Some((old_bucket, old_ordinal)) = old_placement(entity) else {
                            continue;
                        };
                        let Some(Some(old)) = old_buckets.get(old_bucket) else {
                            continue;
                        };
                        let n = old.components.min(components);
                        data.buffer.copy_from(
                            ordinal * components,
                            &old.buffer,
                            old_ordinal as usize * old.components,
                            n,
                        );
                    }
                    new_buckets.push(Some(data));
                }
                instance.states[state] = new_buckets;
            }
            trace!(
                "field `{}`: storage rebuilt over {} bucket(s) at rank {rank}",
                field.name(),
                buckets.len()
            );
        }
    }

    /// Rotate every multi-state field: the slot that was current becomes
    /// previous, the oldest slot is reused as the new current. O(states)
    /// buffer-vector swaps, no value copies.
    pub(crate) fn advance_states(&mut self) {
        for instance in &mut self.instances {
            if instance.states.len() > 1 {
                instance.states.rotate_right(1);
            }
        }
    }
}

fn allocate_bucket_data(
    data_type: FieldDataType,
    components: usize,
    bucket: &Bucket,
    init: Option<(&FieldBuffer, usize)>,
) -> BucketData {
    let mut buffer = FieldBuffer::with_len(data_type, BUCKET_CAPACITY * components);
    if let Some((init_value, init_components)) = init {
        let n = init_components.min(components);
        for slot in 0..BUCKET_CAPACITY {
            buffer.copy_from(slot * components, init_value, 0, n);
        }
    }
    BucketData {
        components,
        size: bucket.size(),
        buffer,
    }
}
