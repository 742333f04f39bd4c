//! Buckets: homogeneous contiguous runs of same-rank entities.
//!
//! A bucket is characterized by its signature (rank, sorted effective part
//! set, topology-or-none). Every live entity of a rank belongs to exactly one
//! bucket of that rank, no two buckets of a rank share a signature unless the
//! first is full, and the bucket is the unit of field storage and selector
//! evaluation.

use crate::meta::meta_data::MetaData;
use crate::meta::part::PartId;
use crate::mesh::entity::Entity;
use crate::topology::cell_topology::CellTopology;
use crate::topology::rank::EntityRank;

/// Per-rank bucket ordinal, stable between modification cycles.
pub type BucketId = usize;

/// Capacity of a bucket; a full bucket spawns a sibling with the same
/// signature.
pub const BUCKET_CAPACITY: usize = 512;

/// The homogeneity key of a bucket.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketSignature {
    pub(crate) rank: EntityRank,
    /// Sorted effective part membership (explicit + induced + supersets).
    pub(crate) parts: Vec<PartId>,
    pub(crate) topology: Option<CellTopology>,
}

/// A contiguous run of entities sharing one signature.
#[derive(Clone, Debug)]
pub struct Bucket {
    pub(crate) id: BucketId,
    pub(crate) signature: BucketSignature,
    pub(crate) entities: Vec<Entity>,
    pub(crate) owned: bool,
    pub(crate) shared: bool,
}

impl Bucket {
    pub(crate) fn new(id: BucketId, signature: BucketSignature, meta: &MetaData) -> Self {
        let owned = signature.parts.contains(&meta.locally_owned_part());
        let shared = signature.parts.contains(&meta.globally_shared_part());
        Self {
            id,
            signature,
            entities: Vec::new(),
            owned,
            shared,
        }
    }

    /// Per-rank ordinal of this bucket.
    #[inline]
    pub fn bucket_id(&self) -> BucketId {
        self.id
    }

    /// Rank of every entity in the bucket.
    #[inline]
    pub fn entity_rank(&self) -> EntityRank {
        self.signature.rank
    }

    /// Topology shared by every entity, if any.
    #[inline]
    pub fn topology(&self) -> Option<CellTopology> {
        self.signature.topology
    }

    /// Number of entities currently stored.
    #[inline]
    pub fn size(&self) -> usize {
        self.entities.len()
    }

    /// Maximum number of entities this bucket may hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        BUCKET_CAPACITY
    }

    /// Entities in bucket order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Sorted effective part membership shared by every entity.
    #[inline]
    pub fn parts(&self) -> &[PartId] {
        &self.signature.parts
    }

    /// Whether every entity in the bucket is a member of `part`.
    #[inline]
    pub fn is_member(&self, part: PartId) -> bool {
        self.signature.parts.binary_search(&part).is_ok()
    }

    /// Whether the bucket's entities are owned by the local rank.
    #[inline]
    pub fn owned(&self) -> bool {
        self.owned
    }

    /// Whether the bucket's entities are shared with other ranks.
    #[inline]
    pub fn shared(&self) -> bool {
        self.shared
    }

    /// Whether the bucket holds aura (ghost) copies: present locally but
    /// neither owned nor shared.
    #[inline]
    pub fn in_aura(&self) -> bool {
        !self.owned && !self.shared
    }

    #[inline]
    pub(crate) fn has_space(&self) -> bool {
        self.entities.len() < BUCKET_CAPACITY
    }

    /// Append an entity, returning its ordinal within the bucket.
    pub(crate) fn push(&mut self, entity: Entity) -> u32 {
        debug_assert!(self.has_space());
        debug_assert_eq!(entity.rank(), self.signature.rank);
        self.entities.push(entity);
        (self.entities.len() - 1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(parts: Vec<PartId>) -> BucketSignature {
        BucketSignature {
            rank: EntityRank::Node,
            parts,
            topology: None,
        }
    }

    #[test]
    fn membership_is_signature_membership() {
        let meta = MetaData::new(3);
        let sig = signature(vec![meta.universal_part(), meta.locally_owned_part()]);
        let bucket = Bucket::new(0, sig, &meta);
        assert!(bucket.is_member(meta.universal_part()));
        assert!(!bucket.is_member(meta.globally_shared_part()));
        assert!(bucket.owned());
        assert!(!bucket.shared());
        assert!(!bucket.in_aura());
    }

    #[test]
    fn aura_bucket_is_neither_owned_nor_shared() {
        let meta = MetaData::new(3);
        let bucket = Bucket::new(0, signature(vec![meta.universal_part()]), &meta);
        assert!(bucket.in_aura());
    }

    #[test]
    fn push_returns_ordinals() {
        let meta = MetaData::new(3);
        let mut bucket = Bucket::new(0, signature(vec![meta.universal_part()]), &meta);
        let e0 = Entity {
            rank: EntityRank::Node,
            index: 10,
        };
        let e1 = Entity {
            rank: EntityRank::Node,
            index: 11,
        };
        assert_eq!(bucket.push(e0), 0);
        assert_eq!(bucket.push(e1), 1);
        assert_eq!(bucket.entities(), &[e0, e1]);
        assert_eq!(bucket.size(), 2);
        assert_eq!(bucket.capacity(), BUCKET_CAPACITY);
    }
}
