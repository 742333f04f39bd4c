//! MetaData: the mesh schema.
//!
//! Owns the part and field arenas, the spatial dimension, and the built-in
//! parts, and enforces the commit protocol: declarations are idempotent until
//! [`commit`](MetaData::commit), frozen afterwards.

use hashbrown::HashMap;
use log::debug;

use crate::debug_invariants::DebugInvariants;
use crate::field::buffer::{FieldBuffer, FieldValue};
use crate::mesh_error::MeshBulkError;
use crate::meta::field::{FieldId, FieldMeta, FieldRestriction, MAX_FIELD_STATES};
use crate::meta::part::{Part, PartId};
use crate::topology::cell_topology::CellTopology;
use crate::topology::rank::EntityRank;

/// Name of the built-in part containing every entity.
pub const UNIVERSAL_PART_NAME: &str = "{UNIVERSAL}";
/// Name of the built-in part containing locally-owned entities.
pub const LOCALLY_OWNED_PART_NAME: &str = "{OWNS}";
/// Name of the built-in part containing globally-shared entities.
pub const GLOBALLY_SHARED_PART_NAME: &str = "{SHARES}";

/// The mesh schema: declared parts and fields, spatial dimension, and the
/// commit state.
#[derive(Clone, Debug)]
pub struct MetaData {
    spatial_dimension: usize,
    parts: Vec<Part>,
    part_index: HashMap<String, PartId>,
    fields: Vec<FieldMeta>,
    field_index: HashMap<String, FieldId>,
    committed: bool,
}

impl MetaData {
    /// Fresh schema for a mesh of the given spatial dimension, with the
    /// built-in parts already declared.
    pub fn new(spatial_dimension: usize) -> Self {
        let mut meta = Self {
            spatial_dimension,
            parts: Vec::new(),
            part_index: HashMap::new(),
            fields: Vec::new(),
            field_index: HashMap::new(),
            committed: false,
        };
        for name in [
            UNIVERSAL_PART_NAME,
            LOCALLY_OWNED_PART_NAME,
            GLOBALLY_SHARED_PART_NAME,
        ] {
            meta.push_part(name.to_string(), None, None);
        }
        meta
    }

    /// Spatial dimension declared at construction.
    #[inline]
    pub fn spatial_dimension(&self) -> usize {
        self.spatial_dimension
    }

    /// Rank one below the element rank for this spatial dimension.
    #[inline]
    pub fn side_rank(&self) -> EntityRank {
        EntityRank::side_rank(self.spatial_dimension)
    }

    /// Whether [`commit`](Self::commit) has run.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// The built-in part containing every entity.
    #[inline]
    pub fn universal_part(&self) -> PartId {
        PartId(0)
    }

    /// The built-in part containing entities owned by the local rank.
    #[inline]
    pub fn locally_owned_part(&self) -> PartId {
        PartId(1)
    }

    /// The built-in part containing entities shared with other ranks.
    #[inline]
    pub fn globally_shared_part(&self) -> PartId {
        PartId(2)
    }

    /// Whether `part` is one of the three built-ins.
    #[inline]
    pub fn is_builtin_part(&self, part: PartId) -> bool {
        part.index() < 3
    }

    fn push_part(
        &mut self,
        name: String,
        rank: Option<EntityRank>,
        topology: Option<CellTopology>,
    ) -> PartId {
        let id = PartId(self.parts.len() as u32);
        self.part_index.insert(name.clone(), id);
        self.parts.push(Part {
            id,
            name,
            rank,
            topology,
            subsets: Vec::new(),
            supersets: Vec::new(),
        });
        id
    }

    /// Declare a part with the given primary rank (or `None` for a
    /// rank-invariant grouping).
    ///
    /// Idempotent: redeclaring with the same name and rank returns the
    /// existing part.
    ///
    /// # Errors
    /// - [`MeshBulkError::SchemaCommitted`] after commit, unless the part
    ///   already exists with a matching rank.
    /// - [`MeshBulkError::PartRankConflict`] on a rank mismatch.
    pub fn declare_part(
        &mut self,
        name: &str,
        rank: Option<EntityRank>,
    ) -> Result<PartId, MeshBulkError> {
        if let Some(&id) = self.part_index.get(name) {
            let existing = self.parts[id.index()].rank;
            if existing != rank {
                return Err(MeshBulkError::PartRankConflict {
                    name: name.to_string(),
                    existing,
                    requested: rank,
                });
            }
            return Ok(id);
        }
        if self.committed {
            return Err(MeshBulkError::SchemaCommitted);
        }
        Ok(self.push_part(name.to_string(), rank, None))
    }

    /// Declare a part carrying a cell topology; the primary rank is derived
    /// from the topology. Redeclaring with the same topology is idempotent;
    /// a conflicting topology is a schema conflict.
    pub fn declare_part_with_topology(
        &mut self,
        name: &str,
        topology: CellTopology,
    ) -> Result<PartId, MeshBulkError> {
        let id = self.declare_part(name, Some(topology.rank()))?;
        let part = &mut self.parts[id.index()];
        match part.topology {
            None => {
                if self.committed {
                    return Err(MeshBulkError::SchemaCommitted);
                }
                part.topology = Some(topology);
                Ok(id)
            }
            Some(existing) if existing == topology => Ok(id),
            Some(existing) => Err(MeshBulkError::PartTopologyConflict {
                name: name.to_string(),
                existing,
                requested: topology,
            }),
        }
    }

    /// Record `subset` as a subset of `superset`. Membership in the subset
    /// implies membership in the superset (the bulk store expands this when
    /// entity parts change). The hierarchy is a DAG; a cycle is rejected.
    pub fn declare_subset(
        &mut self,
        superset: PartId,
        subset: PartId,
    ) -> Result<(), MeshBulkError> {
        if self.committed {
            return Err(MeshBulkError::SchemaCommitted);
        }
        if superset == subset || self.reaches_downward(subset, superset) {
            return Err(MeshBulkError::CyclicPartHierarchy {
                superset: self.parts[superset.index()].name.clone(),
                subset: self.parts[subset.index()].name.clone(),
            });
        }
        if !self.parts[superset.index()].subsets.contains(&subset) {
            self.parts[superset.index()].subsets.push(subset);
            self.parts[subset.index()].supersets.push(superset);
        }
        Ok(())
    }

    /// Whether `to` is reachable from `from` through subset edges.
    fn reaches_downward(&self, from: PartId, to: PartId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.parts.len()];
        while let Some(p) = stack.pop() {
            if p == to {
                return true;
            }
            if std::mem::replace(&mut seen[p.index()], true) {
                continue;
            }
            stack.extend_from_slice(&self.parts[p.index()].subsets);
        }
        false
    }

    /// All supersets of `part`, transitively (excluding `part` itself).
    pub fn supersets_transitive(&self, part: PartId) -> Vec<PartId> {
        let mut out = Vec::new();
        let mut seen = vec![false; self.parts.len()];
        let mut stack: Vec<PartId> = self.parts[part.index()].supersets.clone();
        while let Some(p) = stack.pop() {
            if std::mem::replace(&mut seen[p.index()], true) {
                continue;
            }
            out.push(p);
            stack.extend_from_slice(&self.parts[p.index()].supersets);
        }
        out.sort_unstable();
        out
    }

    /// Look up a part by name. Missing names return `None`; use
    /// [`expect_part`](Self::expect_part) for must-exist semantics.
    #[inline]
    pub fn get_part(&self, name: &str) -> Option<PartId> {
        self.part_index.get(name).copied()
    }

    /// Look up a part by name, failing if it does not exist.
    pub fn expect_part(&self, name: &str) -> Result<PartId, MeshBulkError> {
        self.get_part(name)
            .ok_or_else(|| MeshBulkError::PartNotFound(name.to_string()))
    }

    /// The part for a given ordinal.
    ///
    /// # Panics
    /// Panics if `id` does not come from this schema.
    #[inline]
    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id.index()]
    }

    /// All declared parts in ordinal order.
    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter()
    }

    /// Number of declared parts.
    #[inline]
    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    /// Declare a field of value type `T` on entities of `rank` with
    /// `num_states` temporal states (1 = stateless).
    ///
    /// Idempotent by name when type, rank, and state count all match.
    ///
    /// # Errors
    /// - [`MeshBulkError::StateCountOutOfRange`] if `num_states` is not in
    ///   `1..=`[`MAX_FIELD_STATES`].
    /// - [`MeshBulkError::SchemaCommitted`] after commit (for new names).
    /// - [`MeshBulkError::FieldDeclarationConflict`] on any mismatch.
    pub fn declare_field<T: FieldValue>(
        &mut self,
        name: &str,
        rank: EntityRank,
        num_states: usize,
    ) -> Result<FieldId, MeshBulkError> {
        if !(1..=MAX_FIELD_STATES).contains(&num_states) {
            return Err(MeshBulkError::StateCountOutOfRange {
                field: name.to_string(),
                requested: num_states,
                max: MAX_FIELD_STATES,
            });
        }
        if let Some(&id) = self.field_index.get(name) {
            let existing = &self.fields[id.index()];
            if existing.data_type != T::DATA_TYPE
                || existing.rank != rank
                || existing.num_states != num_states
            {
                let requested = format!("{} on {rank}, {num_states} state(s)", T::DATA_TYPE);
                return Err(MeshBulkError::FieldDeclarationConflict {
                    name: name.to_string(),
                    existing: existing.signature(),
                    requested,
                });
            }
            return Ok(id);
        }
        if self.committed {
            return Err(MeshBulkError::SchemaCommitted);
        }
        let id = FieldId(self.fields.len() as u32);
        self.field_index.insert(name.to_string(), id);
        self.fields.push(FieldMeta {
            id,
            name: name.to_string(),
            rank,
            data_type: T::DATA_TYPE,
            num_states,
            restrictions: Vec::new(),
        });
        Ok(id)
    }

    /// Register `field` on `part` with `components` values per entity and an
    /// optional initial value (one entry per component).
    ///
    /// # Errors
    /// - [`MeshBulkError::SchemaCommitted`] after commit.
    /// - [`MeshBulkError::FieldTypeMismatch`] if `T` is not the declared type.
    /// - [`MeshBulkError::ZeroComponentRestriction`] /
    ///   [`MeshBulkError::InitValueLengthMismatch`] on malformed layout.
    pub fn put_field_on_part<T: FieldValue>(
        &mut self,
        field: FieldId,
        part: PartId,
        components: usize,
        init_value: Option<&[T]>,
    ) -> Result<(), MeshBulkError> {
        if self.committed {
            return Err(MeshBulkError::SchemaCommitted);
        }
        let meta = &self.fields[field.index()];
        if meta.data_type != T::DATA_TYPE {
            return Err(MeshBulkError::FieldTypeMismatch {
                field: meta.name.clone(),
                declared: meta.data_type,
                requested: T::DATA_TYPE,
            });
        }
        if components == 0 {
            return Err(MeshBulkError::ZeroComponentRestriction(meta.name.clone()));
        }
        if let Some(init) = init_value {
            if init.len() != components {
                return Err(MeshBulkError::InitValueLengthMismatch {
                    field: meta.name.clone(),
                    expected: components,
                    found: init.len(),
                });
            }
        }
        let init: Option<FieldBuffer> = init_value.map(|v| T::into_buffer(v.to_vec()));
        let meta = &mut self.fields[field.index()];
        // re-registering on the same part replaces the restriction
        meta.restrictions.retain(|r| r.part != part);
        meta.restrictions.push(FieldRestriction {
            part,
            components,
            init_value: init,
        });
        Ok(())
    }

    /// Look up a field by name. Missing names return `None`.
    #[inline]
    pub fn get_field(&self, name: &str) -> Option<FieldId> {
        self.field_index.get(name).copied()
    }

    /// Look up a field by name, failing if it does not exist.
    pub fn expect_field(&self, name: &str) -> Result<FieldId, MeshBulkError> {
        self.get_field(name)
            .ok_or_else(|| MeshBulkError::FieldNotFound(name.to_string()))
    }

    /// The field for a given ordinal.
    ///
    /// # Panics
    /// Panics if `id` does not come from this schema.
    #[inline]
    pub fn field(&self, id: FieldId) -> &FieldMeta {
        &self.fields[id.index()]
    }

    /// All declared fields in ordinal order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter()
    }

    /// Number of declared fields.
    #[inline]
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    /// Freeze the part/field universe. Idempotent and irreversible.
    pub fn commit(&mut self) {
        if !self.committed {
            debug!(
                "committing schema: {} parts, {} fields, dim {}",
                self.parts.len(),
                self.fields.len(),
                self.spatial_dimension
            );
            self.committed = true;
        }
    }
}

impl DebugInvariants for MetaData {
    fn debug_assert_invariants(&self) {
        crate::bulk_debug_assert_ok!(self.validate_invariants(), "MetaData invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshBulkError> {
        // dense ordinals and a consistent name index
        for (idx, part) in self.parts.iter().enumerate() {
            debug_assert_eq!(part.id.index(), idx);
            debug_assert_eq!(self.part_index.get(&part.name), Some(&part.id));
        }
        // subset edges are symmetric and acyclic
        for part in &self.parts {
            for &sub in &part.subsets {
                debug_assert!(self.parts[sub.index()].supersets.contains(&part.id));
            }
            if part
                .subsets
                .iter()
                .any(|&s| self.reaches_downward(s, part.id))
            {
                return Err(MeshBulkError::CyclicPartHierarchy {
                    superset: part.name.clone(),
                    subset: part.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_parts_exist() {
        let meta = MetaData::new(3);
        assert_eq!(meta.part(meta.universal_part()).name(), UNIVERSAL_PART_NAME);
        assert_eq!(
            meta.part(meta.locally_owned_part()).name(),
            LOCALLY_OWNED_PART_NAME
        );
        assert_eq!(
            meta.part(meta.globally_shared_part()).name(),
            GLOBALLY_SHARED_PART_NAME
        );
        assert_eq!(meta.num_parts(), 3);
        assert!(!meta.is_committed());
    }

    #[test]
    fn declare_part_idempotent() {
        let mut meta = MetaData::new(3);
        let a = meta
            .declare_part("block_1", Some(EntityRank::Element))
            .unwrap();
        let b = meta
            .declare_part("block_1", Some(EntityRank::Element))
            .unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            meta.declare_part("block_1", Some(EntityRank::Face)),
            Err(MeshBulkError::PartRankConflict { .. })
        ));
    }

    #[test]
    fn topology_immutable_once_set() {
        let mut meta = MetaData::new(3);
        let p = meta
            .declare_part_with_topology("block_1", CellTopology::Hex8)
            .unwrap();
        assert_eq!(meta.part(p).topology(), Some(CellTopology::Hex8));
        assert_eq!(
            meta.declare_part_with_topology("block_1", CellTopology::Hex8)
                .unwrap(),
            p
        );
        assert!(matches!(
            meta.declare_part_with_topology("block_1", CellTopology::Tet4),
            Err(MeshBulkError::PartRankConflict { .. })
        ));
    }

    #[test]
    fn subset_cycle_rejected() {
        let mut meta = MetaData::new(3);
        let a = meta.declare_part("a", Some(EntityRank::Face)).unwrap();
        let b = meta.declare_part("b", Some(EntityRank::Face)).unwrap();
        let c = meta.declare_part("c", Some(EntityRank::Face)).unwrap();
        meta.declare_subset(a, b).unwrap();
        meta.declare_subset(b, c).unwrap();
        assert!(matches!(
            meta.declare_subset(c, a),
            Err(MeshBulkError::CyclicPartHierarchy { .. })
        ));
        assert_eq!(meta.supersets_transitive(c), vec![a, b]);
        meta.debug_assert_invariants();
    }

    #[test]
    fn commit_freezes_declarations() {
        let mut meta = MetaData::new(3);
        meta.commit();
        meta.commit(); // idempotent
        assert!(meta.is_committed());
        assert!(matches!(
            meta.declare_part("late", Some(EntityRank::Node)),
            Err(MeshBulkError::SchemaCommitted)
        ));
        assert!(matches!(
            meta.declare_field::<f64>("late", EntityRank::Node, 1),
            Err(MeshBulkError::SchemaCommitted)
        ));
        // redeclaring an existing part is still idempotent after commit
        let u = meta.declare_part(UNIVERSAL_PART_NAME, None).unwrap();
        assert_eq!(u, meta.universal_part());
    }

    #[test]
    fn field_declaration_conflicts() {
        let mut meta = MetaData::new(3);
        let f = meta
            .declare_field::<f64>("pressure", EntityRank::Node, 1)
            .unwrap();
        assert_eq!(
            meta.declare_field::<f64>("pressure", EntityRank::Node, 1)
                .unwrap(),
            f
        );
        assert!(matches!(
            meta.declare_field::<i32>("pressure", EntityRank::Node, 1),
            Err(MeshBulkError::FieldDeclarationConflict { .. })
        ));
        assert!(matches!(
            meta.declare_field::<f64>("pressure", EntityRank::Node, 2),
            Err(MeshBulkError::FieldDeclarationConflict { .. })
        ));
    }

    #[test]
    fn restriction_validation() {
        let mut meta = MetaData::new(3);
        let f = meta
            .declare_field::<f64>("velocity", EntityRank::Node, 2)
            .unwrap();
        let universal = meta.universal_part();
        assert!(matches!(
            meta.put_field_on_part::<f64>(f, universal, 0, None),
            Err(MeshBulkError::ZeroComponentRestriction(_))
        ));
        assert!(matches!(
            meta.put_field_on_part::<f64>(f, universal, 3, Some(&[1.0])),
            Err(MeshBulkError::InitValueLengthMismatch { .. })
        ));
        meta.put_field_on_part::<f64>(f, universal, 3, Some(&[10.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(meta.field(f).components_for(&[universal]), Some(3));
    }

    #[test]
    fn get_part_sentinel_vs_must_exist() {
        let meta = MetaData::new(3);
        assert!(meta.get_part("terrain").is_none());
        assert!(matches!(
            meta.expect_part("terrain"),
            Err(MeshBulkError::PartNotFound(_))
        ));
    }
}
