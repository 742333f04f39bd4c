//! BulkData: the live entity set, the relation graph, and the bucket
//! partitioning.
//!
//! All mutation is serialized through the modification-cycle state machine:
//! `Unmodifiable -> modification_begin() -> Modifiable -> modification_end()
//! -> Unmodifiable`. Ending a cycle is the invariant-restoring step: global
//! identifiers are resolved collectively, ownership-derived membership is
//! recomputed, induced membership is propagated down the relation graph, and
//! buckets are repartitioned with field storage migrated along. No partial
//! bucket state is observable outside the cycle boundary.

use std::marker::PhantomData;

use hashbrown::HashMap;
use log::{debug, trace};

use crate::comm::{exchange_u64, Communicator, NoComm};
use crate::debug_invariants::DebugInvariants;
use crate::field::access::{FieldMut, FieldRef};
use crate::field::buffer::FieldValue;
use crate::field::storage::FieldStorage;
use crate::mesh::bucket::{Bucket, BucketId, BucketSignature};
use crate::mesh::entity::{Entity, EntityId};
use crate::mesh_error::MeshBulkError;
use crate::meta::field::{FieldId, FieldState};
use crate::meta::meta_data::MetaData;
use crate::meta::part::PartId;
use crate::selector::Selector;
use crate::topology::cell_topology::CellTopology;
use crate::topology::rank::EntityRank;

/// Collective tags used at cycle boundaries.
const TAG_CYCLE_COUNTER: u16 = 0xC0;
const TAG_MAX_ID_BASE: u16 = 0xA0; // + rank index
const TAG_PENDING_BASE: u16 = 0xB0; // + rank index

/// One directed connection of an entity: (target rank, ordinal, target).
///
/// Downward connections carry the topological ordinal (e.g. which local node
/// of an element); the upward back-connection mirrors the same ordinal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Connection {
    pub(crate) rank: EntityRank,
    pub(crate) ordinal: u32,
    pub(crate) target: Entity,
}

#[derive(Clone, Debug)]
pub(crate) struct EntityRecord {
    pub(crate) alive: bool,
    pub(crate) global_id: Option<EntityId>,
    pub(crate) owner: usize,
    pub(crate) sharing: Vec<usize>,
    /// Sorted explicit part membership (includes supersets of added parts).
    pub(crate) explicit_parts: Vec<PartId>,
    /// Sorted by (rank, ordinal, target); both directions.
    pub(crate) connections: Vec<Connection>,
    /// (bucket, ordinal in bucket) after the last rebuild.
    pub(crate) placement: Option<(BucketId, u32)>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MeshState {
    Unmodifiable,
    Modifiable,
}

/// The bulk store for one process's portion of the mesh.
///
/// Generic over the [`Communicator`] so the parallel context is an explicit
/// value, not ambient process state; `NoComm` gives the serial store.
pub struct BulkData<C: Communicator = NoComm> {
    meta: MetaData,
    comm: C,
    state: MeshState,
    cycle_count: u64,
    records: [Vec<EntityRecord>; EntityRank::COUNT],
    /// Per rank: global id -> local index.
    id_index: [HashMap<u64, u32>; EntityRank::COUNT],
    buckets: [Vec<Bucket>; EntityRank::COUNT],
    field_storage: FieldStorage,
    /// Ranks whose buckets must be repartitioned at cycle end.
    rank_dirty: [bool; EntityRank::COUNT],
}

impl<C: Communicator> BulkData<C> {
    /// Construct a bulk store over a committed schema.
    ///
    /// # Errors
    /// [`MeshBulkError::SchemaNotCommitted`] if `meta` was not committed.
    pub fn new(meta: MetaData, comm: C) -> Result<Self, MeshBulkError> {
        if !meta.is_committed() {
            return Err(MeshBulkError::SchemaNotCommitted);
        }
        let field_storage = FieldStorage::new(&meta);
        Ok(Self {
            meta,
            comm,
            state: MeshState::Unmodifiable,
            cycle_count: 0,
            records: Default::default(),
            id_index: Default::default(),
            buckets: Default::default(),
            field_storage,
            rank_dirty: [false; EntityRank::COUNT],
        })
    }

    /// The schema this store was built against.
    #[inline]
    pub fn meta(&self) -> &MetaData {
        &self.meta
    }

    /// Rank of the local process.
    #[inline]
    pub fn parallel_rank(&self) -> usize {
        self.comm.rank()
    }

    /// Number of processes in the communicator.
    #[inline]
    pub fn parallel_size(&self) -> usize {
        self.comm.size()
    }

    /// The communicator context; reconciliation layers use it for field
    /// synchronization over shared/ghost entities.
    #[inline]
    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// Whether a modification cycle is currently open.
    #[inline]
    pub fn in_modifiable_state(&self) -> bool {
        self.state == MeshState::Modifiable
    }

    /// Number of completed modification cycles.
    #[inline]
    pub fn synchronized_count(&self) -> u64 {
        self.cycle_count
    }

    // --- modification protocol ------------------------------------------

    /// Open a modification cycle.
    ///
    /// # Errors
    /// [`MeshBulkError::AlreadyModifiable`] if a cycle is already open.
    pub fn modification_begin(&mut self) -> Result<(), MeshBulkError> {
        if self.state == MeshState::Modifiable {
            return Err(MeshBulkError::AlreadyModifiable);
        }
        self.state = MeshState::Modifiable;
        debug!("modification cycle {} opened", self.cycle_count + 1);
        Ok(())
    }

    fn require_modifiable(&self) -> Result<(), MeshBulkError> {
        if self.state != MeshState::Modifiable {
            return Err(MeshBulkError::NotModifiable);
        }
        Ok(())
    }

    fn record(&self, entity: Entity) -> Result<&EntityRecord, MeshBulkError> {
        self.records[entity.rank.index()]
            .get(entity.local_index())
            .filter(|r| r.alive)
            .ok_or(MeshBulkError::EntityNotAlive(entity))
    }

    fn record_mut(&mut self, entity: Entity) -> Result<&mut EntityRecord, MeshBulkError> {
        self.records[entity.rank.index()]
            .get_mut(entity.local_index())
            .filter(|r| r.alive)
            .ok_or(MeshBulkError::EntityNotAlive(entity))
    }

    /// Mark `rank` and everything below it as needing a bucket rebuild
    /// (membership changes propagate downward through induction).
    fn mark_dirty_downward(&mut self, rank: EntityRank) {
        for r in EntityRank::ALL {
            if r <= rank {
                self.rank_dirty[r.index()] = true;
            }
        }
    }

    fn push_entity(
        &mut self,
        rank: EntityRank,
        global_id: Option<EntityId>,
    ) -> Result<Entity, MeshBulkError> {
        self.require_modifiable()?;
        let table = &mut self.records[rank.index()];
        let index = table.len() as u32;
        if let Some(id) = global_id {
            match self.id_index[rank.index()].entry(id.get()) {
                hashbrown::hash_map::Entry::Occupied(_) => {
                    return Err(MeshBulkError::DuplicateIdentifier(rank, id.get()));
                }
                hashbrown::hash_map::Entry::Vacant(v) => {
                    v.insert(index);
                }
            }
        }
        table.push(EntityRecord {
            alive: true,
            global_id,
            owner: self.comm.rank(),
            sharing: Vec::new(),
            explicit_parts: vec![self.meta.universal_part()],
            connections: Vec::new(),
            placement: None,
        });
        self.mark_dirty_downward(rank);
        Ok(Entity { rank, index })
    }

    /// Create an entity of `rank`; its global identifier is assigned
    /// collectively when the cycle ends.
    pub fn declare_entity(&mut self, rank: EntityRank) -> Result<Entity, MeshBulkError> {
        self.push_entity(rank, None)
    }

    /// Create an entity with a caller-assigned global identifier.
    ///
    /// # Errors
    /// [`MeshBulkError::DuplicateIdentifier`] if `id` is already in use at
    /// this rank on this process.
    pub fn declare_entity_with_id(
        &mut self,
        rank: EntityRank,
        id: EntityId,
    ) -> Result<Entity, MeshBulkError> {
        self.push_entity(rank, Some(id))
    }

    /// Destroy an entity. Destruction does not cascade: every relation must
    /// be severed first.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), MeshBulkError> {
        self.require_modifiable()?;
        let record = self.record(entity)?;
        if !record.connections.is_empty() {
            return Err(MeshBulkError::EntityHasRelations(
                entity,
                record.connections.len(),
            ));
        }
        let record = self.record_mut(entity)?;
        record.alive = false;
        record.placement = None;
        if let Some(id) = record.global_id.take() {
            self.id_index[entity.rank.index()].remove(&id.get());
        }
        self.mark_dirty_downward(entity.rank);
        Ok(())
    }

    /// Declare a directed relation from a higher-rank entity to a
    /// lower-rank entity at the given topological ordinal.
    pub fn declare_relation(
        &mut self,
        from: Entity,
        to: Entity,
        ordinal: u32,
    ) -> Result<(), MeshBulkError> {
        self.require_modifiable()?;
        self.record(from)?;
        self.record(to)?;
        if from.rank <= to.rank {
            return Err(MeshBulkError::InvalidRelationRanks {
                from: from.rank,
                to: to.rank,
            });
        }
        // the downward (target rank, ordinal) slot must be free
        let from_record = &self.records[from.rank.index()][from.local_index()];
        if from_record
            .connections
            .iter()
            .any(|c| c.rank == to.rank && c.ordinal == ordinal)
        {
            return Err(MeshBulkError::DuplicateRelation(from, to.rank, ordinal));
        }
        insert_connection(
            &mut self.records[from.rank.index()][from.local_index()].connections,
            Connection {
                rank: to.rank,
                ordinal,
                target: to,
            },
        );
        insert_connection(
            &mut self.records[to.rank.index()][to.local_index()].connections,
            Connection {
                rank: from.rank,
                ordinal,
                target: from,
            },
        );
        // a new downward path can change what `to` (and below) inherits
        self.mark_dirty_downward(to.rank);
        Ok(())
    }

    /// Sever the relation declared by `declare_relation`.
    pub fn destroy_relation(
        &mut self,
        from: Entity,
        to: Entity,
        ordinal: u32,
    ) -> Result<(), MeshBulkError> {
        self.require_modifiable()?;
        self.record(from)?;
        self.record(to)?;
        let down = Connection {
            rank: to.rank,
            ordinal,
            target: to,
        };
        let up = Connection {
            rank: from.rank,
            ordinal,
            target: from,
        };
        let from_conns = &mut self.records[from.rank.index()][from.local_index()].connections;
        let Ok(pos) = from_conns.binary_search(&down) else {
            return Err(MeshBulkError::RelationNotFound(from, to.rank, ordinal));
        };
        from_conns.remove(pos);
        let to_conns = &mut self.records[to.rank.index()][to.local_index()].connections;
        if let Ok(pos) = to_conns.binary_search(&up) {
            to_conns.remove(pos);
        }
        self.mark_dirty_downward(to.rank);
        Ok(())
    }

    /// Add and remove part membership for an entity. The add set is expanded
    /// with all transitive supersets; built-in parts cannot be removed.
    pub fn change_entity_parts(
        &mut self,
        entity: Entity,
        add: &[PartId],
        remove: &[PartId],
    ) -> Result<(), MeshBulkError> {
        self.require_modifiable()?;
        self.record(entity)?;
        for &part in remove {
            if self.meta.is_builtin_part(part) {
                return Err(MeshBulkError::BuiltinPartRemoval(
                    self.meta.part(part).name().to_string(),
                ));
            }
        }
        let mut expanded: Vec<PartId> = add.to_vec();
        for &part in add {
            expanded.extend(self.meta.supersets_transitive(part));
        }
        let record = &mut self.records[entity.rank.index()][entity.local_index()];
        record.explicit_parts.retain(|p| !remove.contains(p));
        record.explicit_parts.extend(expanded);
        record.explicit_parts.sort_unstable();
        record.explicit_parts.dedup();
        self.mark_dirty_downward(entity.rank);
        Ok(())
    }

    /// Assign the owning process of an entity. Built-in ownership parts are
    /// recomputed at cycle end.
    pub fn set_parallel_owner(
        &mut self,
        entity: Entity,
        owner: usize,
    ) -> Result<(), MeshBulkError> {
        self.require_modifiable()?;
        self.record_mut(entity)?.owner = owner;
        self.mark_dirty_downward(entity.rank);
        Ok(())
    }

    /// Record that `entity` is shared with `remote_rank`.
    pub fn add_sharing(&mut self, entity: Entity, remote_rank: usize) -> Result<(), MeshBulkError> {
        self.require_modifiable()?;
        let record = self.record_mut(entity)?;
        if !record.sharing.contains(&remote_rank) {
            record.sharing.push(remote_rank);
            record.sharing.sort_unstable();
        }
        self.mark_dirty_downward(entity.rank);
        Ok(())
    }

    /// Close the modification cycle and restore every invariant.
    ///
    /// Collective: every process in the communicator must call this the same
    /// number of times. A counter is exchanged first so a mismatch fails
    /// loudly instead of wedging silently.
    pub fn modification_end(&mut self) -> Result<(), MeshBulkError> {
        self.require_modifiable()?;
        self.cycle_count += 1;
        self.check_cycle_counters()?;
        self.resolve_identifiers()?;
        self.resolve_ownership_parts();
        self.rebuild_buckets()?;
        self.state = MeshState::Unmodifiable;
        self.rank_dirty = [false; EntityRank::COUNT];
        debug!("modification cycle {} closed", self.cycle_count);
        self.debug_assert_invariants();
        Ok(())
    }

    fn check_cycle_counters(&self) -> Result<(), MeshBulkError> {
        let counters = exchange_u64(&self.comm, TAG_CYCLE_COUNTER, self.cycle_count)?;
        for (peer, &remote) in counters.iter().enumerate() {
            if remote != self.cycle_count {
                return Err(MeshBulkError::CycleCounterMismatch {
                    local: self.cycle_count,
                    peer,
                    remote,
                });
            }
        }
        Ok(())
    }

    /// Assign global identifiers to entities declared without one: ids start
    /// past the global maximum for the rank, in blocks laid out by an
    /// exclusive scan of per-process pending counts.
    fn resolve_identifiers(&mut self) -> Result<(), MeshBulkError> {
        let me = self.comm.rank();
        for rank in EntityRank::ALL {
            let tag_offset = rank.index() as u16;
            let local_max = self.records[rank.index()]
                .iter()
                .filter(|r| r.alive)
                .filter_map(|r| r.global_id.map(EntityId::get))
                .max()
                .unwrap_or(0);
            let maxima = exchange_u64(&self.comm, TAG_MAX_ID_BASE + tag_offset, local_max)?;
            let global_max = maxima.into_iter().max().unwrap_or(0);

            let pending: Vec<usize> = self.records[rank.index()]
                .iter()
                .enumerate()
                .filter(|(_, r)| r.alive && r.global_id.is_none())
                .map(|(i, _)| i)
                .collect();
            let counts =
                exchange_u64(&self.comm, TAG_PENDING_BASE + tag_offset, pending.len() as u64)?;
            let base: u64 = global_max + 1 + counts[..me].iter().sum::<u64>();
            for (offset, index) in pending.into_iter().enumerate() {
                let id = EntityId::new(base + offset as u64)?;
                self.records[rank.index()][index].global_id = Some(id);
                self.id_index[rank.index()].insert(id.get(), index as u32);
            }
        }
        Ok(())
    }

    /// Recompute `{OWNS}` / `{SHARES}` membership from owner and sharing
    /// metadata.
    fn resolve_ownership_parts(&mut self) {
        let me = self.comm.rank();
        let owns = self.meta.locally_owned_part();
        let shares = self.meta.globally_shared_part();
        for table in &mut self.records {
            for record in table.iter_mut().filter(|r| r.alive) {
                set_membership(&mut record.explicit_parts, owns, record.owner == me);
                set_membership(&mut record.explicit_parts, shares, !record.sharing.is_empty());
            }
        }
    }

    /// Propagate induced membership down the relation graph and repartition
    /// every dirty rank.
    fn rebuild_buckets(&mut self) -> Result<(), MeshBulkError> {
        let induced = self.compute_induced_membership();

        for rank in EntityRank::ALL.into_iter().rev() {
            if !self.rank_dirty[rank.index()] {
                continue;
            }
            let r = rank.index();
            // snapshot old placement for field migration
            let old_placement: Vec<Option<(BucketId, u32)>> =
                self.records[r].iter().map(|rec| rec.placement).collect();

            // stable visit order: surviving entities in old bucket order,
            // then newly created entities in declaration order
            let mut order: Vec<u32> = Vec::new();
            for bucket in &self.buckets[r] {
                for &entity in bucket.entities() {
                    if self.records[r][entity.local_index()].alive {
                        order.push(entity.index);
                    }
                }
            }
            for (index, record) in self.records[r].iter().enumerate() {
                if record.alive && record.placement.is_none() {
                    order.push(index as u32);
                }
            }

            let mut new_buckets: Vec<Bucket> = Vec::new();
            let mut open: HashMap<BucketSignature, BucketId> = HashMap::new();
            for index in order {
                let entity = Entity { rank, index };
                let record = &self.records[r][index as usize];
                let mut parts = record.explicit_parts.clone();
                parts.extend_from_slice(&induced[r][index as usize]);
                parts.sort_unstable();
                parts.dedup();
                let topology = self.entity_topology(entity, &parts)?;
                let signature = BucketSignature {
                    rank,
                    parts,
                    topology,
                };
                let bucket_id = match open.get(&signature).copied() {
                    Some(id) if new_buckets[id].has_space() => id,
                    _ => {
                        let id = new_buckets.len();
                        new_buckets.push(Bucket::new(id, signature.clone(), &self.meta));
                        open.insert(signature, id);
                        id
                    }
                };
                let ordinal = new_buckets[bucket_id].push(entity);
                self.records[r][index as usize].placement = Some((bucket_id, ordinal));
            }
            trace!(
                "rank {rank}: rebuilt {} bucket(s) over {} entit(ies)",
                new_buckets.len(),
                new_buckets.iter().map(Bucket::size).sum::<usize>()
            );
            self.buckets[r] = new_buckets;
            let records = &self.records[r];
            self.field_storage
                .rebuild_rank(&self.meta, rank, &self.buckets[r], |e: Entity| {
                    old_placement
                        .get(e.local_index())
                        .copied()
                        .flatten()
                        // only survivors migrate; fresh entities take init
                        .filter(|_| records[e.local_index()].alive)
                });
        }
        Ok(())
    }

    /// Induced membership per rank and local index: a part whose primary
    /// rank equals a member entity's rank is induced on every
    /// downward-connected entity, transitively through the relation graph.
    fn compute_induced_membership(&self) -> [Vec<Vec<PartId>>; EntityRank::COUNT] {
        let mut induced: [Vec<Vec<PartId>>; EntityRank::COUNT] =
            std::array::from_fn(|r| vec![Vec::new(); self.records[r].len()]);
        for rank in EntityRank::ALL.into_iter().rev() {
            let r = rank.index();
            for (index, record) in self.records[r].iter().enumerate() {
                if !record.alive {
                    continue;
                }
                let mut sources: Vec<PartId> = record
                    .explicit_parts
                    .iter()
                    .copied()
                    .filter(|&p| self.meta.part(p).rank() == Some(rank))
                    .collect();
                sources.extend_from_slice(&induced[r][index]);
                if sources.is_empty() {
                    continue;
                }
                sources.sort_unstable();
                sources.dedup();
                for conn in &record.connections {
                    if conn.rank < rank {
                        induced[conn.rank.index()][conn.target.local_index()]
                            .extend_from_slice(&sources);
                    }
                }
            }
        }
        for table in &mut induced {
            for parts in table {
                parts.sort_unstable();
                parts.dedup();
            }
        }
        induced
    }

    /// The unique topology carried by the entity's parts, if any.
    fn entity_topology(
        &self,
        entity: Entity,
        parts: &[PartId],
    ) -> Result<Option<CellTopology>, MeshBulkError> {
        let mut found: Option<CellTopology> = None;
        for &part in parts {
            let meta_part = self.meta.part(part);
            if meta_part.rank() != Some(entity.rank) {
                continue;
            }
            if let Some(topology) = meta_part.topology() {
                match found {
                    None => found = Some(topology),
                    Some(existing) if existing == topology => {}
                    Some(existing) => {
                        return Err(MeshBulkError::EntityTopologyConflict(
                            entity, existing, topology,
                        ));
                    }
                }
            }
        }
        Ok(found)
    }

    // --- queries (legal in either state) --------------------------------

    /// Whether `entity` refers to a live entity of this store.
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.record(entity).is_ok()
    }

    /// Global identifier of an entity.
    pub fn identifier(&self, entity: Entity) -> Result<EntityId, MeshBulkError> {
        self.record(entity)?
            .global_id
            .ok_or(MeshBulkError::IdentifierPending(entity))
    }

    /// Owning process of an entity.
    pub fn parallel_owner_rank(&self, entity: Entity) -> Result<usize, MeshBulkError> {
        Ok(self.record(entity)?.owner)
    }

    /// Look up an entity by rank and global identifier.
    pub fn get_entity(&self, rank: EntityRank, id: EntityId) -> Option<Entity> {
        self.id_index[rank.index()]
            .get(&id.get())
            .map(|&index| Entity { rank, index })
    }

    /// Number of connected entities at `target_rank`.
    pub fn num_connected(
        &self,
        entity: Entity,
        target_rank: EntityRank,
    ) -> Result<usize, MeshBulkError> {
        Ok(self
            .record(entity)?
            .connections
            .iter()
            .filter(|c| c.rank == target_rank)
            .count())
    }

    /// Connected entities at `target_rank`, ordered by ordinal.
    pub fn connected_entities(
        &self,
        entity: Entity,
        target_rank: EntityRank,
    ) -> Result<impl Iterator<Item = Entity> + '_, MeshBulkError> {
        Ok(self
            .record(entity)?
            .connections
            .iter()
            .filter(move |c| c.rank == target_rank)
            .map(|c| c.target))
    }

    /// Connected nodes (shorthand).
    pub fn num_nodes(&self, entity: Entity) -> Result<usize, MeshBulkError> {
        self.num_connected(entity, EntityRank::Node)
    }

    /// Connected edges (shorthand).
    pub fn num_edges(&self, entity: Entity) -> Result<usize, MeshBulkError> {
        self.num_connected(entity, EntityRank::Edge)
    }

    /// Connected faces (shorthand).
    pub fn num_faces(&self, entity: Entity) -> Result<usize, MeshBulkError> {
        self.num_connected(entity, EntityRank::Face)
    }

    /// Connected elements (shorthand).
    pub fn num_elements(&self, entity: Entity) -> Result<usize, MeshBulkError> {
        self.num_connected(entity, EntityRank::Element)
    }

    /// Number of live entities at `rank`.
    pub fn num_entities(&self, rank: EntityRank) -> usize {
        self.records[rank.index()]
            .iter()
            .filter(|r| r.alive)
            .count()
    }

    /// All buckets of a rank, in bucket-id order. Bucket ids and ordering
    /// are stable only between modification cycles.
    #[inline]
    pub fn buckets(&self, rank: EntityRank) -> &[Bucket] {
        &self.buckets[rank.index()]
    }

    /// The bucket holding `entity`.
    pub fn bucket_of(&self, entity: Entity) -> Result<&Bucket, MeshBulkError> {
        let (bucket, _) = self
            .record(entity)?
            .placement
            .ok_or(MeshBulkError::EntityNotPlaced(entity))?;
        Ok(&self.buckets[entity.rank.index()][bucket])
    }

    /// Buckets of `rank` satisfying `selector`.
    pub fn select_buckets<'a>(
        &'a self,
        selector: &'a Selector,
        rank: EntityRank,
    ) -> impl Iterator<Item = &'a Bucket> + 'a {
        self.buckets(rank)
            .iter()
            .filter(move |b| selector.matches_parts(b.parts(), &self.meta))
    }

    /// Entities of `rank` satisfying `selector`, in bucket order.
    pub fn select_entities<'a>(
        &'a self,
        selector: &'a Selector,
        rank: EntityRank,
    ) -> impl Iterator<Item = Entity> + 'a {
        self.select_buckets(selector, rank)
            .flat_map(|b| b.entities().iter().copied())
    }

    /// Live entities shared with another process.
    pub fn shared_entities(&self, rank: EntityRank) -> impl Iterator<Item = Entity> + '_ {
        self.records[rank.index()]
            .iter()
            .enumerate()
            .filter(|(_, r)| r.alive && !r.sharing.is_empty())
            .map(move |(index, _)| Entity {
                rank,
                index: index as u32,
            })
    }

    /// Live entities owned by another process (ghost/aura copies).
    pub fn ghost_entities(&self, rank: EntityRank) -> impl Iterator<Item = Entity> + '_ {
        let me = self.comm.rank();
        self.records[rank.index()]
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.alive && r.owner != me)
            .map(move |(index, _)| Entity {
                rank,
                index: index as u32,
            })
    }

    // --- field access ---------------------------------------------------

    fn field_handle_parts(
        &self,
        field: FieldId,
        state: FieldState,
        requested: crate::field::buffer::FieldDataType,
    ) -> Result<(EntityRank, usize), MeshBulkError> {
        let meta_field = self.meta.field(field);
        if meta_field.data_type() != requested {
            return Err(MeshBulkError::FieldTypeMismatch {
                field: meta_field.name().to_string(),
                declared: meta_field.data_type(),
                requested,
            });
        }
        if !meta_field.is_state_valid(state) {
            return Err(MeshBulkError::InvalidFieldState {
                field: meta_field.name().to_string(),
                num_states: meta_field.num_states(),
                requested: state,
            });
        }
        Ok((meta_field.rank(), state.index()))
    }

    /// Read-only handle to `field` at its current state.
    pub fn field<T: FieldValue>(&self, field: FieldId) -> Result<FieldRef<'_, T>, MeshBulkError> {
        self.field_state(field, FieldState::New)
    }

    /// Read-only handle to `field` at temporal `state`.
    pub fn field_state<T: FieldValue>(
        &self,
        field: FieldId,
        state: FieldState,
    ) -> Result<FieldRef<'_, T>, MeshBulkError> {
        let (rank, state_idx) = self.field_handle_parts(field, state, T::DATA_TYPE)?;
        Ok(FieldRef {
            name: self.meta.field(field).name(),
            rank,
            buckets: &self.field_storage.instance(field.index()).states[state_idx],
            records: &self.records[rank.index()],
            _marker: PhantomData,
        })
    }

    /// Mutable handle to `field` at its current state.
    pub fn field_mut<T: FieldValue>(
        &mut self,
        field: FieldId,
    ) -> Result<FieldMut<'_, T>, MeshBulkError> {
        self.field_state_mut(field, FieldState::New)
    }

    /// Mutable handle to `field` at temporal `state`.
    ///
    /// Writes are legal on owned and non-owned copies alike; reconciling
    /// non-owned copies is the caller's job via the communicator.
    pub fn field_state_mut<T: FieldValue>(
        &mut self,
        field: FieldId,
        state: FieldState,
    ) -> Result<FieldMut<'_, T>, MeshBulkError> {
        let (rank, state_idx) = self.field_handle_parts(field, state, T::DATA_TYPE)?;
        Ok(FieldMut {
            name: self.meta.field(field).name(),
            rank,
            buckets: &mut self.field_storage.instance_mut(field.index()).states[state_idx],
            records: &self.records[rank.index()],
            _marker: PhantomData,
        })
    }

    /// Rotate every multi-state field one step: current becomes previous in
    /// O(1) per field, no value copies.
    pub fn update_field_states(&mut self) -> Result<(), MeshBulkError> {
        if self.state == MeshState::Modifiable {
            return Err(MeshBulkError::AlreadyModifiable);
        }
        self.field_storage.advance_states();
        Ok(())
    }
}

/// Insert keeping the vector sorted; upward slots may repeat (two faces can
/// hold the same node at the same ordinal), so exact duplicates are the only
/// thing skipped.
fn insert_connection(connections: &mut Vec<Connection>, conn: Connection) {
    if let Err(pos) = connections.binary_search(&conn) {
        connections.insert(pos, conn);
    }
}

fn set_membership(parts: &mut Vec<PartId>, part: PartId, member: bool) {
    match (parts.binary_search(&part), member) {
        (Err(pos), true) => parts.insert(pos, part),
        (Ok(pos), false) => {
            parts.remove(pos);
        }
        _ => {}
    }
}

impl<C: Communicator> DebugInvariants for BulkData<C> {
    fn debug_assert_invariants(&self) {
        crate::bulk_debug_assert_ok!(self.validate_invariants(), "BulkData invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshBulkError> {
        for rank in EntityRank::ALL {
            let r = rank.index();
            let mut placed = 0usize;
            for bucket in &self.buckets[r] {
                for (ordinal, &entity) in bucket.entities().iter().enumerate() {
                    let record = self.records[r].get(entity.local_index()).ok_or_else(|| {
                        MeshBulkError::InvariantViolation(format!(
                            "bucket {} holds unknown entity {entity:?}",
                            bucket.bucket_id()
                        ))
                    })?;
                    if !record.alive
                        || record.placement != Some((bucket.bucket_id(), ordinal as u32))
                    {
                        return Err(MeshBulkError::InvariantViolation(format!(
                            "entity {entity:?} placement disagrees with bucket {}",
                            bucket.bucket_id()
                        )));
                    }
                    placed += 1;
                }
            }
            if self.state == MeshState::Unmodifiable && placed != self.num_entities(rank) {
                return Err(MeshBulkError::InvariantViolation(format!(
                    "rank {rank}: {placed} entities placed, {} alive",
                    self.num_entities(rank)
                )));
            }
            // every connection has its mirror on the target
            for (index, record) in self.records[r].iter().enumerate() {
                if !record.alive {
                    continue;
                }
                let entity = Entity {
                    rank,
                    index: index as u32,
                };
                for conn in &record.connections {
                    let mirror = Connection {
                        rank,
                        ordinal: conn.ordinal,
                        target: entity,
                    };
                    let target_conns = &self.records[conn.rank.index()]
                        [conn.target.local_index()]
                    .connections;
                    if target_conns.binary_search(&mirror).is_err() {
                        return Err(MeshBulkError::InvariantViolation(format!(
                            "connection {entity:?} -> {:?} has no mirror",
                            conn.target
                        )));
                    }
                }
            }
            // no two buckets of a rank share a signature unless earlier ones are full
            for (i, a) in self.buckets[r].iter().enumerate() {
                for b in &self.buckets[r][i + 1..] {
                    if a.signature == b.signature && a.has_space() {
                        return Err(MeshBulkError::InvariantViolation(format!(
                            "rank {rank}: buckets {} and {} share a signature with spare capacity",
                            a.bucket_id(),
                            b.bucket_id()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::meta_data::MetaData;

    fn committed_meta() -> MetaData {
        let mut meta = MetaData::new(3);
        meta.commit();
        meta
    }

    #[test]
    fn requires_committed_schema() {
        let meta = MetaData::new(3);
        assert!(matches!(
            BulkData::new(meta, NoComm),
            Err(MeshBulkError::SchemaNotCommitted)
        ));
    }

    #[test]
    fn mutation_outside_cycle_is_protocol_error() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        assert!(matches!(
            bulk.declare_entity(EntityRank::Node),
            Err(MeshBulkError::NotModifiable)
        ));
        bulk.modification_begin().unwrap();
        assert!(matches!(
            bulk.modification_begin(),
            Err(MeshBulkError::AlreadyModifiable)
        ));
        let node = bulk.declare_entity(EntityRank::Node).unwrap();
        bulk.modification_end().unwrap();
        assert!(matches!(
            bulk.destroy_entity(node),
            Err(MeshBulkError::NotModifiable)
        ));
    }

    #[test]
    fn deferred_identifiers_resolve_at_cycle_end() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        let a = bulk.declare_entity(EntityRank::Node).unwrap();
        let b = bulk.declare_entity(EntityRank::Node).unwrap();
        assert!(matches!(
            bulk.identifier(a),
            Err(MeshBulkError::IdentifierPending(_))
        ));
        bulk.modification_end().unwrap();
        let ida = bulk.identifier(a).unwrap().get();
        let idb = bulk.identifier(b).unwrap().get();
        assert_ne!(ida, idb);
        assert_eq!(bulk.get_entity(EntityRank::Node, bulk.identifier(a).unwrap()), Some(a));
    }

    #[test]
    fn deferred_ids_extend_past_existing_ids() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        bulk.declare_entity_with_id(EntityRank::Node, EntityId::new(40).unwrap())
            .unwrap();
        let fresh = bulk.declare_entity(EntityRank::Node).unwrap();
        bulk.modification_end().unwrap();
        assert_eq!(bulk.identifier(fresh).unwrap().get(), 41);
    }

    #[test]
    fn duplicate_identifier_rejected() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        let id = EntityId::new(7).unwrap();
        bulk.declare_entity_with_id(EntityRank::Node, id).unwrap();
        assert!(matches!(
            bulk.declare_entity_with_id(EntityRank::Node, id),
            Err(MeshBulkError::DuplicateIdentifier(EntityRank::Node, 7))
        ));
    }

    #[test]
    fn destroy_requires_severed_relations() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        let edge = bulk.declare_entity(EntityRank::Edge).unwrap();
        let node = bulk.declare_entity(EntityRank::Node).unwrap();
        bulk.declare_relation(edge, node, 0).unwrap();
        assert!(matches!(
            bulk.destroy_entity(node),
            Err(MeshBulkError::EntityHasRelations(_, 1))
        ));
        bulk.destroy_relation(edge, node, 0).unwrap();
        bulk.destroy_entity(node).unwrap();
        bulk.destroy_entity(edge).unwrap();
        bulk.modification_end().unwrap();
        assert!(!bulk.is_valid(node));
        assert!(matches!(
            bulk.identifier(node),
            Err(MeshBulkError::EntityNotAlive(_))
        ));
    }

    #[test]
    fn relations_must_point_downward() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        let edge = bulk.declare_entity(EntityRank::Edge).unwrap();
        let node = bulk.declare_entity(EntityRank::Node).unwrap();
        assert!(matches!(
            bulk.declare_relation(node, edge, 0),
            Err(MeshBulkError::InvalidRelationRanks { .. })
        ));
        bulk.declare_relation(edge, node, 0).unwrap();
        assert!(matches!(
            bulk.declare_relation(edge, node, 0),
            Err(MeshBulkError::DuplicateRelation(..))
        ));
    }

    #[test]
    fn num_connected_matches_iteration() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        let edge = bulk.declare_entity(EntityRank::Edge).unwrap();
        let n0 = bulk.declare_entity(EntityRank::Node).unwrap();
        let n1 = bulk.declare_entity(EntityRank::Node).unwrap();
        bulk.declare_relation(edge, n0, 0).unwrap();
        bulk.declare_relation(edge, n1, 1).unwrap();
        bulk.modification_end().unwrap();
        for rank in EntityRank::ALL {
            assert_eq!(
                bulk.num_connected(edge, rank).unwrap(),
                bulk.connected_entities(edge, rank).unwrap().count()
            );
        }
        let nodes: Vec<_> = bulk.connected_entities(edge, EntityRank::Node).unwrap().collect();
        assert_eq!(nodes, vec![n0, n1]);
        assert_eq!(bulk.num_elements(n0).unwrap(), 0);
        assert_eq!(bulk.num_edges(n0).unwrap(), 1);
    }

    #[test]
    fn buckets_untouched_when_nothing_changed() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        for _ in 0..5 {
            bulk.declare_entity(EntityRank::Node).unwrap();
        }
        bulk.modification_end().unwrap();
        let before: Vec<Vec<Entity>> = bulk
            .buckets(EntityRank::Node)
            .iter()
            .map(|b| b.entities().to_vec())
            .collect();
        bulk.modification_begin().unwrap();
        bulk.modification_end().unwrap();
        let after: Vec<Vec<Entity>> = bulk
            .buckets(EntityRank::Node)
            .iter()
            .map(|b| b.entities().to_vec())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn owned_parts_follow_ownership() {
        let mut bulk = BulkData::new(committed_meta(), NoComm).unwrap();
        bulk.modification_begin().unwrap();
        let mine = bulk.declare_entity(EntityRank::Node).unwrap();
        let ghost = bulk.declare_entity(EntityRank::Node).unwrap();
        bulk.set_parallel_owner(ghost, 3).unwrap();
        bulk.modification_end().unwrap();

        let owns = bulk.meta().locally_owned_part();
        assert!(bulk.bucket_of(mine).unwrap().is_member(owns));
        assert!(bulk.bucket_of(mine).unwrap().owned());
        assert!(!bulk.bucket_of(ghost).unwrap().is_member(owns));
        assert!(bulk.bucket_of(ghost).unwrap().in_aura());
        assert_eq!(bulk.parallel_owner_rank(ghost).unwrap(), 3);
        assert_eq!(
            bulk.ghost_entities(EntityRank::Node).collect::<Vec<_>>(),
            vec![ghost]
        );
    }
}
