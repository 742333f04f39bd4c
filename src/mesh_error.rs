//! MeshBulkError: unified error type for mesh-bulk public APIs.
//!
//! Every fallible operation in the crate reports through this enum so callers
//! can match on the failure class: schema conflicts, protocol (state-machine)
//! violations, missing names, field type mismatches, and collective
//! coordination failures.

use thiserror::Error;

use crate::mesh::entity::Entity;
use crate::topology::cell_topology::CellTopology;
use crate::topology::rank::EntityRank;

/// Unified error type for mesh-bulk operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshBulkError {
    /// Attempted to construct an `EntityId` with a zero value (invalid).
    #[error("EntityId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidEntityId,

    // --- schema conflicts (declaration-time, never silently resolved) ---
    /// A part was redeclared with a different primary rank.
    #[error("part `{name}` already declared with rank {existing:?}, redeclared with {requested:?}")]
    PartRankConflict {
        name: String,
        existing: Option<EntityRank>,
        requested: Option<EntityRank>,
    },
    /// A part's topology is immutable once set.
    #[error("part `{name}` already carries topology {existing:?}, cannot assign {requested:?}")]
    PartTopologyConflict {
        name: String,
        existing: CellTopology,
        requested: CellTopology,
    },
    /// A field was redeclared with a different value type, rank, or state count.
    #[error("field `{name}` already declared as ({existing}); redeclared as ({requested})")]
    FieldDeclarationConflict {
        name: String,
        existing: String,
        requested: String,
    },
    /// A field was declared with a state count outside the supported range.
    #[error("field `{field}` declares {requested} state(s); supported range is 1..={max}")]
    StateCountOutOfRange {
        field: String,
        requested: usize,
        max: usize,
    },
    /// Adding a subset edge would create a cycle in the part hierarchy.
    #[error("subset relation `{superset}` -> `{subset}` would make the part hierarchy cyclic")]
    CyclicPartHierarchy { superset: String, subset: String },
    /// An entity's parts assign it two distinct topologies.
    #[error("entity {0:?} belongs to parts with conflicting topologies {1:?} and {2:?}")]
    EntityTopologyConflict(Entity, CellTopology, CellTopology),

    // --- not-found escalation (must-exist lookups) ---
    /// `expect_part` was called for a name the schema does not know.
    #[error("no part named `{0}` in the schema")]
    PartNotFound(String),
    /// `expect_field` was called for a name the schema does not know.
    #[error("no field named `{0}` in the schema")]
    FieldNotFound(String),

    // --- protocol / state errors ---
    /// Declaration attempted on a committed schema.
    #[error("meta schema is committed; declarations are frozen")]
    SchemaCommitted,
    /// A bulk store requires a committed schema.
    #[error("meta schema must be committed before bulk data is constructed")]
    SchemaNotCommitted,
    /// Mutation attempted outside a modification cycle.
    #[error("bulk data is not modifiable; call modification_begin() first")]
    NotModifiable,
    /// `modification_begin` called while a cycle is already open.
    #[error("a modification cycle is already in progress")]
    AlreadyModifiable,
    /// Query or mutation of a destroyed or never-created entity key.
    #[error("entity {0:?} is not alive")]
    EntityNotAlive(Entity),
    /// Destruction requires all relations to be severed first.
    #[error("entity {0:?} still has {1} relation(s); sever them before destroying")]
    EntityHasRelations(Entity, usize),
    /// Built-in parts cannot be removed from an entity.
    #[error("part `{0}` is built-in and cannot be removed from entities")]
    BuiltinPartRemoval(String),

    // --- relation errors ---
    /// Relations must point from a higher rank to a strictly lower rank.
    #[error("relation must go downward in rank: {from:?} -> {to:?}")]
    InvalidRelationRanks { from: EntityRank, to: EntityRank },
    /// The (target rank, ordinal) slot is already connected.
    #[error("entity {0:?} already has a {1:?} relation at ordinal {2}")]
    DuplicateRelation(Entity, EntityRank, u32),
    /// Severing a relation that was never declared.
    #[error("entity {0:?} has no {1:?} relation at ordinal {2}")]
    RelationNotFound(Entity, EntityRank, u32),

    // --- identifier errors ---
    /// Caller-assigned global id already used within the rank.
    #[error("identifier {1} is already in use at rank {0:?}")]
    DuplicateIdentifier(EntityRank, u64),
    /// Deferred identifiers resolve at the end of the modification cycle.
    #[error("entity {0:?} has no identifier yet; it is assigned when the modification cycle ends")]
    IdentifierPending(Entity),

    // --- mesh generation ---
    /// Box generator extents must all be positive.
    #[error("box extents must be positive, got {0}x{1}x{2}")]
    InvalidBoxExtents(usize, usize, usize),

    // --- internal consistency ---
    /// A structural invariant failed validation.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    // --- field access errors ---
    /// Typed access with a value type other than the declared one.
    #[error("field `{field}` holds {declared:?} values; accessed as {requested:?}")]
    FieldTypeMismatch {
        field: String,
        declared: crate::field::buffer::FieldDataType,
        requested: crate::field::buffer::FieldDataType,
    },
    /// A state tag beyond the field's declared state count.
    #[error("field `{field}` has {num_states} state(s); state {requested:?} is invalid")]
    InvalidFieldState {
        field: String,
        num_states: usize,
        requested: crate::meta::field::FieldState,
    },
    /// The field has no storage on the given bucket (not defined there).
    #[error("field `{0}` is not defined on bucket {1}")]
    FieldNotOnBucket(String, usize),
    /// The entity's rank differs from the field's declared rank.
    #[error("field `{field}` applies to rank {declared:?}, entity has rank {found:?}")]
    FieldRankMismatch {
        field: String,
        declared: EntityRank,
        found: EntityRank,
    },
    /// The entity has no bucket placement yet (cycle still open).
    #[error("entity {0:?} has no bucket placement; field data is unavailable until the modification cycle ends")]
    EntityNotPlaced(Entity),
    /// Restriction components must be at least one.
    #[error("field `{0}` restriction must have at least one component")]
    ZeroComponentRestriction(String),
    /// Init value length must equal the restriction's component count.
    #[error("field `{field}` init value has {found} component(s), restriction declares {expected}")]
    InitValueLengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    // --- distributed coordination ---
    /// Ranks disagreed on the modification-cycle counter.
    #[error("modification cycle counter mismatch: local {local}, rank {peer} reports {remote}")]
    CycleCounterMismatch { local: u64, peer: usize, remote: u64 },
    /// A collective exchange failed to deliver a peer's contribution.
    #[error("collective exchange with rank {0} returned no data")]
    CollectiveExchangeFailed(usize),
}
