//! Field declarations: typed, optionally multi-state per-entity data.
//!
//! A field is declared against the schema with a value type from the closed
//! set, a primary rank, and a state count; storage is only materialized by
//! the bulk store for buckets whose membership intersects the field's
//! restriction parts.

use serde::{Deserialize, Serialize};

use crate::field::buffer::{FieldBuffer, FieldDataType};
use crate::meta::part::PartId;
use crate::topology::rank::EntityRank;

/// Dense ordinal of a field within its schema.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct FieldId(pub(crate) u32);

impl FieldId {
    /// Index into the schema's field arena.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Temporal state tag for a multi-state field.
///
/// `New` is the buffer being written this step; `N` is one step back, `Nm1`
/// two steps back, and so on. For a field with `num_states == n`, tags with
/// index below `n` are valid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldState {
    New = 0,
    N = 1,
    Nm1 = 2,
    Nm2 = 3,
    Nm3 = 4,
    Nm4 = 5,
}

impl FieldState {
    /// Slot index addressed by this tag.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Maximum number of historical states a field may declare.
pub const MAX_FIELD_STATES: usize = 6;

/// Registration of a field on one part: component count and optional
/// per-entity initial value applied when bucket storage is allocated.
#[derive(Clone, Debug)]
pub struct FieldRestriction {
    pub(crate) part: PartId,
    pub(crate) components: usize,
    pub(crate) init_value: Option<FieldBuffer>,
}

impl FieldRestriction {
    /// Part this restriction applies to.
    #[inline]
    pub fn part(&self) -> PartId {
        self.part
    }

    /// Components per entity under this restriction.
    #[inline]
    pub fn components(&self) -> usize {
        self.components
    }

    /// Initial value, one entry per component.
    #[inline]
    pub fn init_value(&self) -> Option<&FieldBuffer> {
        self.init_value.as_ref()
    }
}

/// Declared metadata for one field.
#[derive(Clone, Debug)]
pub struct FieldMeta {
    pub(crate) id: FieldId,
    pub(crate) name: String,
    pub(crate) rank: EntityRank,
    pub(crate) data_type: FieldDataType,
    pub(crate) num_states: usize,
    pub(crate) restrictions: Vec<FieldRestriction>,
}

impl FieldMeta {
    /// Ordinal of this field.
    #[inline]
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Unique name within the schema.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rank of entities this field applies to.
    #[inline]
    pub fn rank(&self) -> EntityRank {
        self.rank
    }

    /// Declared value type.
    #[inline]
    pub fn data_type(&self) -> FieldDataType {
        self.data_type
    }

    /// Number of temporal states (1 = stateless).
    #[inline]
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Whether `state` addresses a slot this field actually carries.
    #[inline]
    pub fn is_state_valid(&self, state: FieldState) -> bool {
        state.index() < self.num_states
    }

    /// Parts this field is registered on.
    #[inline]
    pub fn restrictions(&self) -> &[FieldRestriction] {
        &self.restrictions
    }

    /// Whether the field has any restriction whose part is in `membership`.
    pub fn is_defined_on(&self, membership: &[PartId]) -> bool {
        self.restrictions
            .iter()
            .any(|r| membership.contains(&r.part))
    }

    /// Component count for a bucket with the given (sorted) membership:
    /// the maximum over matching restrictions, or `None` if no restriction
    /// matches and the field has no storage there.
    pub fn components_for(&self, membership: &[PartId]) -> Option<usize> {
        self.restrictions
            .iter()
            .filter(|r| membership.contains(&r.part))
            .map(|r| r.components)
            .max()
    }

    /// First matching restriction carrying an init value, in declaration
    /// order. Used when bucket storage is allocated.
    pub fn init_for(&self, membership: &[PartId]) -> Option<&FieldRestriction> {
        self.restrictions
            .iter()
            .find(|r| membership.contains(&r.part) && r.init_value.is_some())
    }

    /// Short signature string used in conflict diagnostics.
    pub(crate) fn signature(&self) -> String {
        format!(
            "{} on {}, {} state(s)",
            self.data_type, self.rank, self.num_states
        )
    }
}
