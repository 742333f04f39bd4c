//! Selector algebra over bucket part membership.
//!
//! A [`Selector`] is an immutable boolean expression tree whose leaves test
//! part membership (or field definedness) and whose interior nodes are
//! and/or/complement. Selectors are evaluated per bucket, never per entity:
//! every entity in a bucket shares the bucket's membership, so one evaluation
//! covers the whole block.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use itertools::Itertools;

use crate::comm::Communicator;
use crate::mesh::bulk::BulkData;
use crate::meta::field::FieldId;
use crate::meta::meta_data::MetaData;
use crate::meta::part::PartId;
use crate::topology::rank::EntityRank;

/// Boolean expression over part membership.
///
/// Build leaves with [`Selector::from_part`] and [`Selector::select_field`],
/// then compose with `&`, `|`, and `!` (or the named constructors).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Satisfied by buckets whose membership contains the part.
    Part(PartId),
    /// Satisfied by buckets the field has storage on.
    FieldDefined(FieldId),
    /// Both operands satisfied.
    And(Box<Selector>, Box<Selector>),
    /// Either operand satisfied.
    Or(Box<Selector>, Box<Selector>),
    /// Operand not satisfied.
    Not(Box<Selector>),
    /// Any operand satisfied; `Union(vec![])` matches nothing.
    Union(Vec<Selector>),
}

impl Selector {
    /// Leaf selecting buckets that are members of `part`.
    #[inline]
    pub fn from_part(part: PartId) -> Self {
        Selector::Part(part)
    }

    /// Leaf selecting buckets where `field` has storage (any restriction
    /// part intersects the bucket membership).
    #[inline]
    pub fn select_field(field: FieldId) -> Self {
        Selector::FieldDefined(field)
    }

    /// Conjunction (also `a & b`).
    pub fn and_(self, other: Selector) -> Self {
        Selector::And(Box::new(self), Box::new(other))
    }

    /// Disjunction (also `a | b`).
    pub fn or_(self, other: Selector) -> Self {
        Selector::Or(Box::new(self), Box::new(other))
    }

    /// Complement (also `!a`).
    pub fn complement(self) -> Self {
        Selector::Not(Box::new(self))
    }

    /// N-ary disjunction over parts. Empty input matches nothing.
    pub fn select_union(parts: &[PartId]) -> Self {
        Selector::Union(parts.iter().copied().map(Selector::Part).collect())
    }

    /// Evaluate against a bucket's (sorted) part membership.
    pub fn matches_parts(&self, membership: &[PartId], meta: &MetaData) -> bool {
        match self {
            Selector::Part(part) => membership.binary_search(part).is_ok(),
            Selector::FieldDefined(field) => meta.field(*field).is_defined_on(membership),
            Selector::And(a, b) => {
                a.matches_parts(membership, meta) && b.matches_parts(membership, meta)
            }
            Selector::Or(a, b) => {
                a.matches_parts(membership, meta) || b.matches_parts(membership, meta)
            }
            Selector::Not(inner) => !inner.matches_parts(membership, meta),
            Selector::Union(terms) => terms.iter().any(|t| t.matches_parts(membership, meta)),
        }
    }

    /// Whether no bucket of `rank` in `bulk` satisfies this selector.
    pub fn is_empty<C: Communicator>(&self, bulk: &BulkData<C>, rank: EntityRank) -> bool {
        bulk.select_buckets(self, rank).next().is_none()
    }
}

impl From<PartId> for Selector {
    fn from(part: PartId) -> Self {
        Selector::Part(part)
    }
}

impl BitAnd for Selector {
    type Output = Selector;
    fn bitand(self, rhs: Selector) -> Selector {
        self.and_(rhs)
    }
}

impl BitOr for Selector {
    type Output = Selector;
    fn bitor(self, rhs: Selector) -> Selector {
        self.or_(rhs)
    }
}

impl Not for Selector {
    type Output = Selector;
    fn not(self) -> Selector {
        self.complement()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Part(part) => write!(f, "{part}"),
            Selector::FieldDefined(field) => write!(f, "defined(field#{})", field.index()),
            Selector::And(a, b) => write!(f, "({a} & {b})"),
            Selector::Or(a, b) => write!(f, "({a} | {b})"),
            Selector::Not(inner) => write!(f, "!{inner}"),
            Selector::Union(terms) => write!(f, "union({})", terms.iter().format(", ")),
        }
    }
}
