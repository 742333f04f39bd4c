//! Mesh schema: parts, fields, and the commit protocol.

pub mod field;
pub mod meta_data;
pub mod part;

pub use field::{FieldId, FieldMeta, FieldRestriction, FieldState};
pub use meta_data::MetaData;
pub use part::{Part, PartId};
