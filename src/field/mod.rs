//! Typed, multi-state, per-bucket field data.

pub mod access;
pub mod buffer;
pub(crate) mod storage;

pub use access::{FieldMut, FieldRef};
pub use buffer::{FieldBuffer, FieldDataType, FieldValue};
