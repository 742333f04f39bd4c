//! Tagged buffers for field data.
//!
//! Field value types form a closed set; a buffer knows which variant it holds
//! and typed access goes through [`FieldValue`], so a type mismatch is an
//! explicit error rather than a reinterpretation of memory.

use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Tag for the closed set of supported field value types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldDataType {
    /// 64-bit floating point.
    Float64,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit unsigned integer.
    UInt64,
}

impl std::fmt::Display for FieldDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldDataType::Float64 => "f64",
            FieldDataType::Int32 => "i32",
            FieldDataType::UInt64 => "u64",
        };
        write!(f, "{name}")
    }
}

/// Contiguous storage for one field on one bucket (one temporal state).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldBuffer {
    Float64(Vec<f64>),
    Int32(Vec<i32>),
    UInt64(Vec<u64>),
}

impl FieldBuffer {
    /// Zero-filled buffer of `len` values of type `data_type`.
    pub fn with_len(data_type: FieldDataType, len: usize) -> Self {
        match data_type {
            FieldDataType::Float64 => FieldBuffer::Float64(vec![0.0; len]),
            FieldDataType::Int32 => FieldBuffer::Int32(vec![0; len]),
            FieldDataType::UInt64 => FieldBuffer::UInt64(vec![0; len]),
        }
    }

    /// Which variant this buffer holds.
    pub fn data_type(&self) -> FieldDataType {
        match self {
            FieldBuffer::Float64(_) => FieldDataType::Float64,
            FieldBuffer::Int32(_) => FieldDataType::Int32,
            FieldBuffer::UInt64(_) => FieldDataType::UInt64,
        }
    }

    /// Length in values (not bytes).
    pub fn len(&self) -> usize {
        match self {
            FieldBuffer::Float64(v) => v.len(),
            FieldBuffer::Int32(v) => v.len(),
            FieldBuffer::UInt64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `len` values from `src[src_offset..]` into `self[dst_offset..]`.
    ///
    /// Both buffers must hold the same variant; mismatched variants are a
    /// programming error inside the storage layer and panic.
    pub(crate) fn copy_from(
        &mut self,
        dst_offset: usize,
        src: &FieldBuffer,
        src_offset: usize,
        len: usize,
    ) {
        match (self, src) {
            (FieldBuffer::Float64(dst), FieldBuffer::Float64(src)) => {
                dst[dst_offset..dst_offset + len]
                    .copy_from_slice(&src[src_offset..src_offset + len]);
            }
            (FieldBuffer::Int32(dst), FieldBuffer::Int32(src)) => {
                dst[dst_offset..dst_offset + len]
                    .copy_from_slice(&src[src_offset..src_offset + len]);
            }
            (FieldBuffer::UInt64(dst), FieldBuffer::UInt64(src)) => {
                dst[dst_offset..dst_offset + len]
                    .copy_from_slice(&src[src_offset..src_offset + len]);
            }
            _ => panic!("field buffer variant mismatch during copy"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for u64 {}
}

/// A value type from the closed field-type set.
///
/// The trait is sealed: the storage layer matches exhaustively on
/// [`FieldDataType`], so the set cannot be extended outside this crate.
pub trait FieldValue:
    sealed::Sealed + Copy + Zero + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// Tag corresponding to `Self`.
    const DATA_TYPE: FieldDataType;

    /// Typed view of a buffer, `None` if the variant does not match.
    fn as_slice(buf: &FieldBuffer) -> Option<&[Self]>;

    /// Typed mutable view of a buffer, `None` if the variant does not match.
    fn as_mut_slice(buf: &mut FieldBuffer) -> Option<&mut [Self]>;

    /// Wrap a typed vector into a buffer.
    fn into_buffer(values: Vec<Self>) -> FieldBuffer;
}

macro_rules! impl_field_value {
    ($ty:ty, $variant:ident) => {
        impl FieldValue for $ty {
            const DATA_TYPE: FieldDataType = FieldDataType::$variant;

            fn as_slice(buf: &FieldBuffer) -> Option<&[Self]> {
                match buf {
                    FieldBuffer::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn as_mut_slice(buf: &mut FieldBuffer) -> Option<&mut [Self]> {
                match buf {
                    FieldBuffer::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn into_buffer(values: Vec<Self>) -> FieldBuffer {
                FieldBuffer::$variant(values)
            }
        }
    };
}

impl_field_value!(f64, Float64);
impl_field_value!(i32, Int32);
impl_field_value!(u64, UInt64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_filled_construction() {
        let buf = FieldBuffer::with_len(FieldDataType::Float64, 4);
        assert_eq!(buf.len(), 4);
        assert_eq!(f64::as_slice(&buf).unwrap(), &[0.0; 4]);
    }

    #[test]
    fn typed_access_rejects_other_variants() {
        let buf = FieldBuffer::with_len(FieldDataType::Int32, 2);
        assert!(f64::as_slice(&buf).is_none());
        assert!(i32::as_slice(&buf).is_some());
        assert_eq!(buf.data_type(), FieldDataType::Int32);
    }

    #[test]
    fn copy_from_moves_values() {
        let src = f64::into_buffer(vec![1.0, 2.0, 3.0]);
        let mut dst = FieldBuffer::with_len(FieldDataType::Float64, 5);
        dst.copy_from(2, &src, 1, 2);
        assert_eq!(f64::as_slice(&dst).unwrap(), &[0.0, 0.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "variant mismatch")]
    fn copy_from_mismatched_variant_panics() {
        let src = i32::into_buffer(vec![1]);
        let mut dst = FieldBuffer::with_len(FieldDataType::Float64, 1);
        dst.copy_from(0, &src, 0, 1);
    }
}
