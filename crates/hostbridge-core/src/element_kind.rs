//! Element kinds for external indexed data.
//!
//! An [`ElementKind`] tells the host how to address a block of raw memory with
//! its own indexing operators: the stride, and how numbers are stored into and
//! loaded from each element. All multi-byte elements are little-endian.

use crate::convert::{to_int32, to_uint8_clamp, to_uint32};
use crate::runtime::Dynamic;

/// Declared element kind of an indexed data attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Int8,
    Uint8,
    /// 1-byte unsigned with saturating stores
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ElementKind {
    /// Every element kind, in registration order.
    pub const ALL: [ElementKind; 9] = [
        ElementKind::Int8,
        ElementKind::Uint8,
        ElementKind::Uint8Clamped,
        ElementKind::Int16,
        ElementKind::Uint16,
        ElementKind::Int32,
        ElementKind::Uint32,
        ElementKind::Float32,
        ElementKind::Float64,
    ];

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            ElementKind::Int8 | ElementKind::Uint8 | ElementKind::Uint8Clamped => 1,
            ElementKind::Int16 | ElementKind::Uint16 => 2,
            ElementKind::Int32 | ElementKind::Uint32 | ElementKind::Float32 => 4,
            ElementKind::Float64 => 8,
        }
    }

    /// Name of the view class exposing this element kind.
    pub const fn class_name(self) -> &'static str {
        match self {
            ElementKind::Int8 => "Int8Array",
            ElementKind::Uint8 => "Uint8Array",
            ElementKind::Uint8Clamped => "Uint8ClampedArray",
            ElementKind::Int16 => "Int16Array",
            ElementKind::Uint16 => "Uint16Array",
            ElementKind::Int32 => "Int32Array",
            ElementKind::Uint32 => "Uint32Array",
            ElementKind::Float32 => "Float32Array",
            ElementKind::Float64 => "Float64Array",
        }
    }

    /// Check whether `value` is a multiple of the element size.
    #[inline]
    pub fn is_aligned(self, value: usize) -> bool {
        value & (self.size() - 1) == 0
    }

    /// Load one element from `bytes`, which must be exactly `size()` long.
    pub fn load(self, bytes: &[u8]) -> Dynamic {
        match self {
            ElementKind::Int8 => Dynamic::Int(i64::from(bytes[0] as i8)),
            ElementKind::Uint8 | ElementKind::Uint8Clamped => Dynamic::Int(i64::from(bytes[0])),
            ElementKind::Int16 => Dynamic::Int(i64::from(i16::from_le_bytes([bytes[0], bytes[1]]))),
            ElementKind::Uint16 => Dynamic::Int(i64::from(u16::from_le_bytes([bytes[0], bytes[1]]))),
            ElementKind::Int32 => Dynamic::Int(i64::from(i32::from_le_bytes(word(bytes)))),
            ElementKind::Uint32 => Dynamic::Int(i64::from(u32::from_le_bytes(word(bytes)))),
            ElementKind::Float32 => Dynamic::Float(f64::from(f32::from_le_bytes(word(bytes)))),
            ElementKind::Float64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                Dynamic::Float(f64::from_le_bytes(raw))
            }
        }
    }

    /// Store a number into one element, converting per the element kind.
    pub fn store(self, bytes: &mut [u8], value: f64) {
        match self {
            ElementKind::Int8 => bytes[0] = to_int32(value) as i8 as u8,
            ElementKind::Uint8 => bytes[0] = to_uint32(value) as u8,
            ElementKind::Uint8Clamped => bytes[0] = to_uint8_clamp(value),
            ElementKind::Int16 => bytes[..2].copy_from_slice(&(to_int32(value) as i16).to_le_bytes()),
            ElementKind::Uint16 => bytes[..2].copy_from_slice(&(to_uint32(value) as u16).to_le_bytes()),
            ElementKind::Int32 => bytes[..4].copy_from_slice(&to_int32(value).to_le_bytes()),
            ElementKind::Uint32 => bytes[..4].copy_from_slice(&to_uint32(value).to_le_bytes()),
            ElementKind::Float32 => bytes[..4].copy_from_slice(&(value as f32).to_le_bytes()),
            ElementKind::Float64 => bytes[..8].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

fn word(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

/// Native scalar types that can fill a typed view directly.
pub trait Element: Copy + 'static {
    /// Size of the native type in bytes.
    const SIZE: usize;

    /// Write the little-endian representation into `out`.
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl Element for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn write_le(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_element!(i8, u8, i16, u16, i32, u32, f32, f64);

/// Encode a native slice as little-endian bytes.
pub fn encode_elements<T: Element>(values: &[T]) -> Vec<u8> {
    let mut bytes = vec![0u8; values.len() * T::SIZE];
    for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(T::SIZE)) {
        value.write_le(chunk);
    }
    bytes
}
