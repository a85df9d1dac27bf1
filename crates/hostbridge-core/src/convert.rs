//! Scalar marshaling between host values and native types.
//!
//! This module provides the conversion traits used by native entry points:
//! - [`FromDynamic`]: extract a native value from a [`Dynamic`], reporting failure
//! - [`IntoDynamic`]: convert a native value into a [`Dynamic`]
//!
//! It also holds the host's numeric coercions ([`to_number`], [`to_int32`],
//! [`to_uint32`], [`to_uint8_clamp`]). Those never fail; they are used where
//! the host itself coerces, such as element stores into typed views.
//!
//! ## Supported Types
//!
//! - `bool` (truthiness, never fails)
//! - `i32`, `u32` (numbers and booleans, wrapped modulo 2^32)
//! - `f64`, `f32` (numbers and booleans)
//! - `String` (strings, numbers and booleans)
//! - `ObjectHandle`, `Option<ObjectHandle>`
//!
//! ## Example
//!
//! ```ignore
//! let length: u32 = u32::from_dynamic(&Dynamic::Float(4.0))?;
//! let back: Dynamic = length.into_dynamic();
//! ```

use crate::error::{ConversionError, HeapError};
use crate::runtime::{Dynamic, HostObject, ObjectHandle, ObjectHeap};

/// Extract a native value from a host value.
pub trait FromDynamic: Sized {
    /// Convert the given value.
    ///
    /// Returns a `ConversionError` if the value cannot become `Self`.
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError>;
}

/// Convert a native value into a host value.
pub trait IntoDynamic {
    /// Convert this value into a host value.
    fn into_dynamic(self) -> Dynamic;
}

// ============================================================================
// Host numeric coercions
// ============================================================================

/// Host `ToNumber`. Non-numeric values become NaN.
pub fn to_number(value: &Dynamic) -> f64 {
    match value {
        Dynamic::Undefined => f64::NAN,
        Dynamic::Null => 0.0,
        Dynamic::Bool(b) => f64::from(u8::from(*b)),
        Dynamic::Int(v) => *v as f64,
        Dynamic::Float(v) => *v,
        Dynamic::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Dynamic::Object(_) => f64::NAN,
    }
}

/// Host `ToBoolean`.
pub fn to_boolean(value: &Dynamic) -> bool {
    match value {
        Dynamic::Undefined | Dynamic::Null => false,
        Dynamic::Bool(b) => *b,
        Dynamic::Int(v) => *v != 0,
        Dynamic::Float(v) => *v != 0.0 && !v.is_nan(),
        Dynamic::String(s) => !s.is_empty(),
        Dynamic::Object(_) => true,
    }
}

/// Truncate toward zero and reduce modulo 2^32.
fn wrap_u32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let truncated = value.trunc();
    truncated.rem_euclid(4_294_967_296.0) as u32
}

/// Host `ToInt32`: wrapping conversion, NaN and infinities become 0.
pub fn to_int32(value: f64) -> i32 {
    wrap_u32(value) as i32
}

/// Host `ToUint32`: wrapping conversion, NaN and infinities become 0.
pub fn to_uint32(value: f64) -> u32 {
    wrap_u32(value)
}

/// Host `ToUint8Clamp`: saturate to `0..=255`, rounding ties to even.
pub fn to_uint8_clamp(value: f64) -> u8 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    if value >= 255.0 {
        return 255;
    }
    let floor = value.floor();
    let diff = value - floor;
    let rounded = if diff > 0.5 {
        floor + 1.0
    } else if diff < 0.5 {
        floor
    } else if floor % 2.0 == 0.0 {
        floor
    } else {
        floor + 1.0
    };
    rounded as u8
}

fn numeric(value: &Dynamic, expected: &'static str) -> Result<f64, ConversionError> {
    match value {
        Dynamic::Int(v) => Ok(*v as f64),
        Dynamic::Float(v) => Ok(*v),
        Dynamic::Bool(b) => Ok(f64::from(u8::from(*b))),
        other => Err(ConversionError::TypeMismatch {
            expected,
            actual: other.type_name(),
        }),
    }
}

// ============================================================================
// FromDynamic implementations
// ============================================================================

impl FromDynamic for bool {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        Ok(to_boolean(value))
    }
}

impl FromDynamic for f64 {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        numeric(value, "double")
    }
}

impl FromDynamic for f32 {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        numeric(value, "float").map(|v| v as f32)
    }
}

impl FromDynamic for i32 {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        numeric(value, "int32").map(to_int32)
    }
}

impl FromDynamic for u32 {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        numeric(value, "uint32").map(to_uint32)
    }
}

impl FromDynamic for String {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        match value {
            Dynamic::String(s) => Ok(s.clone()),
            Dynamic::Bool(b) => Ok(b.to_string()),
            Dynamic::Int(v) => Ok(v.to_string()),
            Dynamic::Float(v) => Ok(format_number(*v)),
            other => Err(ConversionError::TypeMismatch {
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }
}

impl FromDynamic for ObjectHandle {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        match value {
            Dynamic::Object(handle) => Ok(*handle),
            Dynamic::Undefined | Dynamic::Null => Err(ConversionError::NullHandle),
            other => Err(ConversionError::TypeMismatch {
                expected: "object",
                actual: other.type_name(),
            }),
        }
    }
}

impl FromDynamic for Option<ObjectHandle> {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        match value {
            Dynamic::Undefined | Dynamic::Null => Ok(None),
            other => ObjectHandle::from_dynamic(other).map(Some),
        }
    }
}

impl FromDynamic for Dynamic {
    fn from_dynamic(value: &Dynamic) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        (if value > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// ============================================================================
// IntoDynamic implementations
// ============================================================================

macro_rules! impl_into_dynamic_int {
    ($($ty:ty),*) => {
        $(
            impl IntoDynamic for $ty {
                fn into_dynamic(self) -> Dynamic {
                    Dynamic::Int(self as i64)
                }
            }
        )*
    };
}

impl_into_dynamic_int!(i8, i16, i32, u8, u16, u32);

impl IntoDynamic for f64 {
    fn into_dynamic(self) -> Dynamic {
        Dynamic::Float(self)
    }
}

impl IntoDynamic for f32 {
    fn into_dynamic(self) -> Dynamic {
        Dynamic::Float(f64::from(self))
    }
}

impl IntoDynamic for bool {
    fn into_dynamic(self) -> Dynamic {
        Dynamic::Bool(self)
    }
}

impl IntoDynamic for String {
    fn into_dynamic(self) -> Dynamic {
        Dynamic::String(self)
    }
}

impl IntoDynamic for &str {
    fn into_dynamic(self) -> Dynamic {
        Dynamic::String(self.to_string())
    }
}

impl IntoDynamic for () {
    fn into_dynamic(self) -> Dynamic {
        Dynamic::Undefined
    }
}

impl IntoDynamic for ObjectHandle {
    fn into_dynamic(self) -> Dynamic {
        Dynamic::Object(self)
    }
}

impl IntoDynamic for Option<ObjectHandle> {
    fn into_dynamic(self) -> Dynamic {
        self.map_or(Dynamic::Null, Dynamic::Object)
    }
}

impl IntoDynamic for Dynamic {
    fn into_dynamic(self) -> Dynamic {
        self
    }
}

// ============================================================================
// Sequences
// ============================================================================

/// Convert a native slice into a host array, element by element.
pub fn to_host_array<T>(heap: &mut ObjectHeap, values: &[T]) -> Result<Dynamic, HeapError>
where
    T: IntoDynamic + Clone,
{
    let elements = values.iter().cloned().map(IntoDynamic::into_dynamic).collect();
    let handle = heap.allocate(HostObject::array(elements))?;
    Ok(Dynamic::Object(handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_wraps() {
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_int32(-1.5), -1);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
        assert_eq!(to_int32(4_294_967_297.0), 1);
    }

    #[test]
    fn uint32_wraps() {
        assert_eq!(to_uint32(-1.0), u32::MAX);
        assert_eq!(to_uint32(300.7), 300);
        assert_eq!(to_uint32(300.0) as u8, 44);
    }

    #[test]
    fn uint8_clamp_saturates_and_rounds_to_even() {
        assert_eq!(to_uint8_clamp(300.0), 255);
        assert_eq!(to_uint8_clamp(-5.0), 0);
        assert_eq!(to_uint8_clamp(f64::NAN), 0);
        assert_eq!(to_uint8_clamp(1.5), 2);
        assert_eq!(to_uint8_clamp(2.5), 2);
        assert_eq!(to_uint8_clamp(2.6), 3);
    }

    #[test]
    fn to_number_coercions() {
        assert!(to_number(&Dynamic::Undefined).is_nan());
        assert_eq!(to_number(&Dynamic::Null), 0.0);
        assert_eq!(to_number(&Dynamic::Bool(true)), 1.0);
        assert_eq!(to_number(&Dynamic::String(" 12.5 ".into())), 12.5);
        assert!(to_number(&Dynamic::String("abc".into())).is_nan());
    }

    #[test]
    fn scalar_conversions_report_failure() {
        assert_eq!(i32::from_dynamic(&Dynamic::Float(3.9)), Ok(3));
        assert_eq!(u32::from_dynamic(&Dynamic::Bool(true)), Ok(1));
        assert!(matches!(
            u32::from_dynamic(&Dynamic::String("4".into())),
            Err(ConversionError::TypeMismatch { expected: "uint32", actual: "string" })
        ));
        assert!(f64::from_dynamic(&Dynamic::Undefined).is_err());
        assert_eq!(bool::from_dynamic(&Dynamic::String(String::new())), Ok(false));
    }

    #[test]
    fn string_conversion() {
        assert_eq!(String::from_dynamic(&Dynamic::Int(7)), Ok("7".to_string()));
        assert_eq!(String::from_dynamic(&Dynamic::Float(1.5)), Ok("1.5".to_string()));
        assert_eq!(String::from_dynamic(&Dynamic::Float(2.0)), Ok("2".to_string()));
        assert!(String::from_dynamic(&Dynamic::Null).is_err());
    }

    #[test]
    fn object_handle_conversion() {
        let handle = ObjectHandle::new(1, 3, 1);
        assert_eq!(Option::<ObjectHandle>::from_dynamic(&Dynamic::Null), Ok(None));
        assert_eq!(
            Option::<ObjectHandle>::from_dynamic(&Dynamic::Object(handle)),
            Ok(Some(handle))
        );
        assert_eq!(
            ObjectHandle::from_dynamic(&Dynamic::Undefined),
            Err(ConversionError::NullHandle)
        );
        assert_eq!(None::<ObjectHandle>.into_dynamic(), Dynamic::Null);
    }

    #[test]
    fn native_array_to_host_sequence() {
        let mut heap = ObjectHeap::new();
        let array = to_host_array(&mut heap, &[1i32, 2, 3]).unwrap();
        let handle = array.as_object().unwrap();
        assert_eq!(heap.get_property(handle, "length"), Some(Dynamic::Int(3)));
        assert_eq!(heap.get_element(handle, 1), Ok(Dynamic::Int(2)));
        assert_eq!(heap.get_element(handle, 5), Ok(Dynamic::Undefined));
    }
}
