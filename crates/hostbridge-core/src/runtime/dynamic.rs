//! Host value type.

use std::fmt;

use super::ObjectHandle;

/// A dynamic value as seen by script code.
///
/// Every value crossing the bridge is one of these. Objects are referred to
/// by handle; the object itself lives in the [`ObjectHeap`](super::ObjectHeap).
#[derive(Clone, Default)]
pub enum Dynamic {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean value
    Bool(bool),
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String value (owned)
    String(String),
    /// Handle to a heap object
    Object(ObjectHandle),
}

impl Dynamic {
    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Dynamic::Undefined => "undefined",
            Dynamic::Null => "null",
            Dynamic::Bool(_) => "boolean",
            Dynamic::Int(_) | Dynamic::Float(_) => "number",
            Dynamic::String(_) => "string",
            Dynamic::Object(_) => "object",
        }
    }

    /// Check if this value is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Dynamic::Undefined)
    }

    /// Check if this value is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Dynamic::Null)
    }

    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Dynamic::Undefined | Dynamic::Null)
    }

    /// Check if this value is a number.
    pub fn is_number(&self) -> bool {
        matches!(self, Dynamic::Int(_) | Dynamic::Float(_))
    }

    /// Get the object handle, if this is an object.
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Dynamic::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Get the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Dynamic::Int(v) => Some(*v as f64),
            Dynamic::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Build a number from a double, keeping integral values as `Int`.
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && value.is_finite() && value.abs() < 9.007_199_254_740_992e15 {
            if value == 0.0 && value.is_sign_negative() {
                return Dynamic::Float(value);
            }
            Dynamic::Int(value as i64)
        } else {
            Dynamic::Float(value)
        }
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamic::Undefined => write!(f, "Undefined"),
            Dynamic::Null => write!(f, "Null"),
            Dynamic::Bool(v) => write!(f, "Bool({})", v),
            Dynamic::Int(v) => write!(f, "Int({})", v),
            Dynamic::Float(v) => write!(f, "Float({})", v),
            Dynamic::String(s) => write!(f, "String({:?})", s),
            Dynamic::Object(h) => write!(f, "Object({:?})", h),
        }
    }
}

impl PartialEq for Dynamic {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Dynamic::Undefined, Dynamic::Undefined) => true,
            (Dynamic::Null, Dynamic::Null) => true,
            (Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
            (Dynamic::String(a), Dynamic::String(b)) => a == b,
            (Dynamic::Object(a), Dynamic::Object(b)) => a == b,
            // Numbers compare by value regardless of representation
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            _ => false,
        }
    }
}
