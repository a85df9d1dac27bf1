//! Core types for the hostbridge object bridge.
//!
//! - [`runtime`] - host values, the object heap, raw buffers
//! - [`convert`] - scalar marshaling
//! - [`element_kind`] - element kinds for indexed data
//! - [`error`] - error types
//! - [`type_hash`] - class identity

pub mod convert;
pub mod element_kind;
pub mod error;
pub mod runtime;
pub mod type_hash;

pub use convert::{FromDynamic, IntoDynamic, to_host_array};
pub use element_kind::{Element, ElementKind, encode_elements};
pub use error::{ConversionError, ErrorKind, HeapError, NativeError, RegistrationError};
pub use runtime::{
    Dynamic, Finalizer, GcStats, HostObject, IndexedData, MAX_ARRAY_GAP, MAX_ARRAY_INDEX, ObjectHandle, ObjectHeap,
    Property, PropertyAttributes, RawBuffer,
};
pub use type_hash::TypeHash;
