//! Native object bridge for a garbage-collected script host.
//!
//! Script-visible objects live on the host heap and reach their native state
//! through an internal slot. The bridge creates them behind a construction
//! gate, keeps the slot in sync, and tears the native side down exactly once:
//! either on explicit disposal or when the collector finds the object
//! unreachable.
//!
//! ```text
//! Context ── init/teardown ──► Isolate
//!                                ├── ClassRegistry (descriptors, gates)
//!                                └── ObjectHeap (objects, roots, weak entries)
//! ```
//!
//! The built-in modules provide `ArrayBuffer` with the nine typed views and a
//! set of WebGL-style handle classes.

pub mod context;
pub mod properties;

pub use context::{Context, ContextError};
pub use properties::{ContextProperties, ContextProperty};

pub use hostbridge_core::{
    ConversionError, Dynamic, Element, ElementKind, ErrorKind, FromDynamic, GcStats, HeapError, HostObject,
    IntoDynamic, NativeError, ObjectHandle, PropertyAttributes, RawBuffer, RegistrationError, TypeHash, to_host_array,
};
pub use hostbridge_modules::{default_modules, graphics, typed_array};
pub use hostbridge_registry::{
    CallContext, ClassBuilder, ClassDescriptor, ConstructionGate, ConstructorMode, Isolate, Module,
};
