//! Class registry and object bridge.
//!
//! - [`ClassBuilder`] / [`ClassDescriptor`] - per-class registration records
//! - [`ClassRegistry`] - initialized classes and the global namespace
//! - [`ConstructionGate`] / [`ConstructorMode`] - gating of constructor entry points
//! - [`Isolate`] - heap plus registry; script operations and the object bridge
//! - [`CallContext`] / [`NativeFn`] - native entry points
//! - [`Module`] - groups of classes installed together

pub mod bridge;
pub mod call_context;
pub mod class;
pub mod gate;
pub mod isolate;
pub mod module;
pub mod native_fn;
pub mod registry;

pub use call_context::CallContext;
pub use class::{ClassBuilder, ClassDescriptor, Constructor, MethodEntry};
pub use gate::{ConstructionGate, ConstructorMode};
pub use isolate::{DEFAULT_MAX_BUFFER_LENGTH, Isolate};
pub use module::Module;
pub use native_fn::{NativeCallable, NativeFn};
pub use registry::{ClassEntry, ClassRegistry};
