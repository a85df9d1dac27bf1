//! Built-in class modules for hostbridge.
//!
//! - [`typed_array`] - `ArrayBuffer`, `ArrayBufferView` and the nine typed views
//! - [`graphics`] - WebGL-style handle classes over a [`GraphicsBackend`](graphics::GraphicsBackend)
//!
//! # Usage
//!
//! ```ignore
//! use hostbridge_modules::{default_modules, graphics};
//!
//! let mut isolate = Isolate::new();
//! for module in default_modules() {
//!     module.install(&mut isolate)?;
//! }
//! graphics::module(backend).install(&mut isolate)?;
//! ```

pub mod graphics;
pub mod typed_array;

pub use graphics::{
    BufferSource, BufferTarget, BufferUsage, GlCall, GlError, GraphicsBackend, RecordingBackend, SharedBackend,
};
pub use typed_array::{TypedView, array_data, create_array_buffer, create_from_slice};

use hostbridge_registry::Module;

/// Modules that need no host services.
///
/// Graphics is left out because it needs a backend; install it with
/// [`graphics::module`].
pub fn default_modules() -> Vec<Module> {
    vec![typed_array::module()]
}
