//! The script-facing context.
//!
//! A `Context` owns the installed modules, the configuration and, between
//! [`init`](Context::init) and [`teardown`](Context::teardown), one
//! [`Isolate`]: the host heap plus the class registry.
//!
//! # Example
//!
//! ```ignore
//! use hostbridge::{Context, Dynamic};
//!
//! let mut ctx = Context::with_default_modules()?;
//! let view = ctx.construct("Float32Array", &[Dynamic::Int(4)])?;
//! ctx.set_index(&view, 0, &Dynamic::Float(1.5))?;
//! ctx.teardown();
//! ```

use thiserror::Error;

use hostbridge_core::{Dynamic, GcStats, HostObject, NativeError, ObjectHandle, PropertyAttributes, RegistrationError, TypeHash};
use hostbridge_modules::default_modules;
use hostbridge_registry::{Isolate, Module};

use crate::properties::{ContextProperties, ContextProperty};

/// Process-wide owner of the host runtime.
///
/// Modules installed before `init` are registered when the isolate is
/// created; modules installed afterwards are registered immediately and again
/// on every later `init`.
pub struct Context {
    modules: Vec<Module>,
    properties: ContextProperties,
    isolate: Option<Isolate>,
    /// Rooted object holding script globals
    globals: Option<ObjectHandle>,
}

impl Context {
    /// Create an uninitialized context with no modules.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            properties: ContextProperties::new(),
            isolate: None,
            globals: None,
        }
    }

    /// Create and initialize a context with the default modules installed.
    ///
    /// # Errors
    ///
    /// Returns an error if any default module fails to register.
    pub fn with_default_modules() -> Result<Self, ContextError> {
        let mut ctx = Self::new();
        for module in default_modules() {
            ctx.install(module)?;
        }
        ctx.init()?;
        Ok(ctx)
    }

    /// Install a module.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Registration` if the context is initialized and
    /// the module's classes fail to register.
    pub fn install(&mut self, module: Module) -> Result<(), ContextError> {
        if let Some(isolate) = self.isolate.as_mut() {
            module.install(isolate)?;
        }
        self.modules.push(module);
        Ok(())
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the isolate, apply the configuration and register every
    /// installed module. A no-op if already initialized.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Registration` if a class fails to register; the
    /// context is left uninitialized.
    pub fn init(&mut self) -> Result<(), ContextError> {
        if self.isolate.is_some() {
            return Ok(());
        }

        let mut isolate = Isolate::new();
        self.apply_properties(&mut isolate);
        for module in &self.modules {
            module.install(&mut isolate)?;
        }

        let heap = isolate.heap_mut();
        let globals = heap.allocate(HostObject::plain()).map_err(NativeError::from)?;
        heap.root(globals);

        log::debug!(
            "context initialized: {} modules, {} classes",
            self.modules.len(),
            isolate.registry().len()
        );
        self.isolate = Some(isolate);
        self.globals = Some(globals);
        Ok(())
    }

    /// Unregister every module and drop the isolate.
    ///
    /// With `FinalizeOnTeardown` set, pending weak finalizers are delivered
    /// first; otherwise natives are dropped along with the heap.
    pub fn teardown(&mut self) {
        let Some(mut isolate) = self.isolate.take() else {
            return;
        };
        self.globals = None;

        if self.properties.get(ContextProperty::FinalizeOnTeardown) != 0 {
            let finalized = isolate.heap_mut().finalize_all();
            log::debug!("delivered {} finalizers at teardown", finalized);
        }
        for module in self.modules.iter().rev() {
            module.uninstall(&mut isolate);
        }
        log::debug!("context torn down");
    }

    pub fn is_initialized(&self) -> bool {
        self.isolate.is_some()
    }

    fn apply_properties(&self, isolate: &mut Isolate) {
        let heap = isolate.heap_mut();
        heap.set_limit(self.properties.get(ContextProperty::MaxHeapObjects));
        heap.set_grouped_delay(
            u32::try_from(self.properties.get(ContextProperty::GroupedFinalizerDelay)).unwrap_or(u32::MAX),
        );
        isolate.set_max_buffer_length(self.properties.get(ContextProperty::MaxBufferLength));
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Set a property; takes effect immediately on an initialized context.
    pub fn set_property(&mut self, property: ContextProperty, value: usize) {
        self.properties.set(property, value);
        if let Some(mut isolate) = self.isolate.take() {
            self.apply_properties(&mut isolate);
            self.isolate = Some(isolate);
        }
    }

    pub fn property(&self, property: ContextProperty) -> usize {
        self.properties.get(property)
    }

    // ========================================================================
    // Script surface
    // ========================================================================

    /// The isolate, if initialized.
    ///
    /// # Errors
    ///
    /// `ContextError::NotInitialized` before `init` or after `teardown`.
    pub fn isolate(&self) -> Result<&Isolate, ContextError> {
        self.isolate.as_ref().ok_or(ContextError::NotInitialized)
    }

    pub fn isolate_mut(&mut self) -> Result<&mut Isolate, ContextError> {
        self.isolate.as_mut().ok_or(ContextError::NotInitialized)
    }

    /// Script `new name(args...)`.
    ///
    /// Allocation failure yields `undefined` rather than an error.
    pub fn construct(&mut self, name: &str, args: &[Dynamic]) -> Result<Dynamic, ContextError> {
        let isolate = self.isolate_mut()?;
        if isolate.registry().lookup_global(name).is_none() {
            return Err(ContextError::UnknownGlobal { name: name.to_string() });
        }
        match isolate.construct(name, args) {
            Ok(handle) => Ok(Dynamic::Object(handle)),
            Err(NativeError::AllocationFailed) => {
                log::debug!("allocation failed constructing {}", name);
                Ok(Dynamic::Undefined)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Script `receiver.name(args...)`.
    pub fn call_method(&mut self, receiver: &Dynamic, name: &str, args: &[Dynamic]) -> Result<Dynamic, ContextError> {
        Ok(self.isolate_mut()?.call_method(receiver, name, args)?)
    }

    pub fn get_property(&self, receiver: &Dynamic, name: &str) -> Result<Dynamic, ContextError> {
        Ok(self.isolate()?.get_property(receiver, name)?)
    }

    /// Returns false if the property is read-only and the write was ignored.
    pub fn set_property_of(&mut self, receiver: &Dynamic, name: &str, value: Dynamic) -> Result<bool, ContextError> {
        Ok(self.isolate_mut()?.set_property(receiver, name, value)?)
    }

    /// Script `ClassName.name`.
    pub fn constructor_property(&self, class_name: &str, name: &str) -> Result<Dynamic, ContextError> {
        Ok(self.isolate()?.constructor_property(class_name, name)?)
    }

    pub fn get_index(&self, receiver: &Dynamic, index: usize) -> Result<Dynamic, ContextError> {
        Ok(self.isolate()?.get_index(receiver, index)?)
    }

    pub fn set_index(&mut self, receiver: &Dynamic, index: usize, value: &Dynamic) -> Result<(), ContextError> {
        Ok(self.isolate_mut()?.set_index(receiver, index, value)?)
    }

    /// Structural instance check against a registered class, global or hidden.
    pub fn has_instance(&self, value: &Dynamic, class_name: &str) -> bool {
        self.isolate
            .as_ref()
            .is_some_and(|isolate| isolate.has_instance(value, TypeHash::from_name(class_name)))
    }

    // ========================================================================
    // Globals
    // ========================================================================

    fn globals(&self) -> Result<ObjectHandle, ContextError> {
        self.globals.ok_or(ContextError::NotInitialized)
    }

    /// Bind a script global. Globals keep their values reachable.
    pub fn set_global(&mut self, name: &str, value: Dynamic) -> Result<(), ContextError> {
        let globals = self.globals()?;
        self.isolate_mut()?
            .heap_mut()
            .define_property(globals, name, value, PropertyAttributes::empty())
            .map_err(NativeError::from)?;
        Ok(())
    }

    /// Value of a script global, `undefined` if unbound.
    pub fn get_global(&self, name: &str) -> Result<Dynamic, ContextError> {
        let globals = self.globals()?;
        Ok(self.isolate()?.heap().get_property(globals, name).unwrap_or_default())
    }

    /// Unbind a script global. Returns false if it was not bound.
    pub fn delete_global(&mut self, name: &str) -> Result<bool, ContextError> {
        let globals = self.globals()?;
        let heap = self.isolate_mut()?.heap_mut();
        if heap.get_property(globals, name).is_none() {
            return Ok(false);
        }
        Ok(heap.delete_property(globals, name).map_err(NativeError::from)?)
    }

    /// Run a collection cycle.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&mut self) -> Result<GcStats, ContextError> {
        Ok(self.isolate_mut()?.collect_garbage())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Errors that can occur during context operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContextError {
    /// No isolate: `init` not called, or `teardown` already ran
    #[error("context is not initialized")]
    NotInitialized,

    /// A class failed to register
    #[error("failed to register module: {0}")]
    Registration(#[from] RegistrationError),

    /// A script-visible error raised by a native entry point
    #[error("{kind}: {0}", kind = .0.kind().name())]
    Native(#[from] NativeError),

    /// `new` on a name with no global class binding
    #[error("{name} is not defined")]
    UnknownGlobal { name: String },
}

impl ContextError {
    /// The script-visible error, if this is one.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            ContextError::Native(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::ErrorKind;
    use hostbridge_registry::ClassBuilder;

    #[test]
    fn context_new_is_uninitialized() {
        let mut ctx = Context::new();
        assert!(!ctx.is_initialized());
        assert_eq!(ctx.module_count(), 0);
        assert_eq!(ctx.construct("ArrayBuffer", &[]), Err(ContextError::NotInitialized));
    }

    #[test]
    fn context_with_default_modules() {
        let ctx = Context::with_default_modules().unwrap();
        assert!(ctx.is_initialized());
        assert_eq!(ctx.module_count(), 1);
        assert!(ctx.isolate().unwrap().registry().lookup_global("Uint8Array").is_some());
    }

    #[test]
    fn init_is_idempotent() {
        let mut ctx = Context::with_default_modules().unwrap();
        ctx.set_global("x", Dynamic::Int(1)).unwrap();
        ctx.init().unwrap();
        assert_eq!(ctx.get_global("x"), Ok(Dynamic::Int(1)));
    }

    #[test]
    fn teardown_then_reinit() {
        let mut ctx = Context::with_default_modules().unwrap();
        let view = ctx.construct("Int8Array", &[Dynamic::Int(2)]).unwrap();
        ctx.teardown();
        assert!(!ctx.is_initialized());
        assert_eq!(ctx.get_index(&view, 0), Err(ContextError::NotInitialized));

        ctx.init().unwrap();
        assert!(ctx.construct("Int8Array", &[Dynamic::Int(2)]).unwrap().as_object().is_some());
        assert_eq!(ctx.get_global("x"), Ok(Dynamic::Undefined));
    }

    #[test]
    fn handles_do_not_survive_reinit() {
        let mut ctx = Context::with_default_modules().unwrap();
        let old = ctx.construct("Int8Array", &[Dynamic::Int(2)]).unwrap();
        ctx.teardown();
        ctx.init().unwrap();
        let fresh = ctx.construct("Float64Array", &[Dynamic::Int(7)]).unwrap();

        assert_eq!(ctx.get_property(&fresh, "length"), Ok(Dynamic::Int(7)));
        let err = ctx.get_property(&old, "length").unwrap_err();
        assert_eq!(err.native().map(NativeError::kind), Some(ErrorKind::TypeError));
        assert!(ctx.get_index(&old, 0).is_err());
        assert!(ctx.set_index(&old, 0, &Dynamic::Int(1)).is_err());
        assert!(!ctx.has_instance(&old, "Float64Array"));
        assert!(!ctx.has_instance(&old, "Int8Array"));
    }

    #[test]
    fn install_after_init_registers_immediately() {
        let mut ctx = Context::with_default_modules().unwrap();
        ctx.install(Module::new("extra").class(ClassBuilder::new("Extra").build()))
            .unwrap();
        assert!(ctx.isolate().unwrap().registry().lookup_global("Extra").is_some());
    }

    #[test]
    fn empty_class_name_fails_install() {
        let mut ctx = Context::new();
        ctx.install(Module::new("a").class(ClassBuilder::new("A").build()))
            .unwrap();
        ctx.install(Module::new("b").class(ClassBuilder::new("B").build()))
            .unwrap();
        ctx.init().unwrap();

        let err = ctx
            .install(Module::new("empty").class(ClassBuilder::new("").build()))
            .unwrap_err();
        assert_eq!(err, ContextError::Registration(RegistrationError::EmptyName));
    }

    #[test]
    fn unknown_global() {
        let mut ctx = Context::with_default_modules().unwrap();
        assert_eq!(
            ctx.construct("Nope", &[]),
            Err(ContextError::UnknownGlobal { name: "Nope".to_string() })
        );
        assert_eq!(
            ctx.construct("ArrayBufferView", &[]),
            Err(ContextError::UnknownGlobal { name: "ArrayBufferView".to_string() })
        );
    }

    #[test]
    fn allocation_failure_is_undefined() {
        let mut ctx = Context::with_default_modules().unwrap();
        ctx.set_property(ContextProperty::MaxBufferLength, 16);
        assert_eq!(ctx.construct("Float64Array", &[Dynamic::Int(3)]), Ok(Dynamic::Undefined));
        assert!(ctx.construct("Float64Array", &[Dynamic::Int(2)]).unwrap().as_object().is_some());
    }

    #[test]
    fn heap_limit_is_allocation_failure() {
        let mut ctx = Context::new();
        for module in default_modules() {
            ctx.install(module).unwrap();
        }
        // globals object plus one buffer
        ctx.set_property(ContextProperty::MaxHeapObjects, 2);
        ctx.init().unwrap();

        assert!(ctx.construct("ArrayBuffer", &[Dynamic::Int(4)]).unwrap().as_object().is_some());
        assert_eq!(ctx.construct("ArrayBuffer", &[Dynamic::Int(4)]), Ok(Dynamic::Undefined));
    }

    #[test]
    fn globals_keep_values_alive() {
        let mut ctx = Context::with_default_modules().unwrap();
        let kept = ctx.construct("ArrayBuffer", &[Dynamic::Int(4)]).unwrap();
        let dropped = ctx.construct("ArrayBuffer", &[Dynamic::Int(4)]).unwrap();
        ctx.set_global("kept", kept.clone()).unwrap();

        let stats = ctx.collect_garbage().unwrap();
        assert_eq!(stats.collected, 1);
        assert!(ctx.has_instance(&kept, "ArrayBuffer"));
        assert!(!ctx.has_instance(&dropped, "ArrayBuffer"));

        assert_eq!(ctx.delete_global("kept"), Ok(true));
        assert_eq!(ctx.delete_global("kept"), Ok(false));
        ctx.collect_garbage().unwrap();
        assert!(!ctx.has_instance(&kept, "ArrayBuffer"));
    }

    #[test]
    fn native_errors_keep_their_kind() {
        let mut ctx = Context::with_default_modules().unwrap();
        let err = ctx.construct("ArrayBuffer", &[]).unwrap_err();
        assert_eq!(err.native().map(NativeError::kind), Some(ErrorKind::TypeError));
        assert!(err.to_string().starts_with("TypeError: "));
    }
}
