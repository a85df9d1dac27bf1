//! Host runtime instance.
//!
//! An [`Isolate`] owns the object heap and the class registry. It provides
//! the operations script code performs on bridged objects (`new`, method
//! calls, property and index access) and, in [`bridge`](crate::bridge), the
//! object bridge operations native code uses.

use std::rc::Rc;

use hostbridge_core::{
    Dynamic, GcStats, HeapError, HostObject, NativeError, ObjectHandle, ObjectHeap, RegistrationError, TypeHash,
};

use crate::CallContext;
use crate::class::{ClassDescriptor, Constructor};
use crate::registry::ClassRegistry;

/// Default upper bound for a single raw buffer, in bytes.
pub const DEFAULT_MAX_BUFFER_LENGTH: usize = u32::MAX as usize;

/// One host runtime: heap plus registered classes.
#[derive(Debug)]
pub struct Isolate {
    heap: ObjectHeap,
    registry: ClassRegistry,
    max_buffer_length: usize,
}

impl Isolate {
    pub fn new() -> Self {
        Self::with_heap(ObjectHeap::new())
    }

    pub fn with_heap(heap: ObjectHeap) -> Self {
        Self {
            heap,
            registry: ClassRegistry::new(),
            max_buffer_length: DEFAULT_MAX_BUFFER_LENGTH,
        }
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut self.heap
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Largest raw buffer that may be allocated, in bytes.
    pub fn max_buffer_length(&self) -> usize {
        self.max_buffer_length
    }

    pub fn set_max_buffer_length(&mut self, length: usize) {
        self.max_buffer_length = length;
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a class. A second registration of the same class is a no-op.
    pub fn initialize(&mut self, descriptor: ClassDescriptor) -> Result<bool, RegistrationError> {
        self.registry.initialize(descriptor)
    }

    /// Release a class. Instances stop passing `has_instance`.
    pub fn uninitialize(&mut self, class: TypeHash) -> bool {
        self.registry.uninitialize(class)
    }

    pub(crate) fn class_name(&self, class: TypeHash) -> String {
        self.registry
            .get(class)
            .map_or_else(|| class.to_string(), |entry| entry.descriptor().name().to_string())
    }

    // ========================================================================
    // Instantiation
    // ========================================================================

    /// Instantiate a class template by invoking its constructor entry point.
    ///
    /// Gated classes fail with "Illegal constructor" unless the class gate is
    /// open. A failing constructor body leaves no object behind.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn instantiate(&mut self, class: TypeHash, args: &[Dynamic]) -> Result<ObjectHandle, NativeError> {
        let entry = self
            .registry
            .get(class)
            .ok_or_else(|| NativeError::type_error(format!("{} is not a constructor", class)))?;
        let descriptor = Rc::clone(entry.descriptor());
        let registration = entry.registration();

        if matches!(descriptor.constructor(), Constructor::Gated) && !entry.gate().is_open() {
            return Err(NativeError::IllegalConstructor {
                class: descriptor.name().to_string(),
            });
        }

        let handle = self.heap.allocate(HostObject::new(class).with_registration(registration))?;
        if let Constructor::Public(body) = descriptor.constructor() {
            let mut ctx = CallContext::for_construct(self, handle, args);
            if let Err(err) = body.call(&mut ctx) {
                self.heap.free(handle);
                return Err(err);
            }
        }
        log::trace!("instantiated {} as {:?}", descriptor.name(), handle);
        Ok(handle)
    }

    /// Script `new Name(args...)`.
    pub fn construct(&mut self, name: &str, args: &[Dynamic]) -> Result<ObjectHandle, NativeError> {
        let class = self
            .registry
            .lookup_global(name)
            .ok_or_else(|| NativeError::type_error(format!("{} is not defined", name)))?;
        self.instantiate(class, args)
    }

    // ========================================================================
    // Script operations
    // ========================================================================

    fn receiver(&self, value: &Dynamic) -> Result<ObjectHandle, NativeError> {
        match value {
            Dynamic::Object(handle) if self.heap.contains(*handle) => Ok(*handle),
            Dynamic::Object(_) => Err(HeapError::StaleHandle.into()),
            other => Err(NativeError::type_error(format!(
                "Cannot access members of {}",
                other.type_name()
            ))),
        }
    }

    /// Script `receiver.name(args...)`.
    pub fn call_method(&mut self, receiver: &Dynamic, name: &str, args: &[Dynamic]) -> Result<Dynamic, NativeError> {
        let handle = self.receiver(receiver)?;
        let class = self.heap.get(handle).map(HostObject::class).unwrap_or(TypeHash::EMPTY);
        let method = self.registry.find_method(class, name).ok_or_else(|| {
            NativeError::type_error(format!("Object has no method '{}'", name))
        })?;

        let mut ctx = CallContext::new(self, Some(handle), args);
        method.call(&mut ctx)?;
        Ok(ctx.take_return())
    }

    /// Script `receiver.name`: own properties, then class constants.
    pub fn get_property(&self, receiver: &Dynamic, name: &str) -> Result<Dynamic, NativeError> {
        if !matches!(receiver, Dynamic::Object(_)) {
            if receiver.is_nullish() {
                return Err(NativeError::type_error(format!(
                    "Cannot read property '{}' of {}",
                    name,
                    receiver.type_name()
                )));
            }
            return Ok(Dynamic::Undefined);
        }
        let handle = self.receiver(receiver)?;
        if let Some(value) = self.heap.get_property(handle, name) {
            return Ok(value);
        }
        let class = self.heap.get(handle).map(HostObject::class).unwrap_or(TypeHash::EMPTY);
        Ok(self.registry.find_constant(class, name).unwrap_or_default())
    }

    /// Script `receiver.name = value`. Returns false if the property is read-only.
    pub fn set_property(&mut self, receiver: &Dynamic, name: &str, value: Dynamic) -> Result<bool, NativeError> {
        let handle = self.receiver(receiver)?;
        let class = self.heap.get(handle).map(HostObject::class).unwrap_or(TypeHash::EMPTY);
        if self.heap.get_property(handle, name).is_none() && self.registry.find_constant(class, name).is_some() {
            return Ok(false);
        }
        Ok(self.heap.set_property(handle, name, value)?)
    }

    /// Script `ClassName.name`: a constant read off the constructor.
    pub fn constructor_property(&self, class_name: &str, name: &str) -> Result<Dynamic, NativeError> {
        let class = self
            .registry
            .lookup_global(class_name)
            .ok_or_else(|| NativeError::type_error(format!("{} is not defined", class_name)))?;
        let declared = self
            .registry
            .get(class)
            .and_then(|entry| entry.descriptor().constant(name).cloned());
        Ok(declared.unwrap_or_default())
    }

    /// Script `receiver[index]`.
    pub fn get_index(&self, receiver: &Dynamic, index: usize) -> Result<Dynamic, NativeError> {
        let handle = self.receiver(receiver)?;
        Ok(self.heap.get_element(handle, index)?)
    }

    /// Script `receiver[index] = value`.
    pub fn set_index(&mut self, receiver: &Dynamic, index: usize, value: &Dynamic) -> Result<(), NativeError> {
        let handle = self.receiver(receiver)?;
        Ok(self.heap.set_element(handle, index, value)?)
    }

    /// Run a collection cycle, delivering due finalizers.
    pub fn collect_garbage(&mut self) -> GcStats {
        self.heap.collect_garbage()
    }

    /// Name of the class `value` was instantiated from.
    pub fn class_name_of(&self, value: &Dynamic) -> Option<String> {
        let handle = value.as_object()?;
        let class = self.heap.get(handle)?.class();
        (!class.is_empty()).then(|| self.class_name(class))
    }
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new()
    }
}
