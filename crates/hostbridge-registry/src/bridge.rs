//! Object bridge.
//!
//! Ties one native instance to one host object for the object's lifetime.
//!
//! ```text
//!  create(class)        attach(native, weak)          detach / GC
//! ──────────────► obj ─────────────────────► obj ──────────────────► obj
//!  gate open for        internal slot = native       slot cleared,
//!  instantiation        weak: finalizer + independent native dropped once
//!                       strong: rooted until detach
//! ```
//!
//! A native instance is moved into the slot on attach, so it can never be
//! reachable from two host objects. Destruction happens exactly once: either
//! [`Isolate::detach`] drops it and clears the weak entry, or the collector
//! takes it out of the slot and hands it to the finalizer.

use std::any::Any;

use hostbridge_core::{Dynamic, HeapError, NativeError, ObjectHandle, TypeHash};

use crate::Isolate;
use crate::gate::ConstructorMode;

impl Isolate {
    /// Create a host object of `class`, opening its construction gate for the
    /// duration of the instantiation.
    ///
    /// Classes with a public constructor run their constructor body with `args`.
    ///
    /// # Errors
    ///
    /// `AllocationFailed` if the heap cannot hold another object; any error of
    /// the constructor body.
    pub fn create(&mut self, class: TypeHash, args: &[Dynamic]) -> Result<ObjectHandle, NativeError> {
        let gate = self
            .registry()
            .get(class)
            .map(|entry| entry.gate().clone())
            .ok_or_else(|| NativeError::type_error(format!("class {} is not registered", class)))?;
        let _mode = ConstructorMode::enter(&gate);
        self.instantiate(class, args)
    }

    /// Store `native` in the internal slot of `handle`.
    ///
    /// With `weak`, the object is held weakly and marked independent; when it
    /// becomes unreachable the collector drops `native`. Without `weak`, the
    /// object is rooted until [`detach`](Self::detach).
    pub fn attach<T: Any>(&mut self, handle: ObjectHandle, native: T, weak: bool) -> Result<(), NativeError> {
        let heap = self.heap_mut();
        if !heap.contains(handle) {
            return Err(HeapError::StaleHandle.into());
        }
        if heap.has_internal(handle) {
            return Err(NativeError::invalid_this("object already has a native instance"));
        }

        let type_name = std::any::type_name::<T>();
        heap.set_internal(handle, Box::new(native))?;
        if weak {
            heap.make_weak(
                handle,
                Box::new(move |native: Box<dyn Any>| {
                    drop(native);
                    log::debug!("finalized {}", type_name);
                }),
            )?;
            heap.mark_independent(handle);
        } else {
            heap.root(handle);
        }
        log::debug!(
            "attached {} to {:?} ({})",
            type_name,
            handle,
            if weak { "weak" } else { "strong" }
        );
        Ok(())
    }

    /// Read the native instance. `None` means disposed or never attached.
    pub fn resolve<T: Any>(&self, handle: ObjectHandle) -> Option<&T> {
        self.heap().internal::<T>(handle)
    }

    pub fn resolve_mut<T: Any>(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        self.heap_mut().internal_mut::<T>(handle)
    }

    /// Destroy the native instance now and clear the slot.
    ///
    /// A pending finalizer becomes a no-op. Returns false if there was nothing
    /// to destroy, including after the collector already finalized it.
    pub fn detach(&mut self, handle: ObjectHandle) -> bool {
        let heap = self.heap_mut();
        let Some(native) = heap.take_internal(handle) else {
            return false;
        };
        if !heap.clear_weak(handle) {
            heap.unroot(handle);
        }
        drop(native);
        log::debug!("detached {:?}", handle);
        true
    }

    /// Structural instance check; safe on disposed objects.
    pub fn has_instance(&self, value: &Dynamic, class: TypeHash) -> bool {
        self.registry().has_instance(self.heap(), value, class)
    }

    /// Resolve an object argument expected to be of `class`.
    ///
    /// `null` and `undefined` resolve to `None`.
    ///
    /// # Errors
    ///
    /// - `Type` if the value is not an instance of `class`
    /// - `ObjectDisposed` if the instance has been disposed
    pub fn native_from_dynamic<T: Any>(&self, value: &Dynamic, class: TypeHash) -> Result<Option<&T>, NativeError> {
        if value.is_nullish() {
            return Ok(None);
        }
        if !self.has_instance(value, class) {
            return Err(NativeError::type_error(format!(
                "Type error: expected {}",
                self.class_name(class)
            )));
        }
        value
            .as_object()
            .and_then(|handle| self.resolve::<T>(handle))
            .map(Some)
            .ok_or(NativeError::ObjectDisposed)
    }
}
