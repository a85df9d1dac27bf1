//! Call context bridging the host and native entry points.

use std::any::Any;

use hostbridge_core::{Dynamic, FromDynamic, IntoDynamic, NativeError, ObjectHandle, ObjectHeap};

use crate::Isolate;

static UNDEFINED: Dynamic = Dynamic::Undefined;

/// Context for native constructor and method calls.
///
/// Gives the entry point its receiver, its arguments and the return slot, and
/// mutable access to the [`Isolate`] for creating and resolving objects.
///
/// ## Typed Argument Access
///
/// ```ignore
/// ctx.require_args(2)?;
/// let target: u32 = ctx.arg(0)?;
/// let value: f64 = ctx.arg(1)?;
/// ```
///
/// Arguments past the end read as `undefined`, as they do in script.
///
/// ## Receiver
///
/// ```ignore
/// let program = ctx.this_native::<Program>()?; // "Object has been disposed" once detached
/// ```
pub struct CallContext<'a> {
    isolate: &'a mut Isolate,
    this: Option<ObjectHandle>,
    args: &'a [Dynamic],
    return_slot: Dynamic,
    construct: bool,
}

impl<'a> CallContext<'a> {
    /// Create a context for a method call on `this`.
    pub fn new(isolate: &'a mut Isolate, this: Option<ObjectHandle>, args: &'a [Dynamic]) -> Self {
        Self {
            isolate,
            this,
            args,
            return_slot: Dynamic::Undefined,
            construct: false,
        }
    }

    /// Create a context for a constructor call populating `this`.
    pub fn for_construct(isolate: &'a mut Isolate, this: ObjectHandle, args: &'a [Dynamic]) -> Self {
        Self {
            construct: true,
            ..Self::new(isolate, Some(this), args)
        }
    }

    /// Whether this call is a constructor invocation.
    pub fn is_construct_call(&self) -> bool {
        self.construct
    }

    /// Get the number of arguments.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn args(&self) -> &'a [Dynamic] {
        self.args
    }

    /// Get a raw argument. Missing arguments are `undefined`.
    pub fn arg_slot(&self, index: usize) -> &'a Dynamic {
        self.args.get(index).unwrap_or(&UNDEFINED)
    }

    /// Fail with "Not enough arguments" unless at least `count` were passed.
    pub fn require_args(&self, count: usize) -> Result<(), NativeError> {
        if self.args.len() < count {
            return Err(NativeError::NotEnoughArguments {
                expected: count,
                actual: self.args.len(),
            });
        }
        Ok(())
    }

    /// Get a typed argument value.
    pub fn arg<T: FromDynamic>(&self, index: usize) -> Result<T, NativeError> {
        T::from_dynamic(self.arg_slot(index)).map_err(NativeError::Conversion)
    }

    /// Set a typed return value.
    pub fn set_return<T: IntoDynamic>(&mut self, value: T) {
        self.return_slot = value.into_dynamic();
    }

    /// Take the return value, leaving `undefined`.
    pub fn take_return(&mut self) -> Dynamic {
        std::mem::take(&mut self.return_slot)
    }

    /// Handle of the receiver.
    pub fn this(&self) -> Result<ObjectHandle, NativeError> {
        self.this
            .ok_or_else(|| NativeError::invalid_this("no receiver"))
    }

    /// Resolve the receiver's native instance.
    ///
    /// # Errors
    ///
    /// - `ObjectDisposed` if the internal slot is empty
    /// - `InvalidThis` if the slot holds a different native type
    pub fn this_native<T: Any>(&self) -> Result<&T, NativeError> {
        let this = self.this()?;
        match self.isolate.resolve::<T>(this) {
            Some(native) => Ok(native),
            None => Err(self.unresolved::<T>(this)),
        }
    }

    /// Resolve the receiver's native instance mutably.
    pub fn this_native_mut<T: Any>(&mut self) -> Result<&mut T, NativeError> {
        let this = self.this()?;
        if self.isolate.resolve::<T>(this).is_none() {
            return Err(self.unresolved::<T>(this));
        }
        self.isolate
            .resolve_mut::<T>(this)
            .ok_or(NativeError::ObjectDisposed)
    }

    fn unresolved<T: Any>(&self, this: ObjectHandle) -> NativeError {
        if self.isolate.heap().has_internal(this) {
            log::error!("internal slot does not hold {}", std::any::type_name::<T>());
            NativeError::invalid_this(format!(
                "internal slot does not hold {}",
                std::any::type_name::<T>()
            ))
        } else {
            NativeError::ObjectDisposed
        }
    }

    pub fn isolate(&self) -> &Isolate {
        self.isolate
    }

    pub fn isolate_mut(&mut self) -> &mut Isolate {
        self.isolate
    }

    pub fn heap(&self) -> &ObjectHeap {
        self.isolate.heap()
    }

    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        self.isolate.heap_mut()
    }
}
