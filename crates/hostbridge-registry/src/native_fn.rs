//! Constructor and method bodies as stored in a class descriptor.

use std::fmt;
use std::rc::Rc;

use hostbridge_core::{NativeError, TypeHash};

use crate::CallContext;

/// Something the bridge can invoke on behalf of script.
///
/// Implemented for every `Fn(&mut CallContext) -> Result<(), NativeError>`,
/// so class builders take plain closures.
pub trait NativeCallable {
    fn call(&self, ctx: &mut CallContext) -> Result<(), NativeError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallContext) -> Result<(), NativeError>,
{
    fn call(&self, ctx: &mut CallContext) -> Result<(), NativeError> {
        self(ctx)
    }
}

/// A shared native entry point tagged with the hash it was registered under.
///
/// The class hash for constructors, the method hash for methods. Clones share
/// one body; descriptors are cloned into every isolate that installs them.
#[derive(Clone)]
pub struct NativeFn {
    pub id: TypeHash,
    body: Rc<dyn NativeCallable>,
}

impl NativeFn {
    pub fn new(id: TypeHash, body: impl NativeCallable + 'static) -> Self {
        Self { id, body: Rc::new(body) }
    }

    /// Run the body against `ctx`.
    pub fn call(&self, ctx: &mut CallContext) -> Result<(), NativeError> {
        self.body.call(ctx)
    }

    /// Whether both handles point at the same body.
    pub fn shares_body(&self, other: &NativeFn) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Isolate;

    #[test]
    fn clones_share_the_body() {
        let hash = TypeHash::from_name("answer");
        let answer = NativeFn::new(hash, |ctx: &mut CallContext| {
            ctx.set_return(42i32);
            Ok(())
        });
        let copy = answer.clone();
        assert!(copy.shares_body(&answer));
        assert_eq!(copy.id, hash);

        let other = NativeFn::new(hash, |_ctx: &mut CallContext| Ok(()));
        assert!(!other.shares_body(&answer));

        let mut isolate = Isolate::new();
        let mut ctx = CallContext::new(&mut isolate, None, &[]);
        copy.call(&mut ctx).unwrap();
        assert_eq!(ctx.take_return(), hostbridge_core::Dynamic::Int(42));
    }
}
