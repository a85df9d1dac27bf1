//! Class descriptors and the fluent builder that produces them.
//!
//! A [`ClassDescriptor`] is the registration record for one bridged class:
//! name, constructor entry point, methods, constants, whether the name is
//! exposed in the global namespace, and an optional base class whose
//! methods and constants it inherits.
//!
//! # Example
//!
//! ```ignore
//! // Gated class: only the bridge may instantiate it
//! let renderbuffer = ClassBuilder::new("WebGLRenderbuffer").build();
//!
//! // Public constructor with validation, inheriting from a hidden base
//! let view = ClassBuilder::new("Float32Array")
//!     .inherits("ArrayBufferView")
//!     .constructor(construct_view)
//!     .constant("BYTES_PER_ELEMENT", Dynamic::Int(4))
//!     .build();
//!
//! let base = ClassBuilder::new("ArrayBufferView")
//!     .hidden()
//!     .method("dispose", dispose)
//!     .build();
//! ```

use hostbridge_core::{Dynamic, NativeError, TypeHash};

use crate::CallContext;
use crate::native_fn::NativeFn;

/// Constructor entry point of a class.
#[derive(Debug, Clone)]
pub enum Constructor {
    /// Only the bridge may instantiate, while the class gate is open.
    Gated,
    /// Argument-validating constructor body callable from script.
    Public(NativeFn),
}

/// A named method entry point.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub name: String,
    pub function: NativeFn,
}

/// Registration record for one class.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: String,
    hash: TypeHash,
    constructor: Constructor,
    methods: Vec<MethodEntry>,
    constants: Vec<(String, Dynamic)>,
    expose_global: bool,
    parent: Option<String>,
}

impl ClassDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    pub fn constructor(&self) -> &Constructor {
        &self.constructor
    }

    pub fn methods(&self) -> &[MethodEntry] {
        &self.methods
    }

    pub fn constants(&self) -> &[(String, Dynamic)] {
        &self.constants
    }

    /// Whether the constructor is reachable by name from the global namespace.
    pub fn expose_global(&self) -> bool {
        self.expose_global
    }

    /// Name of the base class this class inherits prototype members from.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Find a method declared directly on this class.
    pub fn method(&self, name: &str) -> Option<&NativeFn> {
        self.methods
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.function)
    }

    /// Find a constant declared directly on this class.
    pub fn constant(&self, name: &str) -> Option<&Dynamic> {
        self.constants.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Fluent builder for [`ClassDescriptor`].
///
/// Classes are gated and globally exposed unless configured otherwise.
pub struct ClassBuilder {
    descriptor: ClassDescriptor,
}

impl ClassBuilder {
    /// Start describing a class.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let hash = TypeHash::from_name(&name);
        Self {
            descriptor: ClassDescriptor {
                name,
                hash,
                constructor: Constructor::Gated,
                methods: Vec::new(),
                constants: Vec::new(),
                expose_global: true,
                parent: None,
            },
        }
    }

    /// Install a public, argument-validating constructor body.
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), NativeError> + 'static,
    {
        let id = self.descriptor.hash;
        self.descriptor.constructor = Constructor::Public(NativeFn::new(id, f));
        self
    }

    /// Add a method.
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut CallContext) -> Result<(), NativeError> + 'static,
    {
        let id = TypeHash::from_method(self.descriptor.hash, name);
        self.descriptor.methods.push(MethodEntry {
            name: name.to_string(),
            function: NativeFn::new(id, f),
        });
        self
    }

    /// Add a read-only constant, visible on the constructor and on instances.
    pub fn constant(mut self, name: &str, value: Dynamic) -> Self {
        self.descriptor.constants.push((name.to_string(), value));
        self
    }

    /// Keep the constructor name out of the global namespace.
    pub fn hidden(mut self) -> Self {
        self.descriptor.expose_global = false;
        self
    }

    /// Inherit methods and constants from an already registered class.
    pub fn inherits(mut self, parent: &str) -> Self {
        self.descriptor.parent = Some(parent.to_string());
        self
    }

    pub fn build(self) -> ClassDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let class = ClassBuilder::new("Thing").build();
        assert_eq!(class.name(), "Thing");
        assert_eq!(class.hash(), TypeHash::from_name("Thing"));
        assert!(matches!(class.constructor(), Constructor::Gated));
        assert!(class.expose_global());
        assert!(class.parent().is_none());
    }

    #[test]
    fn builder_members() {
        let class = ClassBuilder::new("View")
            .hidden()
            .inherits("Base")
            .constructor(|_ctx: &mut CallContext| Ok(()))
            .method("dispose", |_ctx: &mut CallContext| Ok(()))
            .constant("BYTES_PER_ELEMENT", Dynamic::Int(2))
            .build();

        assert!(!class.expose_global());
        assert_eq!(class.parent(), Some("Base"));
        assert!(matches!(class.constructor(), Constructor::Public(_)));
        let dispose = class.method("dispose").unwrap();
        assert_eq!(dispose.id, TypeHash::from_method(class.hash(), "dispose"));
        assert!(class.method("missing").is_none());
        assert_eq!(class.constant("BYTES_PER_ELEMENT"), Some(&Dynamic::Int(2)));
    }
}
