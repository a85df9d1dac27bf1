//! Deterministic hash-based class identity.
//!
//! [`TypeHash`] identifies a registered class or a class member. Hashes are
//! computed from names, so a class can be referred to (for example as a
//! reparenting target) before it has been initialized.
//!
//! # Examples
//!
//! ```
//! use hostbridge_core::TypeHash;
//!
//! let a = TypeHash::from_name("Float32Array");
//! let b = TypeHash::from_name("Float32Array");
//! assert_eq!(a, b);
//! assert_ne!(a, TypeHash::from_name("Float64Array"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants.
///
/// Keep class hashes and member hashes apart even when names collide.
pub mod hash_constants {
    /// Domain marker for class hashes
    pub const CLASS: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for method hashes
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;
}

/// A deterministic 64-bit hash identifying a class or class member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a class hash from its script-visible name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::CLASS ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a method hash from the owning class and the method name.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::METHOD ^ owner.0.rotate_left(17) ^ xxh64(name.as_bytes(), 0))
    }

    /// Check whether this is the empty hash.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
