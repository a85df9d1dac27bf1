//! Error types shared by every layer of the bridge.
//!
//! ## Error Hierarchy
//!
//! ```text
//! NativeError (what a script observes, see ErrorKind)
//! ├── ConversionError   - a value could not become the required native scalar
//! └── HeapError         - host heap failures (exhaustion, stale handles)
//! RegistrationError     - class registration problems, fatal at startup
//! ```
//!
//! Every native entry point returns `Result<_, NativeError>`. The host turns
//! the error into an exception of the category given by [`NativeError::kind`].

use thiserror::Error;

// ============================================================================
// Error categories
// ============================================================================

/// Exception category a script observes for a failed native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Generic `Error`
    Error,
    /// `TypeError`
    TypeError,
    /// `ReferenceError`
    ReferenceError,
    /// `RangeError`
    RangeError,
}

impl ErrorKind {
    /// Script-visible constructor name for this category.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

// ============================================================================
// Conversion Errors
// ============================================================================

/// Errors from converting host values to native scalars.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The value has a type that cannot become the requested native type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// An object handle was required but the value was null or undefined.
    #[error("null handle")]
    NullHandle,
}

// ============================================================================
// Heap Errors
// ============================================================================

/// Errors raised by the host object heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The heap reached its configured capacity.
    #[error("object heap exhausted (limit {limit})")]
    Exhausted { limit: usize },

    /// The handle refers to an object that has been collected.
    #[error("stale object handle")]
    StaleHandle,

    /// Indexed data refers to backing memory that no longer exists.
    #[error("backing store has been disposed")]
    Disposed,

    /// An array write landed too far past the end of the array.
    #[error("array index {index} out of range")]
    IndexOutOfRange { index: usize },
}

// ============================================================================
// Native Errors
// ============================================================================

/// Errors raised by native entry points and reported to the calling script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    /// The gated constructor entry point was invoked without permission.
    #[error("Illegal constructor")]
    IllegalConstructor { class: String },

    /// A method was called on an object whose native instance is gone.
    #[error("Object has been disposed")]
    ObjectDisposed,

    /// Arity check failed.
    #[error("Not enough arguments")]
    NotEnoughArguments { expected: usize, actual: usize },

    /// Buffer or view bounds violated.
    #[error("{message}")]
    Range { message: String },

    /// A value had the wrong type for the operation.
    #[error("{message}")]
    Type { message: String },

    /// Scalar conversion failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The host could not instantiate an object.
    #[error("allocation failed")]
    AllocationFailed,

    /// Receiver or internal slot held something other than expected.
    #[error("Illegal invocation: {message}")]
    InvalidThis { message: String },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl NativeError {
    /// Create a range error.
    pub fn range(message: impl Into<String>) -> Self {
        NativeError::Range {
            message: message.into(),
        }
    }

    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        NativeError::Type {
            message: message.into(),
        }
    }

    /// Create an invalid this error.
    pub fn invalid_this(message: impl Into<String>) -> Self {
        NativeError::InvalidThis {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        NativeError::Other(message.into())
    }

    /// The exception category reported to script.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NativeError::IllegalConstructor { .. }
            | NativeError::NotEnoughArguments { .. }
            | NativeError::Type { .. }
            | NativeError::Conversion(_)
            | NativeError::InvalidThis { .. } => ErrorKind::TypeError,
            NativeError::ObjectDisposed => ErrorKind::ReferenceError,
            NativeError::Range { .. } => ErrorKind::RangeError,
            NativeError::AllocationFailed | NativeError::Other(_) => ErrorKind::Error,
        }
    }

    /// Check if this is the disposed-object error.
    pub fn is_disposed(&self) -> bool {
        matches!(self, NativeError::ObjectDisposed)
    }

    /// Check if this is the illegal constructor error.
    pub fn is_illegal_constructor(&self) -> bool {
        matches!(self, NativeError::IllegalConstructor { .. })
    }
}

impl From<HeapError> for NativeError {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::Exhausted { .. } => NativeError::AllocationFailed,
            HeapError::Disposed => NativeError::ObjectDisposed,
            HeapError::StaleHandle => NativeError::invalid_this("stale object handle"),
            HeapError::IndexOutOfRange { .. } => NativeError::range("Invalid array length"),
        }
    }
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors from class registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// Class name was empty.
    #[error("class name must not be empty")]
    EmptyName,

    /// Another class already owns this global name.
    #[error("global name '{name}' is already taken")]
    DuplicateGlobal { name: String },

    /// Reparenting target has not been initialized.
    #[error("class '{class}' inherits from unregistered class '{parent}'")]
    UnknownParent { class: String, parent: String },
}
