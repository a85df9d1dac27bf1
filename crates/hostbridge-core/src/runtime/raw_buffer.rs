//! Owned, fixed-size byte storage.

use crate::error::HeapError;

/// A contiguous block of memory with a fixed length.
///
/// Stored in the internal slot of a buffer object. Views address it through
/// [`IndexedData`](super::IndexedData) by the buffer object's handle, never by
/// pointer, so the bytes are only reachable while the buffer is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBuffer {
    bytes: Box<[u8]>,
}

impl RawBuffer {
    /// Allocate `length` zeroed bytes.
    ///
    /// Fails instead of aborting when the allocator cannot satisfy the request.
    pub fn zeroed(length: usize) -> Result<Self, HeapError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(length)
            .map_err(|_| HeapError::Exhausted { limit: length })?;
        bytes.resize(length, 0);
        Ok(Self {
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Take ownership of existing bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
