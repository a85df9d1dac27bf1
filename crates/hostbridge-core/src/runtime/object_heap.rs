//! Host object heap.
//!
//! Every script-visible object lives here. The heap provides the host
//! capabilities the bridge is built on:
//!
//! - one opaque internal slot per object (holds the native instance)
//! - named properties with read-only / non-deletable attributes
//! - external indexed data: a window over a buffer object's [`RawBuffer`]
//!   addressed with the host indexing operators
//! - weak entries with finalizer callbacks, delivered by [`ObjectHeap::collect_garbage`]
//!
//! # Collection
//!
//! ```text
//! roots ──mark──► reachable objects (properties, elements, indexed buffer)
//!                         │
//!                     sweep unmarked
//!                         │
//!     ┌───────────────────┼─────────────────────────┐
//!     ▼                   ▼                         ▼
//!  no weak entry     weak, independent        weak, grouped
//!  free now          free + finalize now      survive `grouped_delay`
//!                                             cycles, then finalize
//! ```
//!
//! Finalizers receive the native instance taken out of the internal slot. A
//! finalizer whose slot was already cleared is dropped without running.

use std::any::Any;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::TypeHash;
use crate::convert::to_number;
use crate::element_kind::ElementKind;
use crate::error::HeapError;

use super::{Dynamic, RawBuffer};

/// Largest index a host array accepts. Writes at or above it are dropped.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// How far past its current end a host array may grow in one write.
pub const MAX_ARRAY_GAP: usize = 1 << 16;

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// Handle to a heap object.
///
/// Copyable; the generation detects handles to collected objects and the
/// heap id rejects handles that outlived the heap that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    /// Id of the issuing ObjectHeap
    pub heap: u32,
    /// Index into ObjectHeap.slots
    pub index: u32,
    /// Generation for use-after-free detection
    pub generation: u32,
}

impl ObjectHandle {
    /// Create a new object handle.
    pub fn new(heap: u32, index: u32, generation: u32) -> Self {
        Self {
            heap,
            index,
            generation,
        }
    }
}

bitflags! {
    /// Attributes of a named property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyAttributes: u8 {
        /// Assignments are ignored
        const READ_ONLY = 1 << 0;
        /// Deletion is refused
        const DONT_DELETE = 1 << 1;
        /// Hidden from enumeration
        const DONT_ENUM = 1 << 2;
    }
}

/// A named property value.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub value: Dynamic,
    pub attributes: PropertyAttributes,
}

/// External indexed data: `length` elements of `kind` starting at
/// `byte_offset` inside the buffer object's backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedData {
    pub buffer: ObjectHandle,
    pub byte_offset: usize,
    pub length: usize,
    pub kind: ElementKind,
}

impl IndexedData {
    /// Number of bytes covered by the window.
    pub fn byte_length(&self) -> usize {
        self.length * self.kind.size()
    }

    fn window(&self) -> Range<usize> {
        self.byte_offset..self.byte_offset + self.byte_length()
    }

    fn element(&self, index: usize) -> Range<usize> {
        let start = self.byte_offset + index * self.kind.size();
        start..start + self.kind.size()
    }
}

/// Callback delivered when a weakly held object becomes unreachable.
pub type Finalizer = Box<dyn FnOnce(Box<dyn Any>)>;

struct WeakEntry {
    finalizer: Finalizer,
    independent: bool,
    deferrals_left: u32,
}

// ============================================================================
// HostObject
// ============================================================================

/// A script-visible object.
pub struct HostObject {
    class: TypeHash,
    registration: u32,
    internal: Option<Box<dyn Any>>,
    properties: FxHashMap<String, Property>,
    elements: Vec<Dynamic>,
    is_array: bool,
    indexed: Option<IndexedData>,
    indexed_disposed: bool,
}

impl HostObject {
    /// Create an instance of a registered class.
    pub fn new(class: TypeHash) -> Self {
        Self {
            class,
            registration: 0,
            internal: None,
            properties: FxHashMap::default(),
            elements: Vec::new(),
            is_array: false,
            indexed: None,
            indexed_disposed: false,
        }
    }

    /// Create an ordinary object with no class.
    pub fn plain() -> Self {
        Self::new(TypeHash::EMPTY)
    }

    /// Create an ordinary array holding `elements`.
    pub fn array(elements: Vec<Dynamic>) -> Self {
        Self {
            elements,
            is_array: true,
            ..Self::plain()
        }
    }

    /// Add a writable property while building the object.
    pub fn with_property(mut self, name: &str, value: Dynamic) -> Self {
        self.properties.insert(
            name.to_string(),
            Property {
                value,
                attributes: PropertyAttributes::empty(),
            },
        );
        self
    }

    /// Stamp the registration of the class this object was built from.
    pub fn with_registration(mut self, registration: u32) -> Self {
        self.registration = registration;
        self
    }

    /// Class this object was instantiated from, `EMPTY` for ordinary objects.
    pub fn class(&self) -> TypeHash {
        self.class
    }

    /// Registration the object was instantiated under, 0 for ordinary objects.
    pub fn registration(&self) -> u32 {
        self.registration
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Check whether the internal slot is populated.
    pub fn has_internal(&self) -> bool {
        self.internal.is_some()
    }

    /// Get an own property.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Indexed data attachment, if any.
    pub fn indexed(&self) -> Option<IndexedData> {
        self.indexed
    }

    fn references(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.properties
            .values()
            .filter_map(|p| p.value.as_object())
            .chain(self.elements.iter().filter_map(Dynamic::as_object))
            .chain(self.indexed.map(|data| data.buffer))
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("class", &self.class)
            .field("has_internal", &self.internal.is_some())
            .field("properties", &self.properties.len())
            .field("elements", &self.elements.len())
            .field("indexed", &self.indexed)
            .finish()
    }
}

// ============================================================================
// ObjectHeap
// ============================================================================

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Objects found reachable
    pub marked: usize,
    /// Objects freed
    pub collected: usize,
    /// Finalizers delivered
    pub finalized: usize,
    /// Unreachable weak objects kept for a later cycle
    pub deferred: usize,
}

/// Heap storage for host objects with generational indices.
pub struct ObjectHeap {
    id: u32,
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
    /// Maximum live objects, 0 for unlimited
    limit: usize,
    /// Extra cycles a non-independent weak object survives
    grouped_delay: u32,
}

struct HeapSlot {
    generation: u32,
    object: Option<HostObject>,
    weak: Option<WeakEntry>,
    roots: u32,
    marked: bool,
}

impl ObjectHeap {
    /// Create a new empty, unlimited heap.
    pub fn new() -> Self {
        Self {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            limit: 0,
            grouped_delay: 1,
        }
    }

    /// Create a heap that refuses to hold more than `limit` objects.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::new()
        }
    }

    /// Set the live object limit (0 for unlimited).
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Set how many extra cycles a weak object that was not marked
    /// independent survives once unreachable.
    pub fn set_grouped_delay(&mut self, cycles: u32) {
        self.grouped_delay = cycles;
    }

    /// Identity stamped into every handle this heap issues.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn slot(&self, handle: ObjectHandle) -> Option<&HeapSlot> {
        if handle.heap != self.id {
            return None;
        }
        let slot = self.slots.get(handle.index as usize)?;
        (slot.generation == handle.generation && slot.object.is_some()).then_some(slot)
    }

    fn slot_mut(&mut self, handle: ObjectHandle) -> Option<&mut HeapSlot> {
        if handle.heap != self.id {
            return None;
        }
        let slot = self.slots.get_mut(handle.index as usize)?;
        (slot.generation == handle.generation && slot.object.is_some()).then_some(slot)
    }

    /// Allocate a new object.
    ///
    /// Fails with [`HeapError::Exhausted`] when the heap is at its limit.
    pub fn allocate(&mut self, object: HostObject) -> Result<ObjectHandle, HeapError> {
        if self.limit != 0 && self.live >= self.limit {
            return Err(HeapError::Exhausted { limit: self.limit });
        }
        self.live += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            slot.weak = None;
            slot.roots = 0;
            slot.marked = false;
            Ok(ObjectHandle::new(self.id, index, slot.generation))
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                object: Some(object),
                weak: None,
                roots: 0,
                marked: false,
            });
            Ok(ObjectHandle::new(self.id, index, 0))
        }
    }

    /// Check whether the handle refers to a live object.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// Get an object. Returns None if the handle is stale.
    pub fn get(&self, handle: ObjectHandle) -> Option<&HostObject> {
        self.slot(handle)?.object.as_ref()
    }

    /// Get a mutable object. Returns None if the handle is stale.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut HostObject> {
        self.slot_mut(handle)?.object.as_mut()
    }

    /// Free an object immediately. Its weak entry is dropped without running.
    pub fn free(&mut self, handle: ObjectHandle) -> Option<HostObject> {
        let slot = self.slot_mut(handle)?;
        let object = slot.object.take();
        slot.weak = None;
        slot.roots = 0;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.live -= 1;
        object
    }

    // ------------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------------

    /// Add a strong root to an object.
    pub fn root(&mut self, handle: ObjectHandle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.roots = slot.roots.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Remove one strong root from an object.
    pub fn unroot(&mut self, handle: ObjectHandle) -> bool {
        match self.slot_mut(handle) {
            Some(slot) if slot.roots > 0 => {
                slot.roots -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_rooted(&self, handle: ObjectHandle) -> bool {
        self.slot(handle).is_some_and(|slot| slot.roots > 0)
    }

    // ------------------------------------------------------------------------
    // Internal slot
    // ------------------------------------------------------------------------

    /// Store a native instance in the internal slot.
    pub fn set_internal(&mut self, handle: ObjectHandle, native: Box<dyn Any>) -> Result<(), HeapError> {
        let object = self.get_mut(handle).ok_or(HeapError::StaleHandle)?;
        object.internal = Some(native);
        object.indexed_disposed = false;
        Ok(())
    }

    /// Read the internal slot as `T`.
    pub fn internal<T: Any>(&self, handle: ObjectHandle) -> Option<&T> {
        self.get(handle)?.internal.as_ref()?.downcast_ref::<T>()
    }

    /// Read the internal slot mutably as `T`.
    pub fn internal_mut<T: Any>(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        self.get_mut(handle)?.internal.as_mut()?.downcast_mut::<T>()
    }

    /// Check whether the internal slot is populated.
    pub fn has_internal(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some_and(HostObject::has_internal)
    }

    /// Clear the internal slot, returning its contents.
    ///
    /// Indexed data on the object becomes inaccessible.
    pub fn take_internal(&mut self, handle: ObjectHandle) -> Option<Box<dyn Any>> {
        let object = self.get_mut(handle)?;
        let native = object.internal.take();
        if native.is_some() && object.indexed.is_some() {
            object.indexed_disposed = true;
        }
        native
    }

    // ------------------------------------------------------------------------
    // Weak entries
    // ------------------------------------------------------------------------

    /// Hold the object weakly: once unreachable, `finalizer` receives its
    /// native instance.
    pub fn make_weak(&mut self, handle: ObjectHandle, finalizer: Finalizer) -> Result<(), HeapError> {
        let delay = self.grouped_delay;
        let slot = self.slot_mut(handle).ok_or(HeapError::StaleHandle)?;
        slot.weak = Some(WeakEntry {
            finalizer,
            independent: false,
            deferrals_left: delay,
        });
        Ok(())
    }

    /// Mark the weak entry for prompt collection, outside any grouping.
    pub fn mark_independent(&mut self, handle: ObjectHandle) -> bool {
        match self.slot_mut(handle).and_then(|slot| slot.weak.as_mut()) {
            Some(weak) => {
                weak.independent = true;
                true
            }
            None => false,
        }
    }

    /// Drop the weak entry without running it. Returns whether one existed.
    pub fn clear_weak(&mut self, handle: ObjectHandle) -> bool {
        self.slot_mut(handle)
            .and_then(|slot| slot.weak.take())
            .is_some()
    }

    pub fn is_weak(&self, handle: ObjectHandle) -> bool {
        self.slot(handle).is_some_and(|slot| slot.weak.is_some())
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Define or replace an own property, ignoring its current attributes.
    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        value: Dynamic,
        attributes: PropertyAttributes,
    ) -> Result<(), HeapError> {
        let object = self.get_mut(handle).ok_or(HeapError::StaleHandle)?;
        object
            .properties
            .insert(name.to_string(), Property { value, attributes });
        Ok(())
    }

    /// Read an own property. Arrays report `length`.
    pub fn get_property(&self, handle: ObjectHandle, name: &str) -> Option<Dynamic> {
        let object = self.get(handle)?;
        if object.is_array && name == "length" {
            return Some(Dynamic::Int(object.elements.len() as i64));
        }
        object.properties.get(name).map(|p| p.value.clone())
    }

    /// Assign an own property. Returns false if it is read-only.
    pub fn set_property(&mut self, handle: ObjectHandle, name: &str, value: Dynamic) -> Result<bool, HeapError> {
        let object = self.get_mut(handle).ok_or(HeapError::StaleHandle)?;
        match object.properties.get_mut(name) {
            Some(existing) if existing.attributes.contains(PropertyAttributes::READ_ONLY) => Ok(false),
            Some(existing) => {
                existing.value = value;
                Ok(true)
            }
            None => {
                object.properties.insert(
                    name.to_string(),
                    Property {
                        value,
                        attributes: PropertyAttributes::empty(),
                    },
                );
                Ok(true)
            }
        }
    }

    /// Delete an own property. Returns false if it is non-deletable.
    pub fn delete_property(&mut self, handle: ObjectHandle, name: &str) -> Result<bool, HeapError> {
        let object = self.get_mut(handle).ok_or(HeapError::StaleHandle)?;
        match object.properties.get(name) {
            Some(p) if p.attributes.contains(PropertyAttributes::DONT_DELETE) => Ok(false),
            _ => {
                object.properties.remove(name);
                Ok(true)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Indexed access
    // ------------------------------------------------------------------------

    /// Attach external indexed data to an object.
    pub fn set_indexed_data(&mut self, handle: ObjectHandle, data: IndexedData) -> Result<(), HeapError> {
        let object = self.get_mut(handle).ok_or(HeapError::StaleHandle)?;
        object.indexed = Some(data);
        object.indexed_disposed = false;
        Ok(())
    }

    /// Number of indexable elements, if the object is indexable.
    pub fn element_count(&self, handle: ObjectHandle) -> Option<usize> {
        let object = self.get(handle)?;
        match object.indexed {
            Some(data) => Some(data.length),
            None if object.is_array => Some(object.elements.len()),
            None => None,
        }
    }

    /// Bytes of a buffer object's backing store.
    pub fn buffer_bytes(&self, buffer: ObjectHandle) -> Result<&[u8], HeapError> {
        self.internal::<RawBuffer>(buffer)
            .map(RawBuffer::as_slice)
            .ok_or(HeapError::Disposed)
    }

    fn buffer_bytes_mut(&mut self, buffer: ObjectHandle) -> Result<&mut [u8], HeapError> {
        self.internal_mut::<RawBuffer>(buffer)
            .map(RawBuffer::as_mut_slice)
            .ok_or(HeapError::Disposed)
    }

    fn live_indexed(&self, handle: ObjectHandle) -> Result<Option<IndexedData>, HeapError> {
        let object = self.get(handle).ok_or(HeapError::StaleHandle)?;
        if object.indexed_disposed {
            return Err(HeapError::Disposed);
        }
        Ok(object.indexed)
    }

    /// Bytes covered by an object's indexed data window.
    pub fn indexed_bytes(&self, handle: ObjectHandle) -> Result<&[u8], HeapError> {
        let data = self.live_indexed(handle)?.ok_or(HeapError::Disposed)?;
        self.buffer_bytes(data.buffer)?
            .get(data.window())
            .ok_or(HeapError::Disposed)
    }

    /// Host indexing operator `object[index]`.
    ///
    /// Out-of-range reads yield `undefined`.
    pub fn get_element(&self, handle: ObjectHandle, index: usize) -> Result<Dynamic, HeapError> {
        match self.live_indexed(handle)? {
            Some(data) => {
                if index >= data.length {
                    return Ok(Dynamic::Undefined);
                }
                let bytes = self.buffer_bytes(data.buffer)?;
                let element = bytes.get(data.element(index)).ok_or(HeapError::Disposed)?;
                Ok(data.kind.load(element))
            }
            None => {
                let object = self.get(handle).ok_or(HeapError::StaleHandle)?;
                Ok(object.elements.get(index).cloned().unwrap_or_default())
            }
        }
    }

    /// Host indexing assignment `object[index] = value`.
    ///
    /// Indexed data converts `value` per its element kind; out-of-range
    /// writes are ignored. Ordinary arrays grow to cover `index`, at most
    /// [`MAX_ARRAY_GAP`] past their end, and drop writes at or above
    /// [`MAX_ARRAY_INDEX`].
    pub fn set_element(&mut self, handle: ObjectHandle, index: usize, value: &Dynamic) -> Result<(), HeapError> {
        if let Some(data) = self.live_indexed(handle)? {
            if index >= data.length {
                return Ok(());
            }
            let number = to_number(value);
            let bytes = self.buffer_bytes_mut(data.buffer)?;
            let element = bytes.get_mut(data.element(index)).ok_or(HeapError::Disposed)?;
            data.kind.store(element, number);
            log::trace!("store {:?}[{}] = {}", data.kind, index, number);
            return Ok(());
        }

        let object = self.get_mut(handle).ok_or(HeapError::StaleHandle)?;
        if index >= MAX_ARRAY_INDEX {
            return Ok(());
        }
        let elements = &mut object.elements;
        if index >= elements.len() {
            let new_len = index.checked_add(1).ok_or(HeapError::IndexOutOfRange { index })?;
            let grow = new_len - elements.len();
            if grow > MAX_ARRAY_GAP {
                return Err(HeapError::IndexOutOfRange { index });
            }
            elements
                .try_reserve(grow)
                .map_err(|_| HeapError::Exhausted { limit: new_len })?;
            elements.resize(new_len, Dynamic::Undefined);
        }
        elements[index] = value.clone();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------------

    /// Run one full mark-sweep cycle and deliver due finalizers.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&mut self) -> GcStats {
        let mut stats = GcStats::default();

        let mut stack: Vec<ObjectHandle> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some() && slot.roots > 0)
            .map(|(index, slot)| ObjectHandle::new(self.id, index as u32, slot.generation))
            .collect();

        while let Some(handle) = stack.pop() {
            if handle.heap != self.id {
                continue;
            }
            let Some(slot) = self.slots.get_mut(handle.index as usize) else {
                continue;
            };
            if slot.marked || slot.generation != handle.generation {
                continue;
            }
            let Some(object) = slot.object.as_ref() else {
                continue;
            };
            slot.marked = true;
            stats.marked += 1;
            stack.extend(object.references());
        }

        let mut due: Vec<(ObjectHandle, Finalizer, Option<Box<dyn Any>>)> = Vec::new();
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.object.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
                continue;
            }
            if let Some(weak) = slot.weak.as_mut()
                && !weak.independent
                && weak.deferrals_left > 0
            {
                weak.deferrals_left -= 1;
                stats.deferred += 1;
                continue;
            }

            let handle = ObjectHandle::new(self.id, index as u32, slot.generation);
            let mut object = slot.object.take();
            if let Some(weak) = slot.weak.take() {
                let native = object.as_mut().and_then(|o| o.internal.take());
                due.push((handle, weak.finalizer, native));
            }
            slot.roots = 0;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(index as u32);
            self.live -= 1;
            stats.collected += 1;
        }

        for (handle, finalizer, native) in due {
            match native {
                Some(native) => {
                    finalizer(native);
                    stats.finalized += 1;
                }
                None => log::warn!("finalizer for {:?} found a cleared slot", handle),
            }
        }

        log::debug!(
            "gc: marked {} collected {} finalized {} deferred {}",
            stats.marked,
            stats.collected,
            stats.finalized,
            stats.deferred
        );
        stats
    }

    /// Deliver every pending finalizer without freeing objects.
    ///
    /// Used at teardown. Returns the number of finalizers run.
    pub fn finalize_all(&mut self) -> usize {
        let mut due = Vec::new();
        for slot in &mut self.slots {
            if let Some(weak) = slot.weak.take()
                && let Some(native) = slot.object.as_mut().and_then(|o| o.internal.take())
            {
                due.push((weak.finalizer, native));
            }
        }
        let count = due.len();
        for (finalizer, native) in due {
            finalizer(native);
        }
        count
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("live", &self.live)
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .field("limit", &self.limit)
            .finish()
    }
}
