//! Host runtime model.
//!
//! This module provides the host-side types the bridge binds against:
//!
//! - [`Dynamic`] - script values
//! - [`ObjectHeap`] - script objects with internal slots, indexed data and weak entries
//! - [`RawBuffer`] - fixed-size byte storage kept in a buffer object's internal slot

mod dynamic;
mod object_heap;
mod raw_buffer;

pub use dynamic::Dynamic;
pub use object_heap::{
    Finalizer, GcStats, HostObject, IndexedData, MAX_ARRAY_GAP, MAX_ARRAY_INDEX, ObjectHandle, ObjectHeap, Property,
    PropertyAttributes,
};
pub use raw_buffer::RawBuffer;

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::{ElementKind, HeapError, TypeHash};

    fn counting_finalizer(count: &Rc<Cell<u32>>) -> Finalizer {
        let count = Rc::clone(count);
        Box::new(move |_native: Box<dyn std::any::Any>| count.set(count.get() + 1))
    }

    #[test]
    fn object_heap_generational_handles() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(HostObject::plain()).unwrap();
        assert!(heap.contains(handle));
        assert_eq!(heap.len(), 1);

        heap.free(handle);
        assert!(!heap.contains(handle));
        assert!(heap.is_empty());

        // Reused slot gets a new generation
        let reused = heap.allocate(HostObject::plain()).unwrap();
        assert_eq!(reused.index, handle.index);
        assert_ne!(reused.generation, handle.generation);
        assert!(heap.get(handle).is_none());
    }

    #[test]
    fn object_heap_limit() {
        let mut heap = ObjectHeap::with_limit(2);
        heap.allocate(HostObject::plain()).unwrap();
        heap.allocate(HostObject::plain()).unwrap();
        assert_eq!(
            heap.allocate(HostObject::plain()),
            Err(HeapError::Exhausted { limit: 2 })
        );
    }

    #[test]
    fn internal_slot_downcast() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(HostObject::new(TypeHash::from_name("Thing"))).unwrap();
        assert!(!heap.has_internal(handle));

        heap.set_internal(handle, Box::new(42u32)).unwrap();
        assert_eq!(heap.internal::<u32>(handle), Some(&42));
        assert_eq!(heap.internal::<String>(handle), None);

        *heap.internal_mut::<u32>(handle).unwrap() = 7;
        let taken = heap.take_internal(handle).unwrap();
        assert_eq!(taken.downcast_ref::<u32>(), Some(&7));
        assert!(heap.take_internal(handle).is_none());
    }

    #[test]
    fn read_only_properties() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(HostObject::plain()).unwrap();
        heap.define_property(
            handle,
            "length",
            Dynamic::Int(4),
            PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_DELETE,
        )
        .unwrap();

        assert_eq!(heap.set_property(handle, "length", Dynamic::Int(9)), Ok(false));
        assert_eq!(heap.delete_property(handle, "length"), Ok(false));
        assert_eq!(heap.get_property(handle, "length"), Some(Dynamic::Int(4)));

        assert_eq!(heap.set_property(handle, "other", Dynamic::Bool(true)), Ok(true));
        assert_eq!(heap.delete_property(handle, "other"), Ok(true));
        assert_eq!(heap.get_property(handle, "other"), None);
    }

    #[test]
    fn unreachable_weak_object_is_finalized_once() {
        let mut heap = ObjectHeap::new();
        let count = Rc::new(Cell::new(0));
        let handle = heap.allocate(HostObject::plain()).unwrap();
        heap.set_internal(handle, Box::new("native")).unwrap();
        heap.make_weak(handle, counting_finalizer(&count)).unwrap();
        heap.mark_independent(handle);

        let stats = heap.collect_garbage();
        assert_eq!(stats.finalized, 1);
        assert_eq!(stats.collected, 1);
        assert_eq!(count.get(), 1);
        assert!(!heap.contains(handle));

        heap.collect_garbage();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn rooted_objects_survive_collection() {
        let mut heap = ObjectHeap::new();
        let count = Rc::new(Cell::new(0));
        let handle = heap.allocate(HostObject::plain()).unwrap();
        heap.set_internal(handle, Box::new(1u8)).unwrap();
        heap.make_weak(handle, counting_finalizer(&count)).unwrap();
        heap.mark_independent(handle);
        heap.root(handle);

        heap.collect_garbage();
        assert!(heap.contains(handle));
        assert_eq!(count.get(), 0);

        heap.unroot(handle);
        heap.collect_garbage();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn references_keep_objects_alive() {
        let mut heap = ObjectHeap::new();
        let root = heap.allocate(HostObject::plain()).unwrap();
        let child = heap.allocate(HostObject::plain()).unwrap();
        let item = heap.allocate(HostObject::plain()).unwrap();
        let array = heap.allocate(HostObject::array(vec![Dynamic::Object(item)])).unwrap();
        heap.set_property(root, "child", Dynamic::Object(child)).unwrap();
        heap.set_property(child, "list", Dynamic::Object(array)).unwrap();
        heap.root(root);

        let stats = heap.collect_garbage();
        assert_eq!(stats.marked, 4);
        assert!(heap.contains(item));

        heap.delete_property(root, "child").unwrap();
        let stats = heap.collect_garbage();
        assert_eq!(stats.collected, 3);
        assert!(!heap.contains(item));
    }

    #[test]
    fn grouped_weak_objects_are_deferred() {
        let mut heap = ObjectHeap::new();
        heap.set_grouped_delay(2);
        let count = Rc::new(Cell::new(0));
        let handle = heap.allocate(HostObject::plain()).unwrap();
        heap.set_internal(handle, Box::new(())).unwrap();
        heap.make_weak(handle, counting_finalizer(&count)).unwrap();

        assert_eq!(heap.collect_garbage().deferred, 1);
        assert_eq!(heap.collect_garbage().deferred, 1);
        assert_eq!(count.get(), 0);
        assert_eq!(heap.collect_garbage().finalized, 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn cleared_slot_skips_finalizer() {
        let mut heap = ObjectHeap::new();
        let count = Rc::new(Cell::new(0));
        let handle = heap.allocate(HostObject::plain()).unwrap();
        heap.set_internal(handle, Box::new(())).unwrap();
        heap.make_weak(handle, counting_finalizer(&count)).unwrap();
        heap.mark_independent(handle);

        heap.take_internal(handle);
        let stats = heap.collect_garbage();
        assert_eq!(stats.collected, 1);
        assert_eq!(stats.finalized, 0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn cleared_weak_entry_never_fires() {
        let mut heap = ObjectHeap::new();
        let count = Rc::new(Cell::new(0));
        let handle = heap.allocate(HostObject::plain()).unwrap();
        heap.set_internal(handle, Box::new(())).unwrap();
        heap.make_weak(handle, counting_finalizer(&count)).unwrap();
        assert!(heap.clear_weak(handle));
        assert!(!heap.clear_weak(handle));

        heap.collect_garbage();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn finalize_all_at_teardown() {
        let mut heap = ObjectHeap::new();
        let count = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let handle = heap.allocate(HostObject::plain()).unwrap();
            heap.set_internal(handle, Box::new(())).unwrap();
            heap.make_weak(handle, counting_finalizer(&count)).unwrap();
            heap.root(handle);
        }
        assert_eq!(heap.finalize_all(), 3);
        assert_eq!(count.get(), 3);
        assert_eq!(heap.finalize_all(), 0);
    }

    #[test]
    fn indexed_data_addresses_buffer_bytes() {
        let mut heap = ObjectHeap::new();
        let buffer = heap.allocate(HostObject::plain()).unwrap();
        heap.set_internal(buffer, Box::new(RawBuffer::zeroed(8).unwrap())).unwrap();

        let view = heap.allocate(HostObject::plain()).unwrap();
        heap.set_indexed_data(
            view,
            IndexedData {
                buffer,
                byte_offset: 4,
                length: 2,
                kind: ElementKind::Uint16,
            },
        )
        .unwrap();
        heap.set_internal(view, Box::new(())).unwrap();

        heap.set_element(view, 1, &Dynamic::Int(0x0102)).unwrap();
        heap.set_element(view, 5, &Dynamic::Int(1)).unwrap();
        assert_eq!(heap.get_element(view, 1), Ok(Dynamic::Int(0x0102)));
        assert_eq!(heap.get_element(view, 2), Ok(Dynamic::Undefined));
        assert_eq!(heap.buffer_bytes(buffer).unwrap(), &[0, 0, 0, 0, 0, 0, 2, 1]);
        assert_eq!(heap.indexed_bytes(view).unwrap(), &[0, 0, 2, 1]);
        assert_eq!(heap.element_count(view), Some(2));

        // The view keeps the buffer reachable
        heap.root(view);
        heap.collect_garbage();
        assert!(heap.contains(buffer));

        // Disposing the view makes its window inaccessible
        heap.take_internal(view);
        assert_eq!(heap.get_element(view, 0), Err(HeapError::Disposed));
    }

    #[test]
    fn disposed_buffer_rejects_indexed_access() {
        let mut heap = ObjectHeap::new();
        let buffer = heap.allocate(HostObject::plain()).unwrap();
        heap.set_internal(buffer, Box::new(RawBuffer::zeroed(4).unwrap())).unwrap();
        let view = heap.allocate(HostObject::plain()).unwrap();
        heap.set_indexed_data(
            view,
            IndexedData {
                buffer,
                byte_offset: 0,
                length: 4,
                kind: ElementKind::Uint8,
            },
        )
        .unwrap();

        heap.take_internal(buffer);
        assert_eq!(heap.get_element(view, 0), Err(HeapError::Disposed));
        assert_eq!(heap.set_element(view, 0, &Dynamic::Int(1)), Err(HeapError::Disposed));
    }

    #[test]
    fn handles_from_another_heap_are_rejected() {
        let mut first = ObjectHeap::new();
        let mut second = ObjectHeap::new();
        assert_ne!(first.id(), second.id());

        let old = first.allocate(HostObject::plain().with_property("tag", Dynamic::Int(1))).unwrap();
        let fresh = second.allocate(HostObject::plain().with_property("tag", Dynamic::Int(2))).unwrap();
        assert_eq!((old.index, old.generation), (fresh.index, fresh.generation));

        assert!(!second.contains(old));
        assert_eq!(second.get_property(old, "tag"), None);
        assert_eq!(second.get_element(old, 0), Err(HeapError::StaleHandle));
        assert_eq!(second.get_property(fresh, "tag"), Some(Dynamic::Int(2)));
    }

    #[test]
    fn array_writes_are_bounded() {
        let mut heap = ObjectHeap::new();
        let array = heap.allocate(HostObject::array(vec![Dynamic::Int(1), Dynamic::Int(2)])).unwrap();

        assert_eq!(heap.set_element(array, usize::MAX, &Dynamic::Int(9)), Ok(()));
        assert_eq!(heap.set_element(array, MAX_ARRAY_INDEX, &Dynamic::Int(9)), Ok(()));
        assert_eq!(
            heap.set_element(array, 1 << 40, &Dynamic::Int(9)),
            Err(HeapError::IndexOutOfRange { index: 1 << 40 })
        );
        assert_eq!(heap.get_element(array, 2), Ok(Dynamic::Undefined));

        heap.set_element(array, 4, &Dynamic::Int(5)).unwrap();
        assert_eq!(heap.get_element(array, 3), Ok(Dynamic::Undefined));
        assert_eq!(heap.get_element(array, 4), Ok(Dynamic::Int(5)));
        assert_eq!(heap.get_element(array, 0), Ok(Dynamic::Int(1)));

        let edge = 5 + MAX_ARRAY_GAP - 1;
        assert_eq!(heap.set_element(array, edge, &Dynamic::Int(6)), Ok(()));
        assert_eq!(heap.get_element(array, edge), Ok(Dynamic::Int(6)));
    }
}
