//! Object bridge lifecycle through the public `Context` surface.

use std::cell::Cell;
use std::rc::Rc;

use hostbridge::{
    CallContext, ClassBuilder, Context, ContextError, ContextProperty, Dynamic, ErrorKind, Module, NativeError,
    ObjectHandle, TypeHash,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Counter {
    value: i32,
    drops: Rc<Cell<usize>>,
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

/// Native state of the gated `Token` class.
struct Token(i32);

fn counter_module(drops: Rc<Cell<usize>>) -> Module {
    let counter = ClassBuilder::new("Counter")
        .constructor(move |ctx: &mut CallContext| {
            let this = ctx.this()?;
            let value = if ctx.arg_count() > 0 { ctx.arg::<i32>(0)? } else { 0 };
            let native = Counter {
                value,
                drops: Rc::clone(&drops),
            };
            ctx.isolate_mut().attach(this, native, true)
        })
        .method("increment", |ctx: &mut CallContext| {
            let counter = ctx.this_native_mut::<Counter>()?;
            counter.value += 1;
            let value = counter.value;
            ctx.set_return(value);
            Ok(())
        })
        .method("token", |ctx: &mut CallContext| {
            let value = ctx.this_native::<Counter>()?.value;
            let isolate = ctx.isolate_mut();
            let token = isolate.create(TypeHash::from_name("Token"), &[])?;
            isolate.attach(token, Token(value), true)?;
            ctx.set_return(token);
            Ok(())
        })
        .method("dispose", |ctx: &mut CallContext| {
            let this = ctx.this()?;
            if ctx.isolate_mut().detach(this) {
                Ok(())
            } else {
                Err(NativeError::ObjectDisposed)
            }
        })
        .build();

    let token = ClassBuilder::new("Token")
        .method("value", |ctx: &mut CallContext| {
            let value = ctx.this_native::<Token>()?.0;
            ctx.set_return(value);
            Ok(())
        })
        .build();

    Module::new("counter").class(counter).class(token)
}

fn setup() -> (Context, Rc<Cell<usize>>) {
    init_logger();
    let drops = Rc::new(Cell::new(0));
    let mut ctx = Context::with_default_modules().unwrap();
    ctx.install(counter_module(Rc::clone(&drops))).unwrap();
    (ctx, drops)
}

fn handle(value: &Dynamic) -> ObjectHandle {
    value.as_object().unwrap()
}

// =============================================================================
// Construction gating
// =============================================================================

#[test]
fn gated_class_rejects_script_construction() {
    let (mut ctx, _) = setup();
    let err = ctx.construct("Token", &[]).unwrap_err();
    let native = err.native().unwrap();
    assert!(native.is_illegal_constructor());
    assert_eq!(native.kind(), ErrorKind::TypeError);
    assert_eq!(native.to_string(), "Illegal constructor");
}

#[test]
fn gated_class_created_by_factory() {
    let (mut ctx, _) = setup();
    let counter = ctx.construct("Counter", &[Dynamic::Int(41)]).unwrap();
    let token = ctx.call_method(&counter, "token", &[]).unwrap();
    assert!(ctx.has_instance(&token, "Token"));
    assert_eq!(ctx.call_method(&token, "value", &[]), Ok(Dynamic::Int(41)));

    // The gate is closed again afterwards
    assert!(ctx.construct("Token", &[]).is_err());
}

#[test]
fn constructor_argument_errors_leave_no_object() {
    let (mut ctx, drops) = setup();
    let before = ctx.isolate().unwrap().heap().len();
    let err = ctx
        .construct("Counter", &[Dynamic::String("many".into())])
        .unwrap_err();
    assert_eq!(err.native().map(NativeError::kind), Some(ErrorKind::TypeError));
    assert_eq!(ctx.isolate().unwrap().heap().len(), before);
    assert_eq!(drops.get(), 0);
}

// =============================================================================
// Attach / Resolve / Detach
// =============================================================================

#[test]
fn resolve_is_stable_and_unique() {
    let (mut ctx, _) = setup();
    let a = ctx.construct("Counter", &[]).unwrap();
    let b = ctx.construct("Counter", &[]).unwrap();
    let isolate = ctx.isolate().unwrap();

    let first = isolate.resolve::<Counter>(handle(&a)).unwrap() as *const Counter;
    for _ in 0..3 {
        assert!(std::ptr::eq(first, isolate.resolve::<Counter>(handle(&a)).unwrap()));
    }
    assert!(!std::ptr::eq(first, isolate.resolve::<Counter>(handle(&b)).unwrap()));
}

#[test]
fn methods_mutate_native_state() {
    let (mut ctx, _) = setup();
    let counter = ctx.construct("Counter", &[Dynamic::Int(1)]).unwrap();
    assert_eq!(ctx.call_method(&counter, "increment", &[]), Ok(Dynamic::Int(2)));
    assert_eq!(ctx.call_method(&counter, "increment", &[]), Ok(Dynamic::Int(3)));
}

#[test]
fn detach_then_collect_destroys_once() {
    let (mut ctx, drops) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();

    assert!(ctx.isolate_mut().unwrap().detach(handle(&counter)));
    assert_eq!(drops.get(), 1);

    let stats = ctx.collect_garbage().unwrap();
    assert_eq!(stats.finalized, 0);
    assert_eq!(drops.get(), 1);
}

#[test]
fn collect_then_detach_is_noop() {
    let (mut ctx, drops) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();

    let stats = ctx.collect_garbage().unwrap();
    assert_eq!(stats.finalized, 1);
    assert_eq!(drops.get(), 1);

    assert!(!ctx.isolate_mut().unwrap().detach(handle(&counter)));
    assert_eq!(drops.get(), 1);
}

#[test]
fn double_detach_is_noop() {
    let (mut ctx, drops) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.set_global("counter", counter.clone()).unwrap();

    assert!(ctx.isolate_mut().unwrap().detach(handle(&counter)));
    assert!(!ctx.isolate_mut().unwrap().detach(handle(&counter)));
    ctx.collect_garbage().unwrap();
    assert_eq!(drops.get(), 1);
}

#[test]
fn reachable_objects_are_not_finalized() {
    let (mut ctx, drops) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.set_global("counter", counter.clone()).unwrap();

    for _ in 0..3 {
        ctx.collect_garbage().unwrap();
    }
    assert_eq!(drops.get(), 0);
    assert_eq!(ctx.call_method(&counter, "increment", &[]), Ok(Dynamic::Int(1)));
}

// =============================================================================
// Disposed access
// =============================================================================

#[test]
fn every_method_fails_after_dispose() {
    let (mut ctx, _) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.call_method(&counter, "dispose", &[]).unwrap();

    for method in ["increment", "token", "dispose"] {
        let err = ctx.call_method(&counter, method, &[]).unwrap_err();
        assert_eq!(err, ContextError::Native(NativeError::ObjectDisposed), "{}", method);
    }
}

#[test]
fn disposed_error_is_reference_error() {
    let (mut ctx, _) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.isolate_mut().unwrap().detach(handle(&counter));

    let err = ctx.call_method(&counter, "increment", &[]).unwrap_err();
    assert_eq!(err.native().map(NativeError::kind), Some(ErrorKind::ReferenceError));
    assert_eq!(err.to_string(), "ReferenceError: Object has been disposed");
}

#[test]
fn has_instance_on_disposed_object() {
    let (mut ctx, _) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.set_global("counter", counter.clone()).unwrap();
    ctx.isolate_mut().unwrap().detach(handle(&counter));

    assert!(ctx.has_instance(&counter, "Counter"));
    assert!(!ctx.has_instance(&counter, "Token"));
    assert!(!ctx.has_instance(&Dynamic::Int(3), "Counter"));
}

// =============================================================================
// Registry lifecycle
// =============================================================================

#[test]
fn uninitialize_breaks_has_instance() {
    let (mut ctx, _) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.set_global("counter", counter.clone()).unwrap();

    assert!(ctx.isolate_mut().unwrap().uninitialize(TypeHash::from_name("Counter")));
    assert!(!ctx.has_instance(&counter, "Counter"));
    assert!(matches!(
        ctx.construct("Counter", &[]),
        Err(ContextError::UnknownGlobal { .. })
    ));
}

#[test]
fn reinitialize_does_not_revive_old_instances() {
    let (mut ctx, drops) = setup();
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.set_global("counter", counter.clone()).unwrap();

    let isolate = ctx.isolate_mut().unwrap();
    assert!(isolate.uninitialize(TypeHash::from_name("Counter")));
    counter_module(Rc::clone(&drops)).install(isolate).unwrap();

    assert!(!ctx.has_instance(&counter, "Counter"));
    let fresh = ctx.construct("Counter", &[]).unwrap();
    assert!(ctx.has_instance(&fresh, "Counter"));
}

#[test]
fn teardown_drops_natives() {
    let (mut ctx, drops) = setup();
    for _ in 0..3 {
        let counter = ctx.construct("Counter", &[]).unwrap();
        ctx.set_global("last", counter).unwrap();
    }
    ctx.teardown();
    assert_eq!(drops.get(), 3);
}

#[test]
fn teardown_delivers_finalizers() {
    let (mut ctx, drops) = setup();
    ctx.set_property(ContextProperty::FinalizeOnTeardown, 1);
    let counter = ctx.construct("Counter", &[]).unwrap();
    ctx.set_global("counter", counter).unwrap();

    ctx.teardown();
    assert_eq!(drops.get(), 1);

    // Reinitialized contexts start clean and register installed modules again
    ctx.init().unwrap();
    assert!(ctx.construct("Counter", &[]).unwrap().as_object().is_some());
}

#[test]
fn grouped_finalizers_wait_extra_cycles() {
    let (mut ctx, drops) = setup();
    ctx.set_property(ContextProperty::GroupedFinalizerDelay, 2);
    let isolate = ctx.isolate_mut().unwrap();
    let counter = isolate.construct("Counter", &[]).unwrap();
    // Attached weak entries are independent; regroup this one
    let heap = isolate.heap_mut();
    let native = heap.take_internal(counter).unwrap();
    heap.clear_weak(counter);
    heap.set_internal(counter, native).unwrap();
    heap.make_weak(counter, Box::new(|native: Box<dyn std::any::Any>| drop(native)))
        .unwrap();

    ctx.collect_garbage().unwrap();
    ctx.collect_garbage().unwrap();
    assert_eq!(drops.get(), 0);
    ctx.collect_garbage().unwrap();
    assert_eq!(drops.get(), 1);
}
