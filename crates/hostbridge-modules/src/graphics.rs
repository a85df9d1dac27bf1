//! Graphics handle classes.
//!
//! Script-visible wrappers around objects owned by a [`GraphicsBackend`]:
//!
//! | Class                   | Constructor | Lifetime                                     |
//! |-------------------------|-------------|----------------------------------------------|
//! | `WebGLRenderingContext` | public      | weak                                         |
//! | `WebGLRenderbuffer`     | illegal     | strong until `deleteRenderbuffer`/teardown   |
//! | `WebGLProgram`          | illegal     | weak; collection deletes the backend program |
//! | `WebGLUniformLocation`  | illegal     | weak                                         |
//!
//! Handle classes can only be created by the context's factory methods.
//! Invalid enums and mismatched handles do not raise script errors; they set
//! the context's sticky error, read and cleared by `getError()`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hostbridge_core::{Dynamic, FromDynamic, NativeError, ObjectHandle, TypeHash};
use hostbridge_registry::{CallContext, ClassBuilder, ClassDescriptor, Isolate, Module};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rustc_hash::FxHashMap;

use crate::typed_array::array_data;

pub const WEBGL_RENDERING_CONTEXT: &str = "WebGLRenderingContext";
pub const WEBGL_RENDERBUFFER: &str = "WebGLRenderbuffer";
pub const WEBGL_PROGRAM: &str = "WebGLProgram";
pub const WEBGL_UNIFORM_LOCATION: &str = "WebGLUniformLocation";

pub const RENDERBUFFER: u32 = 0x8D41;

/// Sticky error codes reported by `getError()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum GlError {
    NoError = 0,
    InvalidEnum = 0x0500,
    InvalidValue = 0x0501,
    InvalidOperation = 0x0502,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum BufferTarget {
    ArrayBuffer = 0x8892,
    ElementArrayBuffer = 0x8893,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum BufferUsage {
    StreamDraw = 0x88E0,
    StaticDraw = 0x88E4,
    DynamicDraw = 0x88E8,
}

const GL_CONSTANTS: &[(&str, u32)] = &[
    ("NO_ERROR", GlError::NoError as u32),
    ("INVALID_ENUM", GlError::InvalidEnum as u32),
    ("INVALID_VALUE", GlError::InvalidValue as u32),
    ("INVALID_OPERATION", GlError::InvalidOperation as u32),
    ("ARRAY_BUFFER", BufferTarget::ArrayBuffer as u32),
    ("ELEMENT_ARRAY_BUFFER", BufferTarget::ElementArrayBuffer as u32),
    ("STREAM_DRAW", BufferUsage::StreamDraw as u32),
    ("STATIC_DRAW", BufferUsage::StaticDraw as u32),
    ("DYNAMIC_DRAW", BufferUsage::DynamicDraw as u32),
    ("RENDERBUFFER", RENDERBUFFER),
];

/// Contents passed to `bufferData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSource<'a> {
    /// Allocate `n` zeroed bytes
    Size(usize),
    Bytes(&'a [u8]),
}

/// The graphics API the handle classes drive.
///
/// Object names are non-zero; `0` means "none" in bind and use calls.
pub trait GraphicsBackend {
    fn create_renderbuffer(&mut self) -> u32;
    fn delete_renderbuffer(&mut self, id: u32);
    fn bind_renderbuffer(&mut self, target: u32, id: u32);
    fn create_program(&mut self) -> u32;
    fn delete_program(&mut self, id: u32);
    fn use_program(&mut self, id: u32);
    /// Location of a uniform, or -1 if the program has none by that name.
    fn uniform_location(&mut self, program: u32, name: &str) -> i32;
    fn uniform1i(&mut self, location: i32, value: i32);
    fn buffer_data(&mut self, target: BufferTarget, data: BufferSource<'_>, usage: BufferUsage);
}

pub type SharedBackend = Rc<RefCell<dyn GraphicsBackend>>;

/// One call observed by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlCall {
    CreateRenderbuffer(u32),
    DeleteRenderbuffer(u32),
    BindRenderbuffer { target: u32, id: u32 },
    CreateProgram(u32),
    DeleteProgram(u32),
    UseProgram(u32),
    Uniform1i { location: i32, value: i32 },
    BufferData { target: BufferTarget, size: usize, bytes: Option<Vec<u8>>, usage: BufferUsage },
}

/// Backend that hands out sequential names and records every call.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u32,
    calls: Vec<GlCall>,
    uniforms: FxHashMap<String, i32>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `location` for uniform `name` in every program.
    pub fn with_uniform(mut self, name: &str, location: i32) -> Self {
        self.uniforms.insert(name.to_string(), location);
        self
    }

    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GlCall> {
        std::mem::take(&mut self.calls)
    }

    fn next_name(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsBackend for RecordingBackend {
    fn create_renderbuffer(&mut self) -> u32 {
        let id = self.next_name();
        self.calls.push(GlCall::CreateRenderbuffer(id));
        id
    }

    fn delete_renderbuffer(&mut self, id: u32) {
        self.calls.push(GlCall::DeleteRenderbuffer(id));
    }

    fn bind_renderbuffer(&mut self, target: u32, id: u32) {
        self.calls.push(GlCall::BindRenderbuffer { target, id });
    }

    fn create_program(&mut self) -> u32 {
        let id = self.next_name();
        self.calls.push(GlCall::CreateProgram(id));
        id
    }

    fn delete_program(&mut self, id: u32) {
        self.calls.push(GlCall::DeleteProgram(id));
    }

    fn use_program(&mut self, id: u32) {
        self.calls.push(GlCall::UseProgram(id));
    }

    fn uniform_location(&mut self, _program: u32, name: &str) -> i32 {
        self.uniforms.get(name).copied().unwrap_or(-1)
    }

    fn uniform1i(&mut self, location: i32, value: i32) {
        self.calls.push(GlCall::Uniform1i { location, value });
    }

    fn buffer_data(&mut self, target: BufferTarget, data: BufferSource<'_>, usage: BufferUsage) {
        let (size, bytes) = match data {
            BufferSource::Size(size) => (size, None),
            BufferSource::Bytes(bytes) => (bytes.len(), Some(bytes.to_vec())),
        };
        self.calls.push(GlCall::BufferData {
            target,
            size,
            bytes,
            usage,
        });
    }
}

// ============================================================================
// Natives
// ============================================================================

/// Native instance of `WebGLRenderingContext`.
pub struct RenderingContext {
    id: u32,
    backend: SharedBackend,
    error: GlError,
    current_program: Option<u32>,
}

impl RenderingContext {
    fn new(id: u32, backend: SharedBackend) -> Self {
        Self {
            id,
            backend,
            error: GlError::NoError,
            current_program: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Record `error` unless an earlier one is still pending.
    fn record(&mut self, error: GlError) {
        log::debug!("context {}: {:?}", self.id, error);
        if self.error == GlError::NoError {
            self.error = error;
        }
    }

    fn take_error(&mut self) -> GlError {
        std::mem::replace(&mut self.error, GlError::NoError)
    }
}

/// Native instance of `WebGLRenderbuffer`. Dropping it deletes the backend object.
pub struct Renderbuffer {
    id: u32,
    context_id: u32,
    backend: SharedBackend,
}

impl Renderbuffer {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn context_id(&self) -> u32 {
        self.context_id
    }
}

impl Drop for Renderbuffer {
    fn drop(&mut self) {
        match self.backend.try_borrow_mut() {
            Ok(mut backend) => backend.delete_renderbuffer(self.id),
            Err(_) => log::warn!("backend busy, leaking renderbuffer {}", self.id),
        }
    }
}

/// Native instance of `WebGLProgram`. Dropping it deletes the backend program.
pub struct Program {
    id: u32,
    backend: SharedBackend,
}

impl Program {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        match self.backend.try_borrow_mut() {
            Ok(mut backend) => backend.delete_program(self.id),
            Err(_) => log::warn!("backend busy, leaking program {}", self.id),
        }
    }
}

/// Native instance of `WebGLUniformLocation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    program_id: u32,
    location: i32,
}

impl UniformLocation {
    pub fn program_id(&self) -> u32 {
        self.program_id
    }

    pub fn location(&self) -> i32 {
        self.location
    }
}

fn class(name: &str) -> TypeHash {
    TypeHash::from_name(name)
}

// ============================================================================
// Module
// ============================================================================

/// The graphics module, driving `backend`.
pub fn module(backend: SharedBackend) -> Module {
    Module::new("graphics")
        .class(ClassBuilder::new(WEBGL_RENDERBUFFER).build())
        .class(ClassBuilder::new(WEBGL_PROGRAM).build())
        .class(ClassBuilder::new(WEBGL_UNIFORM_LOCATION).build())
        .class(context_descriptor(backend))
}

fn context_descriptor(backend: SharedBackend) -> ClassDescriptor {
    let contexts = Rc::new(Cell::new(0u32));
    let builder = ClassBuilder::new(WEBGL_RENDERING_CONTEXT).constructor(move |ctx: &mut CallContext| {
        let id = contexts.get() + 1;
        contexts.set(id);
        let this = ctx.this()?;
        ctx.isolate_mut()
            .attach(this, RenderingContext::new(id, Rc::clone(&backend)), true)
    });

    GL_CONSTANTS
        .iter()
        .fold(builder, |builder, (name, value)| {
            builder.constant(name, Dynamic::Int(i64::from(*value)))
        })
        .method("getError", get_error)
        .method("createRenderbuffer", create_renderbuffer)
        .method("deleteRenderbuffer", delete_renderbuffer)
        .method("isRenderbuffer", is_renderbuffer)
        .method("bindRenderbuffer", bind_renderbuffer)
        .method("createProgram", create_program)
        .method("deleteProgram", delete_program)
        .method("isProgram", is_program)
        .method("useProgram", use_program)
        .method("getUniformLocation", get_uniform_location)
        .method("uniform1i", uniform1i)
        .method("bufferData", buffer_data)
        .build()
}

fn context_state(ctx: &CallContext) -> Result<(SharedBackend, u32), NativeError> {
    let state = ctx.this_native::<RenderingContext>()?;
    Ok((Rc::clone(&state.backend), state.id))
}

fn record(ctx: &mut CallContext, error: GlError) -> Result<(), NativeError> {
    ctx.this_native_mut::<RenderingContext>()?.record(error);
    Ok(())
}

// GLenum getError()
fn get_error(ctx: &mut CallContext) -> Result<(), NativeError> {
    let error = ctx.this_native_mut::<RenderingContext>()?.take_error();
    ctx.set_return(u32::from(error));
    Ok(())
}

/// Create a handle object, or `None` when the heap refuses the allocation.
/// The script then sees `null`.
fn create_handle(isolate: &mut Isolate, name: &str) -> Result<Option<ObjectHandle>, NativeError> {
    match isolate.create(class(name), &[]) {
        Ok(handle) => Ok(Some(handle)),
        Err(NativeError::AllocationFailed) => {
            log::debug!("no room for a {}, returning null", name);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

// WebGLRenderbuffer createRenderbuffer()
fn create_renderbuffer(ctx: &mut CallContext) -> Result<(), NativeError> {
    let (backend, context_id) = context_state(ctx)?;
    let isolate = ctx.isolate_mut();
    let Some(handle) = create_handle(isolate, WEBGL_RENDERBUFFER)? else {
        ctx.set_return(Dynamic::Null);
        return Ok(());
    };
    let id = backend.borrow_mut().create_renderbuffer();
    isolate.attach(
        handle,
        Renderbuffer {
            id,
            context_id,
            backend,
        },
        false,
    )?;
    ctx.set_return(handle);
    Ok(())
}

// void deleteRenderbuffer(WebGLRenderbuffer? renderbuffer)
fn delete_renderbuffer(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(1)?;
    let (_, context_id) = context_state(ctx)?;
    let value = ctx.arg_slot(0);
    let owner = ctx
        .isolate()
        .native_from_dynamic::<Renderbuffer>(value, class(WEBGL_RENDERBUFFER))?
        .map(Renderbuffer::context_id);

    match (owner, value.as_object()) {
        (Some(owner), _) if owner != context_id => record(ctx, GlError::InvalidOperation),
        (Some(_), Some(handle)) => {
            ctx.isolate_mut().detach(handle);
            Ok(())
        }
        _ => Ok(()),
    }
}

// GLboolean isRenderbuffer(WebGLRenderbuffer? renderbuffer)
fn is_renderbuffer(ctx: &mut CallContext) -> Result<(), NativeError> {
    let (_, context_id) = context_state(ctx)?;
    let value = ctx.arg_slot(0);
    let isolate = ctx.isolate();
    let live = isolate.has_instance(value, class(WEBGL_RENDERBUFFER))
        && value
            .as_object()
            .and_then(|handle| isolate.resolve::<Renderbuffer>(handle))
            .is_some_and(|renderbuffer| renderbuffer.context_id == context_id);
    ctx.set_return(live);
    Ok(())
}

// void bindRenderbuffer(GLenum target, WebGLRenderbuffer? renderbuffer)
fn bind_renderbuffer(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(2)?;
    let target = ctx.arg::<u32>(0)?;
    let (backend, context_id) = context_state(ctx)?;
    let renderbuffer = ctx
        .isolate()
        .native_from_dynamic::<Renderbuffer>(ctx.arg_slot(1), class(WEBGL_RENDERBUFFER))?
        .map(|renderbuffer| (renderbuffer.id, renderbuffer.context_id));

    if target != RENDERBUFFER {
        return record(ctx, GlError::InvalidEnum);
    }
    let id = match renderbuffer {
        None => 0,
        Some((_, owner)) if owner != context_id => return record(ctx, GlError::InvalidOperation),
        Some((id, _)) => id,
    };
    backend.borrow_mut().bind_renderbuffer(target, id);
    Ok(())
}

// WebGLProgram createProgram()
fn create_program(ctx: &mut CallContext) -> Result<(), NativeError> {
    let (backend, _) = context_state(ctx)?;
    let isolate = ctx.isolate_mut();
    let Some(handle) = create_handle(isolate, WEBGL_PROGRAM)? else {
        ctx.set_return(Dynamic::Null);
        return Ok(());
    };
    let id = backend.borrow_mut().create_program();
    isolate.attach(handle, Program { id, backend }, true)?;
    ctx.set_return(handle);
    Ok(())
}

// void deleteProgram(WebGLProgram? program)
fn delete_program(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(1)?;
    let value = ctx.arg_slot(0);
    let program = ctx
        .isolate()
        .native_from_dynamic::<Program>(value, class(WEBGL_PROGRAM))?
        .map(Program::id);

    if let (Some(id), Some(handle)) = (program, value.as_object()) {
        let state = ctx.this_native_mut::<RenderingContext>()?;
        if state.current_program == Some(id) {
            state.current_program = None;
        }
        ctx.isolate_mut().detach(handle);
    }
    Ok(())
}

// GLboolean isProgram(WebGLProgram? program)
fn is_program(ctx: &mut CallContext) -> Result<(), NativeError> {
    let value = ctx.arg_slot(0);
    let isolate = ctx.isolate();
    let live = isolate.has_instance(value, class(WEBGL_PROGRAM))
        && value
            .as_object()
            .is_some_and(|handle| isolate.resolve::<Program>(handle).is_some());
    ctx.set_return(live);
    Ok(())
}

// void useProgram(WebGLProgram? program)
fn use_program(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(1)?;
    let (backend, _) = context_state(ctx)?;
    let program = ctx
        .isolate()
        .native_from_dynamic::<Program>(ctx.arg_slot(0), class(WEBGL_PROGRAM))?
        .map(Program::id);

    backend.borrow_mut().use_program(program.unwrap_or(0));
    ctx.this_native_mut::<RenderingContext>()?.current_program = program;
    Ok(())
}

// WebGLUniformLocation? getUniformLocation(WebGLProgram program, DOMString name)
fn get_uniform_location(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(2)?;
    let (backend, _) = context_state(ctx)?;
    let program = ctx
        .isolate()
        .native_from_dynamic::<Program>(ctx.arg_slot(0), class(WEBGL_PROGRAM))?
        .map(Program::id);
    let name = ctx.arg::<String>(1)?;

    let Some(program_id) = program else {
        ctx.set_return(Dynamic::Null);
        return record(ctx, GlError::InvalidValue);
    };
    let location = backend.borrow_mut().uniform_location(program_id, &name);
    if location < 0 {
        ctx.set_return(Dynamic::Null);
        return Ok(());
    }

    let isolate = ctx.isolate_mut();
    let Some(handle) = create_handle(isolate, WEBGL_UNIFORM_LOCATION)? else {
        ctx.set_return(Dynamic::Null);
        return Ok(());
    };
    isolate.attach(
        handle,
        UniformLocation {
            program_id,
            location,
        },
        true,
    )?;
    ctx.set_return(handle);
    Ok(())
}

// void uniform1i(WebGLUniformLocation? location, GLint x)
fn uniform1i(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(2)?;
    let (backend, _) = context_state(ctx)?;
    let location = ctx
        .isolate()
        .native_from_dynamic::<UniformLocation>(ctx.arg_slot(0), class(WEBGL_UNIFORM_LOCATION))?
        .copied();
    let value = ctx.arg::<i32>(1)?;

    let Some(location) = location else {
        return Ok(());
    };
    if ctx.this_native::<RenderingContext>()?.current_program != Some(location.program_id) {
        return record(ctx, GlError::InvalidOperation);
    }
    backend.borrow_mut().uniform1i(location.location, value);
    Ok(())
}

// void bufferData(GLenum target, (GLsizeiptr or ArrayBuffer or ArrayBufferView)? data, GLenum usage)
fn buffer_data(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(3)?;
    let target = ctx.arg::<u32>(0)?;
    let usage = ctx.arg::<u32>(2)?;
    let (backend, _) = context_state(ctx)?;

    let (Ok(target), Ok(usage)) = (BufferTarget::try_from(target), BufferUsage::try_from(usage)) else {
        return record(ctx, GlError::InvalidEnum);
    };

    let value = ctx.arg_slot(1);
    if value.is_number() {
        let size = u32::from_dynamic(value)? as usize;
        backend.borrow_mut().buffer_data(target, BufferSource::Size(size), usage);
        return Ok(());
    }
    if value.is_nullish() {
        return record(ctx, GlError::InvalidValue);
    }

    match array_data(ctx.isolate(), value)? {
        Some(bytes) => {
            backend.borrow_mut().buffer_data(target, BufferSource::Bytes(bytes), usage);
            Ok(())
        }
        None => Err(NativeError::type_error(
            "bufferData expects a size, ArrayBuffer or ArrayBufferView",
        )),
    }
}
