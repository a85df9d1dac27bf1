//! Typed arrays: `ArrayBuffer` and the typed views over it.
//!
//! ```text
//! ArrayBuffer ──internal slot──► RawBuffer (owns bytes)
//!      ▲
//!      │ "buffer" property + indexed data (non-owning, traced)
//!      │
//! Float32Array ──internal slot──► TypedView { kind, byte_offset, length }
//!      │
//!      └─ inherits ArrayBufferView (hidden): dispose()
//! ```
//!
//! Views never own memory. The bytes stay valid while the buffer object is
//! reachable, and a view keeps its buffer reachable. Element access goes
//! through the host indexing operators on the view, which convert per the
//! view's [`ElementKind`] and store little-endian.
//!
//! View constructor shapes:
//!
//! - `View(length)` - new zeroed buffer of `length * BYTES_PER_ELEMENT` bytes
//! - `View(arrayLike)` - new buffer, elements copied from `arrayLike[i]`
//! - `View(buffer, byteOffset?, length?)` - alias an existing buffer

use hostbridge_core::{
    Dynamic, Element, ElementKind, FromDynamic, IndexedData, NativeError, ObjectHandle, PropertyAttributes,
    RawBuffer, TypeHash, encode_elements,
};
use hostbridge_registry::{CallContext, ClassBuilder, ClassDescriptor, Isolate, Module};

pub const ARRAY_BUFFER: &str = "ArrayBuffer";
pub const ARRAY_BUFFER_VIEW: &str = "ArrayBufferView";

const NOT_ALIGNED: &str = "Byte offset is not aligned.";
const OFFSET_OUT_OF_RANGE: &str = "Byte offset out of range.";
const LENGTH_OUT_OF_RANGE: &str = "Length out of range.";

const FIXED: PropertyAttributes = PropertyAttributes::READ_ONLY.union(PropertyAttributes::DONT_DELETE);

/// Native instance of a typed view.
///
/// Describes the window; the bytes belong to the buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedView {
    kind: ElementKind,
    buffer: ObjectHandle,
    byte_offset: usize,
    length: usize,
}

impl TypedView {
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The buffer object this view aliases.
    pub fn buffer(&self) -> ObjectHandle {
        self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Element count.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn byte_length(&self) -> usize {
        self.length * self.kind.size()
    }
}

/// Class hash of the view for `kind`.
pub fn view_class(kind: ElementKind) -> TypeHash {
    TypeHash::from_name(kind.class_name())
}

pub fn array_buffer_class() -> TypeHash {
    TypeHash::from_name(ARRAY_BUFFER)
}

pub fn array_buffer_view_class() -> TypeHash {
    TypeHash::from_name(ARRAY_BUFFER_VIEW)
}

/// The typed array module: `ArrayBuffer`, the hidden `ArrayBufferView` base,
/// and one view class per element kind.
pub fn module() -> Module {
    ElementKind::ALL.iter().fold(
        Module::new("typed_array")
            .class(array_buffer_descriptor())
            .class(view_base_descriptor()),
        |module, kind| module.class(view_descriptor(*kind)),
    )
}

fn array_buffer_descriptor() -> ClassDescriptor {
    ClassBuilder::new(ARRAY_BUFFER)
        .constructor(construct_array_buffer)
        .method("slice", array_buffer_slice)
        .method("dispose", dispose)
        .build()
}

fn view_base_descriptor() -> ClassDescriptor {
    ClassBuilder::new(ARRAY_BUFFER_VIEW)
        .hidden()
        .method("dispose", dispose)
        .build()
}

fn view_descriptor(kind: ElementKind) -> ClassDescriptor {
    ClassBuilder::new(kind.class_name())
        .inherits(ARRAY_BUFFER_VIEW)
        .constructor(move |ctx: &mut CallContext| construct_view(ctx, kind))
        .constant("BYTES_PER_ELEMENT", Dynamic::Int(kind.size() as i64))
        .build()
}

// ============================================================================
// ArrayBuffer
// ============================================================================

fn check_buffer_length(isolate: &Isolate, byte_length: usize) -> Result<usize, NativeError> {
    if byte_length > isolate.max_buffer_length() {
        log::debug!("refusing {} byte buffer", byte_length);
        return Err(NativeError::AllocationFailed);
    }
    Ok(byte_length)
}

fn allocate(isolate: &Isolate, byte_length: usize) -> Result<RawBuffer, NativeError> {
    Ok(RawBuffer::zeroed(check_buffer_length(isolate, byte_length)?)?)
}

/// Bytes needed for `length` elements of `kind`, within the buffer limit.
fn view_byte_length(isolate: &Isolate, kind: ElementKind, length: usize) -> Result<usize, NativeError> {
    let byte_length = length.checked_mul(kind.size()).ok_or(NativeError::AllocationFailed)?;
    check_buffer_length(isolate, byte_length)
}

// ArrayBuffer(unsigned long length)
fn construct_array_buffer(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(1)?;
    let byte_length = ctx.arg::<u32>(0)? as usize;
    let this = ctx.this()?;
    let buffer = allocate(ctx.isolate(), byte_length)?;

    let isolate = ctx.isolate_mut();
    isolate.attach(this, buffer, true)?;
    isolate
        .heap_mut()
        .define_property(this, "byteLength", Dynamic::Int(byte_length as i64), FIXED)?;
    Ok(())
}

/// Create an `ArrayBuffer` of `byte_length` zeroed bytes.
pub fn create_array_buffer(isolate: &mut Isolate, byte_length: usize) -> Result<ObjectHandle, NativeError> {
    isolate.create(array_buffer_class(), &[Dynamic::Int(byte_length as i64)])
}

/// Resolve an index argument relative to `length`, negative counting from the end.
fn relative_index(index: i32, length: usize) -> usize {
    let index = i64::from(index);
    let length = length as i64;
    let resolved = if index < 0 { length + index } else { index };
    resolved.clamp(0, length) as usize
}

// ArrayBuffer slice(long begin, optional long end)
fn array_buffer_slice(ctx: &mut CallContext) -> Result<(), NativeError> {
    ctx.require_args(1)?;
    let length = ctx.this_native::<RawBuffer>()?.len();
    let begin = relative_index(ctx.arg::<i32>(0)?, length);
    let end = if ctx.arg_count() >= 2 {
        relative_index(ctx.arg::<i32>(1)?, length)
    } else {
        length
    };

    let bytes = ctx.this_native::<RawBuffer>()?.as_slice()[begin..end.max(begin)].to_vec();
    let isolate = ctx.isolate_mut();
    let copy = create_array_buffer(isolate, bytes.len())?;
    isolate
        .resolve_mut::<RawBuffer>(copy)
        .ok_or(NativeError::ObjectDisposed)?
        .as_mut_slice()
        .copy_from_slice(&bytes);
    ctx.set_return(copy);
    Ok(())
}

// void dispose()
fn dispose(ctx: &mut CallContext) -> Result<(), NativeError> {
    let this = ctx.this()?;
    if ctx.isolate_mut().detach(this) {
        Ok(())
    } else {
        Err(NativeError::ObjectDisposed)
    }
}

// ============================================================================
// Views
// ============================================================================

/// Validate a view over an existing buffer of `buffer_length` bytes.
///
/// Returns the element count.
fn check_window(
    kind: ElementKind,
    buffer_length: usize,
    byte_offset: usize,
    length: Option<usize>,
) -> Result<usize, NativeError> {
    if !kind.is_aligned(byte_offset) {
        return Err(NativeError::range(NOT_ALIGNED));
    }

    let length = match length {
        Some(length) => length,
        None => {
            if buffer_length <= byte_offset {
                return Err(NativeError::range(OFFSET_OUT_OF_RANGE));
            }
            // Remaining bytes must be a whole number of elements
            if !kind.is_aligned(buffer_length - byte_offset) {
                return Err(NativeError::range(NOT_ALIGNED));
            }
            (buffer_length - byte_offset) / kind.size()
        }
    };

    let end = length
        .checked_mul(kind.size())
        .and_then(|bytes| bytes.checked_add(byte_offset));
    match end {
        Some(end) if byte_offset < buffer_length && end <= buffer_length => Ok(length),
        _ => Err(NativeError::range(LENGTH_OUT_OF_RANGE)),
    }
}

// TypedArray(unsigned long length)
// TypedArray(TypedArray array)
// TypedArray(type[] array)
// TypedArray(ArrayBuffer buffer, optional unsigned long byteOffset, optional unsigned long length)
fn construct_view(ctx: &mut CallContext, kind: ElementKind) -> Result<(), NativeError> {
    let this = ctx.this()?;
    let first = ctx.arg_slot(0);
    let mut copied: Option<Vec<Dynamic>> = None;

    let (buffer, byte_offset, length) = if ctx.isolate().has_instance(first, array_buffer_class()) {
        let buffer_length = ctx
            .isolate()
            .native_from_dynamic::<RawBuffer>(first, array_buffer_class())?
            .map(RawBuffer::len)
            .ok_or(NativeError::ObjectDisposed)?;
        let byte_offset = if ctx.arg_count() >= 2 {
            ctx.arg::<u32>(1)? as usize
        } else {
            0
        };
        let length = if ctx.arg_count() >= 3 {
            Some(ctx.arg::<u32>(2)? as usize)
        } else {
            None
        };
        let length = check_window(kind, buffer_length, byte_offset, length)?;
        let buffer = first.as_object().ok_or(NativeError::ObjectDisposed)?;
        (buffer, byte_offset, length)
    } else if let Dynamic::Object(_) = first {
        let isolate = ctx.isolate();
        let length = u32::from_dynamic(&isolate.get_property(first, "length")?)? as usize;
        let byte_length = view_byte_length(isolate, kind, length)?;
        let values = (0..length)
            .map(|index| isolate.get_index(first, index))
            .collect::<Result<Vec<_>, _>>()?;
        copied = Some(values);
        (create_array_buffer(ctx.isolate_mut(), byte_length)?, 0, length)
    } else {
        let length = if ctx.arg_count() >= 1 {
            ctx.arg::<u32>(0)? as usize
        } else {
            0
        };
        let byte_length = view_byte_length(ctx.isolate(), kind, length)?;
        (create_array_buffer(ctx.isolate_mut(), byte_length)?, 0, length)
    };

    let heap = ctx.heap_mut();
    heap.set_indexed_data(
        this,
        IndexedData {
            buffer,
            byte_offset,
            length,
            kind,
        },
    )?;
    heap.define_property(this, "buffer", Dynamic::Object(buffer), FIXED)?;
    heap.define_property(this, "length", Dynamic::Int(length as i64), FIXED)?;
    heap.define_property(this, "byteOffset", Dynamic::Int(byte_offset as i64), FIXED)?;
    heap.define_property(
        this,
        "byteLength",
        Dynamic::Int((length * kind.size()) as i64),
        FIXED,
    )?;

    ctx.isolate_mut().attach(
        this,
        TypedView {
            kind,
            buffer,
            byte_offset,
            length,
        },
        true,
    )?;

    if let Some(values) = copied {
        let heap = ctx.heap_mut();
        for (index, value) in values.iter().enumerate() {
            heap.set_element(this, index, value)?;
        }
    }
    Ok(())
}

/// Create a view of `kind` pre-filled with a bit copy of `values`.
///
/// # Errors
///
/// `Type` if `T` does not have the element size of `kind`.
pub fn create_from_slice<T: Element>(
    isolate: &mut Isolate,
    kind: ElementKind,
    values: &[T],
) -> Result<ObjectHandle, NativeError> {
    if T::SIZE != kind.size() {
        return Err(NativeError::type_error(format!(
            "{} elements are {} bytes, got {}",
            kind.class_name(),
            kind.size(),
            T::SIZE
        )));
    }

    let view = isolate.create(view_class(kind), &[Dynamic::Int(values.len() as i64)])?;
    if !values.is_empty() {
        let bytes = encode_elements(values);
        let buffer = isolate
            .resolve::<TypedView>(view)
            .map(TypedView::buffer)
            .ok_or(NativeError::ObjectDisposed)?;
        isolate
            .resolve_mut::<RawBuffer>(buffer)
            .ok_or(NativeError::ObjectDisposed)?
            .as_mut_slice()[..bytes.len()]
            .copy_from_slice(&bytes);
    }
    Ok(view)
}

/// Bytes addressed by an `ArrayBuffer` or any view.
///
/// Returns `None` for values that are neither.
///
/// # Errors
///
/// `ObjectDisposed` if the object or its buffer has been disposed.
pub fn array_data<'i>(isolate: &'i Isolate, value: &Dynamic) -> Result<Option<&'i [u8]>, NativeError> {
    let Some(handle) = value.as_object() else {
        return Ok(None);
    };
    if isolate.has_instance(value, array_buffer_class()) {
        return Ok(Some(isolate.heap().buffer_bytes(handle)?));
    }
    if isolate.has_instance(value, array_buffer_view_class()) {
        return Ok(Some(isolate.heap().indexed_bytes(handle)?));
    }
    Ok(None)
}
