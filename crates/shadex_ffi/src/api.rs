//! Exported `shadron_*` entry points.
//!
//! # Responsibility
//! - Translate raw host arguments into `shadex_core` calls and core results
//!   back into raw codes and out-parameters.
//! - Keep all protocol semantics in the core crate.
//!
//! # FFI contract
//! - Every function returns one of the closed result codes and never unwinds.
//! - Out-parameters are written only on the result codes that define them.
//! - In/out lengths carry the capacity in and the written length out, in
//!   units of the stated encoding.
//! - Calls on one module context are serialized by its mutex.

use crate::boundary::{
    bad_pointer, bytes, bytes_mut, decode_value, fail, guard, insert_context, load,
    non_negative, remove_context, store, with_module, DecodeError,
};
use log::{debug, warn};
use shadex_core::{
    ArgTypes, BufferToken, Encoding, ExtError, FrameRequest, HookOutcome, ModuleConfig,
    ObjectKind, ObjectToken, ParseToken, PixelFormat, PrepareHints, ResultCode, SourceFrame,
    UserCommand,
};
use std::ffi::{c_char, c_float, c_int, c_void};
use std::ptr;
use std::sync::{Arc, PoisonError};

fn object_token(object: *mut c_void) -> ObjectToken {
    ObjectToken::from_raw(object as usize)
}

fn parse_token(parse_context: *mut c_void) -> ParseToken {
    ParseToken::from_raw(parse_context as usize)
}

fn hook_code(outcome: HookOutcome) -> ResultCode {
    match outcome {
        HookOutcome::Applied => ResultCode::Ok,
        HookOutcome::Ignored => ResultCode::Ignore,
    }
}

fn encoding(raw: c_int) -> Result<Encoding, ExtError> {
    Encoding::from_raw(raw)
        .ok_or_else(|| ExtError::InvalidText(format!("unknown encoding {raw}")))
}

fn pixel_format(raw: c_int) -> Result<PixelFormat, ExtError> {
    PixelFormat::from_raw(raw)
        .ok_or_else(|| ExtError::RequestMismatch(format!("unknown pixel format {raw}")))
}

/// Registers the extension and creates its module context.
///
/// `name_length` holds the capacity of `name` on entry and the written
/// length on success.
///
/// # Safety
/// Every pointer must be null or valid for the documented access; `name`
/// must be writable for `*name_length` bytes.
#[no_mangle]
pub unsafe extern "C" fn shadron_register_extension(
    magic_number: *mut c_int,
    flags: *mut c_int,
    name: *mut c_char,
    name_length: *mut c_int,
    version: *mut c_int,
    context: *mut *mut c_void,
) -> c_int {
    guard("register_extension", || {
        if magic_number.is_null() || flags.is_null() || version.is_null() || context.is_null() {
            return fail("register_extension", &bad_pointer("register_extension"));
        }
        // SAFETY: Pointer contract documented on this function.
        let Some(capacity) = (unsafe { load(name_length) }) else {
            return fail("register_extension", &bad_pointer("register_extension"));
        };
        let capacity = usize::try_from(capacity).unwrap_or(0);
        // SAFETY: `name` is writable for `capacity` bytes per contract.
        let Some(name_buf) = (unsafe { bytes_mut(name.cast::<c_void>(), capacity) }) else {
            return fail("register_extension", &bad_pointer("register_extension"));
        };

        match shadex_core::register(ModuleConfig::global().clone(), name_buf) {
            Ok((registration, module)) => {
                // SAFETY: All out-pointers were null-checked above.
                unsafe {
                    store(magic_number, registration.magic);
                    store(flags, registration.flags.bits() as c_int);
                    store(name_length, registration.name_len as c_int);
                    store(version, registration.version);
                    store(context, insert_context(module));
                }
                ResultCode::Ok
            }
            Err(err) => fail("register_extension", &err),
        }
    })
}

/// Destroys the module context, reclaiming anything the host leaked.
///
/// # Safety
/// `context` must be a value produced by [`shadron_register_extension`] or
/// any other value; unknown values are rejected without being dereferenced.
#[no_mangle]
pub unsafe extern "C" fn shadron_unregister_extension(context: *mut c_void) -> c_int {
    guard("unregister_extension", || {
        let Some(shared) = remove_context(context) else {
            warn!(
                "event=extension_unregister module=ffi status=error reason=unknown_context context={:#x}",
                context as usize
            );
            return ResultCode::UnexpectedError;
        };
        match Arc::try_unwrap(shared) {
            Ok(mutex) => {
                let module = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
                shadex_core::unregister(module);
            }
            Err(shared) => {
                shared
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .shutdown();
            }
        }
        ResultCode::Ok
    })
}

/// Reports initializer `index`; `NO_MORE_ITEMS` past the last one.
///
/// # Safety
/// `flags` and `name_length` must be valid; `name` must be writable for
/// `*name_length` bytes.
#[no_mangle]
pub unsafe extern "C" fn shadron_register_initializer(
    context: *mut c_void,
    index: c_int,
    flags: *mut c_int,
    name: *mut c_char,
    name_length: *mut c_int,
) -> c_int {
    guard("register_initializer", || {
        with_module("register_initializer", context, |module| {
            if flags.is_null() {
                return Err(bad_pointer("register_initializer"));
            }
            // SAFETY: Pointer contract documented on this function.
            let capacity = unsafe { load(name_length) }
                .ok_or_else(|| bad_pointer("register_initializer"))?;
            let capacity = usize::try_from(capacity).unwrap_or(0);
            // SAFETY: `name` is writable for `capacity` bytes per contract.
            let name_buf = unsafe { bytes_mut(name.cast::<c_void>(), capacity) }
                .ok_or_else(|| bad_pointer("register_initializer"))?;

            match module.enumerate_initializer(index, name_buf)? {
                Some(info) => {
                    // SAFETY: Both pointers were checked above.
                    unsafe {
                        store(flags, info.kinds.bits() as c_int);
                        store(name_length, info.name_len as c_int);
                    }
                    Ok(ResultCode::Ok)
                }
                None => Ok(ResultCode::NoMoreItems),
            }
        })
    })
}

/// Opens a parse context for initializer `index` named `name`.
///
/// # Safety
/// `name` must be readable for `name_length` bytes; out-pointers must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn shadron_parse_initializer(
    context: *mut c_void,
    object_type: c_int,
    index: c_int,
    name: *const c_char,
    name_length: c_int,
    parse_context: *mut *mut c_void,
    first_argument_types: *mut c_int,
) -> c_int {
    guard("parse_initializer", || {
        with_module("parse_initializer", context, |module| {
            if parse_context.is_null() || first_argument_types.is_null() {
                return Err(bad_pointer("parse_initializer"));
            }
            let kind =
                ObjectKind::from_raw(object_type).ok_or(ExtError::InvalidObjectKind(object_type))?;
            let len = usize::try_from(name_length).map_err(|_| bad_pointer("parse_initializer"))?;
            // SAFETY: `name` is readable for `len` bytes per contract.
            let keyword = unsafe { bytes(name.cast::<c_void>(), len) }
                .ok_or_else(|| bad_pointer("parse_initializer"))?;

            let (token, expected) = module.begin_parse(kind, index, keyword)?;
            // SAFETY: Both pointers were checked above.
            unsafe {
                store(parse_context, token.as_raw() as *mut c_void);
                store(first_argument_types, expected.bits() as c_int);
            }
            Ok(ResultCode::Ok)
        })
    })
}

/// Offers one argument to a parse context.
///
/// # Safety
/// `argument_data` must point to the payload matching `argument_type`;
/// `next_argument_types` must be valid for a write.
#[no_mangle]
pub unsafe extern "C" fn shadron_parse_initializer_argument(
    context: *mut c_void,
    parse_context: *mut c_void,
    arg_no: c_int,
    argument_type: c_int,
    argument_data: *const c_void,
    next_argument_types: *mut c_int,
) -> c_int {
    guard("parse_initializer_argument", || {
        with_module("parse_initializer_argument", context, |module| {
            let token = parse_token(parse_context);
            // SAFETY: Payload contract documented on this function.
            let decoded = unsafe { decode_value(argument_type, argument_data) };
            let result = match decoded {
                Ok(value) => module.apply_argument(token, arg_no, value),
                Err(DecodeError::UnknownType(raw)) => {
                    module.reject_argument_type(token, arg_no, raw)
                }
                Err(DecodeError::Invalid(err)) => Err(err),
            };
            let next = result.as_ref().copied().unwrap_or(ArgTypes::NONE);
            // SAFETY: Null is tolerated by `store`.
            unsafe { store(next_argument_types, next.bits() as c_int) };
            result.map(|_| ResultCode::Ok)
        })
    })
}

/// Closes a parse context; on `result == OK` the object is created.
///
/// # Safety
/// `object_name` must be readable for `name_length` bytes; `object` must be
/// valid for a write.
#[no_mangle]
pub unsafe extern "C" fn shadron_parse_initializer_finish(
    context: *mut c_void,
    parse_context: *mut c_void,
    result: c_int,
    object_type: c_int,
    object_name: *const c_char,
    name_length: c_int,
    object: *mut *mut c_void,
) -> c_int {
    guard("parse_initializer_finish", || {
        with_module("parse_initializer_finish", context, |module| {
            let token = parse_token(parse_context);
            let parse_ok = result == ResultCode::Ok.as_raw();
            let Some(kind) = ObjectKind::from_raw(object_type) else {
                module.discard_parse(token)?;
                return if parse_ok {
                    Err(ExtError::InvalidObjectKind(object_type))
                } else {
                    Ok(ResultCode::Ok)
                };
            };
            let name_len = usize::try_from(name_length).unwrap_or(0);
            // SAFETY: `object_name` is readable for `name_len` bytes per contract.
            let name = unsafe { bytes(object_name.cast::<c_void>(), name_len) }
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            if parse_ok && object.is_null() {
                module.discard_parse(token)?;
                return Err(bad_pointer("parse_initializer_finish"));
            }

            let created = module.finish_parse(token, parse_ok, kind, &name)?;
            if let Some(created) = created {
                // SAFETY: Checked non-null above for the success path.
                unsafe { store(object, created.as_raw() as *mut c_void) };
            }
            Ok(ResultCode::Ok)
        })
    })
}

/// Length of the parse diagnostic in `encoding` units, or `NO_DATA`.
///
/// # Safety
/// `length` must be valid for a write.
#[no_mangle]
pub unsafe extern "C" fn shadron_parse_error_length(
    context: *mut c_void,
    parse_context: *mut c_void,
    length: *mut c_int,
    encoding_raw: c_int,
) -> c_int {
    guard("parse_error_length", || {
        with_module("parse_error_length", context, |module| {
            let encoding = encoding(encoding_raw)?;
            match module.parse_error_len(parse_token(parse_context), encoding) {
                Some(len) => {
                    // SAFETY: Pointer contract documented on this function.
                    if !unsafe { store(length, len as c_int) } {
                        return Err(bad_pointer("parse_error_length"));
                    }
                    Ok(ResultCode::Ok)
                }
                None => Ok(ResultCode::NoData),
            }
        })
    })
}

/// Writes the parse diagnostic into `buffer`.
///
/// # Safety
/// `length` must be valid for read and write; `buffer` must be writable for
/// `*length` units of `buffer_encoding`.
#[no_mangle]
pub unsafe extern "C" fn shadron_parse_error_string(
    context: *mut c_void,
    parse_context: *mut c_void,
    buffer: *mut c_void,
    length: *mut c_int,
    buffer_encoding: c_int,
) -> c_int {
    guard("parse_error_string", || {
        with_module("parse_error_string", context, |module| {
            let encoding = encoding(buffer_encoding)?;
            // SAFETY: Pointer contract documented on this function.
            let capacity =
                unsafe { load(length) }.ok_or_else(|| bad_pointer("parse_error_string"))?;
            let capacity = usize::try_from(capacity).unwrap_or(0) * encoding.unit_size();
            // SAFETY: `buffer` is writable for `capacity` bytes per contract.
            let dst = unsafe { bytes_mut(buffer, capacity) }
                .ok_or_else(|| bad_pointer("parse_error_string"))?;
            match module.write_parse_error(parse_token(parse_context), encoding, dst)? {
                Some(units) => {
                    // SAFETY: Read succeeded above, so the pointer is non-null.
                    unsafe { store(length, units as c_int) };
                    Ok(ResultCode::Ok)
                }
                None => Ok(ResultCode::NoData),
            }
        })
    })
}

/// Prepares an object. `flags` carries hints in and object flags out.
///
/// # Safety
/// All out-pointers must be valid for read/write of `c_int`.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_prepare(
    context: *mut c_void,
    object: *mut c_void,
    flags: *mut c_int,
    width: *mut c_int,
    height: *mut c_int,
    format: *mut c_int,
) -> c_int {
    guard("object_prepare", || {
        with_module("object_prepare", context, |module| {
            if width.is_null() || height.is_null() || format.is_null() {
                return Err(bad_pointer("object_prepare"));
            }
            // SAFETY: Pointer contract documented on this function.
            let hints = unsafe { load(flags) }.ok_or_else(|| bad_pointer("object_prepare"))?;
            let prepared = module.prepare(
                object_token(object),
                PrepareHints::from_bits_truncate(hints as u32),
            )?;
            // SAFETY: All pointers checked above.
            unsafe {
                store(flags, prepared.flags.bits() as c_int);
                store(width, prepared.working_set.width as c_int);
                store(height, prepared.working_set.height as c_int);
                store(format, prepared.working_set.format.as_raw());
            }
            Ok(ResultCode::Ok)
        })
    })
}

/// Re-reports the object's working set.
///
/// # Safety
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_size(
    context: *mut c_void,
    object: *mut c_void,
    width: *mut c_int,
    height: *mut c_int,
    format: *mut c_int,
) -> c_int {
    guard("object_size", || {
        with_module("object_size", context, |module| {
            if width.is_null() || height.is_null() || format.is_null() {
                return Err(bad_pointer("object_size"));
            }
            let working_set = module.resize_query(object_token(object))?;
            // SAFETY: All pointers checked above.
            unsafe {
                store(width, working_set.width as c_int);
                store(height, working_set.height as c_int);
                store(format, working_set.format.as_raw());
            }
            Ok(ResultCode::Ok)
        })
    })
}

/// Loads a file into an object that advertised `FILE_INPUT`.
///
/// # Safety
/// `path` must be readable for `path_length` units of `path_encoding`.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_load_file(
    context: *mut c_void,
    object: *mut c_void,
    path: *const c_void,
    path_length: c_int,
    path_encoding: c_int,
) -> c_int {
    guard("object_load_file", || {
        with_module("object_load_file", context, |module| {
            let encoding = encoding(path_encoding)?;
            let len = usize::try_from(path_length).map_err(|_| bad_pointer("object_load_file"))?
                * encoding.unit_size();
            // SAFETY: `path` is readable for `len` bytes per contract.
            let raw = unsafe { bytes(path, len) }.ok_or_else(|| bad_pointer("object_load_file"))?;
            let path = shadex_core::text::decode_text(raw, encoding)?;
            module.load_file(object_token(object), &path)?;
            Ok(ResultCode::Ok)
        })
    })
}

/// Unloads the file previously loaded into an object.
///
/// # Safety
/// No pointer is dereferenced; tokens are validated by the module.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_unload_file(
    context: *mut c_void,
    object: *mut c_void,
) -> c_int {
    guard("object_unload_file", || {
        with_module("object_unload_file", context, |module| {
            module.unload_file(object_token(object))?;
            Ok(ResultCode::Ok)
        })
    })
}

/// Updates a dynamic expression value; `IGNORE` when not advertised.
///
/// # Safety
/// `value` must point to the payload matching `value_type`.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_set_expression_value(
    context: *mut c_void,
    object: *mut c_void,
    expr_index: c_int,
    value_type: c_int,
    value: *const c_void,
) -> c_int {
    guard("object_set_expression_value", || {
        with_module("object_set_expression_value", context, |module| {
            // SAFETY: Payload contract documented on this function.
            let value = match unsafe { decode_value(value_type, value) } {
                Ok(value) => value,
                Err(DecodeError::UnknownType(raw)) => {
                    return Err(ExtError::InvalidState {
                        operation: "object_set_expression_value",
                        reason: if raw == 0 {
                            "value type is empty"
                        } else {
                            "value type is not a single known kind"
                        },
                    })
                }
                Err(DecodeError::Invalid(err)) => return Err(err),
            };
            let outcome = module.set_expression_value(object_token(object), expr_index, &value)?;
            Ok(hook_code(outcome))
        })
    })
}

/// Offers another object's pixels; `IGNORE` declines the offer.
///
/// On acceptance `format` receives the wanted format and the buffer outputs
/// are set to null, so the host allocates the pixels it will post.
///
/// # Safety
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_offer_source_pixels(
    context: *mut c_void,
    object: *mut c_void,
    source_index: c_int,
    source_type: c_int,
    width: c_int,
    height: c_int,
    format: *mut c_int,
    pixel_buffer: *mut *mut c_void,
    pixels_context: *mut *mut c_void,
) -> c_int {
    guard("object_offer_source_pixels", || {
        with_module("object_offer_source_pixels", context, |module| {
            let width = non_negative(width, "object_offer_source_pixels")?;
            let height = non_negative(height, "object_offer_source_pixels")?;
            debug!(
                "event=source_offer module=ffi status=received source_index={source_index} source_type={source_type}"
            );
            let Some(wanted) =
                module.offer_source_pixels(object_token(object), source_index, width, height)?
            else {
                return Ok(ResultCode::Ignore);
            };
            if format.is_null() {
                return Err(bad_pointer("object_offer_source_pixels"));
            }
            // SAFETY: `format` checked above; the others tolerate null.
            unsafe {
                store(format, wanted.as_raw());
                store(pixel_buffer, ptr::null_mut());
                store(pixels_context, ptr::null_mut());
            }
            Ok(ResultCode::Ok)
        })
    })
}

/// Delivers pixels of a source object previously accepted by the offer.
///
/// # Safety
/// `pixels` must be readable for one full frame of `width * height` pixels
/// in `format`.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_post_source_pixels(
    context: *mut c_void,
    object: *mut c_void,
    _pixels_context: *mut c_void,
    source_index: c_int,
    plane: c_int,
    width: c_int,
    height: c_int,
    format: c_int,
    pixels: *const c_void,
) -> c_int {
    guard("object_post_source_pixels", || {
        with_module("object_post_source_pixels", context, |module| {
            let plane = non_negative(plane, "object_post_source_pixels")?;
            let width = non_negative(width, "object_post_source_pixels")?;
            let height = non_negative(height, "object_post_source_pixels")?;
            let format = pixel_format(format)?;
            let len = format.frame_len(width, height).ok_or_else(|| {
                ExtError::RequestMismatch("source frame size overflows".to_string())
            })?;
            // SAFETY: `pixels` is readable for one frame per contract.
            let pixels =
                unsafe { bytes(pixels, len) }.ok_or_else(|| bad_pointer("object_post_source_pixels"))?;
            let frame = SourceFrame {
                plane,
                width,
                height,
                format,
                pixels,
            };
            let outcome = module.post_source_pixels(object_token(object), source_index, frame)?;
            Ok(hook_code(outcome))
        })
    })
}

/// Forwards a user command; `IGNORE` when not advertised.
///
/// # Safety
/// No pointer is dereferenced; tokens are validated by the module.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_user_command(
    context: *mut c_void,
    object: *mut c_void,
    command: c_int,
) -> c_int {
    guard("object_user_command", || {
        with_module("object_user_command", context, |module| {
            let outcome = module.user_command(object_token(object), UserCommand::from_raw(command))?;
            Ok(hook_code(outcome))
        })
    })
}

/// Destroys an object and any buffers still outstanding for it.
///
/// # Safety
/// No pointer is dereferenced; tokens are validated by the module.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_destroy(context: *mut c_void, object: *mut c_void) -> c_int {
    guard("object_destroy", || {
        with_module("object_destroy", context, |module| {
            module.destroy(object_token(object))?;
            Ok(ResultCode::Ok)
        })
    })
}

/// Renders one frame and hands the buffer to the host until release.
///
/// # Safety
/// `pixels` and `pixels_context` must be valid for writes. The returned
/// pixel pointer stays valid until the matching release or destroy.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_fetch_pixels(
    context: *mut c_void,
    object: *mut c_void,
    time: c_float,
    delta_time: c_float,
    real_time: c_int,
    plane: c_int,
    width: c_int,
    height: c_int,
    format: c_int,
    pixels: *mut *const c_void,
    pixels_context: *mut *mut c_void,
) -> c_int {
    guard("object_fetch_pixels", || {
        with_module("object_fetch_pixels", context, |module| {
            if pixels.is_null() || pixels_context.is_null() {
                return Err(bad_pointer("object_fetch_pixels"));
            }
            let request = FrameRequest {
                time,
                delta_time,
                realtime: real_time != 0,
                plane: non_negative(plane, "object_fetch_pixels")?,
                width: non_negative(width, "object_fetch_pixels")?,
                height: non_negative(height, "object_fetch_pixels")?,
                format: pixel_format(format)?,
            };
            let object = object_token(object);
            let buffer = module.fetch(object, &request)?;
            let data = module.pixels(object, buffer)?.as_ptr();
            // SAFETY: Both pointers checked above.
            unsafe {
                store(pixels, data.cast::<c_void>());
                store(pixels_context, buffer.as_raw() as *mut c_void);
            }
            Ok(ResultCode::Ok)
        })
    })
}

/// Returns a buffer obtained from [`shadron_object_fetch_pixels`].
///
/// # Safety
/// No pointer is dereferenced; tokens are validated by the module.
#[no_mangle]
pub unsafe extern "C" fn shadron_object_release_pixels(
    context: *mut c_void,
    object: *mut c_void,
    pixels_context: *mut c_void,
) -> c_int {
    guard("object_release_pixels", || {
        with_module("object_release_pixels", context, |module| {
            module.release(
                object_token(object),
                BufferToken::from_raw(pixels_context as usize),
            )?;
            Ok(ResultCode::Ok)
        })
    })
}
