//! Raw-pointer plumbing shared by the exported entry points.
//!
//! # Invariants
//! - No panic leaves this crate: every entry point runs through [`guard`].
//! - Module contexts handed to the host are non-zero table keys, never
//!   addresses; unknown or unregistered keys resolve to `UnexpectedError`.
//! - Out-pointers are null-checked before any write.

use log::{debug, error, warn};
use shadex_core::{ArgValue, ExtError, ExtensionModule, ResultCode};
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// String argument payload passed for `ARG_STRING` values.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StringArg {
    /// UTF-8 bytes, not necessarily NUL-terminated.
    pub data: *const c_char,
    /// Byte length of `data`.
    pub length: c_int,
}

type SharedModule = Arc<Mutex<ExtensionModule>>;

#[derive(Default)]
struct ContextTable {
    next: usize,
    live: HashMap<usize, SharedModule>,
}

static CONTEXTS: OnceLock<Mutex<ContextTable>> = OnceLock::new();

fn contexts() -> MutexGuard<'static, ContextTable> {
    CONTEXTS
        .get_or_init(|| Mutex::new(ContextTable::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Stores `module` and returns the context value for the host.
pub(crate) fn insert_context(module: ExtensionModule) -> *mut c_void {
    let mut table = contexts();
    table.next += 1;
    let key = table.next;
    table.live.insert(key, Arc::new(Mutex::new(module)));
    key as *mut c_void
}

/// Removes a context; the module is returned once no call is using it.
pub(crate) fn remove_context(context: *mut c_void) -> Option<SharedModule> {
    contexts().live.remove(&(context as usize))
}

/// Runs `body` against the module behind `context`.
pub(crate) fn with_module(
    entry: &'static str,
    context: *mut c_void,
    body: impl FnOnce(&mut ExtensionModule) -> Result<ResultCode, ExtError>,
) -> ResultCode {
    let shared = contexts().live.get(&(context as usize)).cloned();
    let Some(shared) = shared else {
        warn!(
            "event=ffi_call module=ffi status=error entry={entry} reason=unknown_context context={:#x}",
            context as usize
        );
        return ResultCode::UnexpectedError;
    };
    let mut module = shared.lock().unwrap_or_else(PoisonError::into_inner);
    match body(&mut module) {
        Ok(code) => code,
        Err(err) => fail(entry, &err),
    }
}

/// Logs `err` and maps it to its result code.
pub(crate) fn fail(entry: &'static str, err: &ExtError) -> ResultCode {
    let code = err.code();
    if code == ResultCode::ParseError {
        debug!("event=ffi_call module=ffi status=parse_error entry={entry} reason={err}");
    } else {
        warn!("event=ffi_call module=ffi status=error entry={entry} reason={err}");
    }
    code
}

/// Runs one entry point and converts its outcome to the raw result code.
pub(crate) fn guard(entry: &'static str, body: impl FnOnce() -> ResultCode) -> c_int {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(code) => code.as_raw(),
        Err(_) => {
            error!("event=ffi_panic module=ffi status=error entry={entry}");
            ResultCode::UnexpectedError.as_raw()
        }
    }
}

/// Error for a null or otherwise unusable host pointer.
pub(crate) fn bad_pointer(operation: &'static str) -> ExtError {
    ExtError::InvalidState {
        operation,
        reason: "null or invalid pointer argument",
    }
}

/// Writes `value` through `out` when it is non-null.
///
/// # Safety
/// `out` must be null or valid for a write of `T`.
pub(crate) unsafe fn store<T>(out: *mut T, value: T) -> bool {
    if out.is_null() {
        return false;
    }
    // SAFETY: Non-null checked above; validity is the caller's contract.
    unsafe { out.write(value) };
    true
}

/// Reads an in/out integer.
///
/// # Safety
/// `ptr` must be null or valid for a read of `c_int`.
pub(crate) unsafe fn load(ptr: *const c_int) -> Option<c_int> {
    if ptr.is_null() {
        None
    } else {
        // SAFETY: Non-null checked above; validity is the caller's contract.
        Some(unsafe { ptr.read() })
    }
}

/// Borrows `len` bytes at `data`. A zero length needs no pointer.
///
/// # Safety
/// When `len > 0`, `data` must point to `len` readable bytes that stay
/// valid for `'a`.
pub(crate) unsafe fn bytes<'a>(data: *const c_void, len: usize) -> Option<&'a [u8]> {
    if len == 0 {
        return Some(&[]);
    }
    if data.is_null() {
        return None;
    }
    // SAFETY: Non-null and length checked; validity is the caller's contract.
    Some(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) })
}

/// Mutable variant of [`bytes`].
///
/// # Safety
/// When `len > 0`, `data` must point to `len` writable bytes, not aliased
/// elsewhere, that stay valid for `'a`.
pub(crate) unsafe fn bytes_mut<'a>(data: *mut c_void, len: usize) -> Option<&'a mut [u8]> {
    if len == 0 {
        return Some(&mut []);
    }
    if data.is_null() {
        return None;
    }
    // SAFETY: Non-null and length checked; validity is the caller's contract.
    Some(unsafe { std::slice::from_raw_parts_mut(data.cast::<u8>(), len) })
}

/// Why a tagged host value could not be decoded.
#[derive(Debug)]
pub(crate) enum DecodeError {
    /// Tag is not exactly one known argument type.
    UnknownType(c_int),
    Invalid(ExtError),
}

/// Decodes one tagged value (`ARG_BOOL`, `ARG_INT`, `ARG_FLOAT`,
/// `ARG_STRING`).
///
/// # Safety
/// `data` must be null or point to the payload matching `value_type`:
/// `c_int` for bool/int, `f32` for float, [`StringArg`] for string.
pub(crate) unsafe fn decode_value(
    value_type: c_int,
    data: *const c_void,
) -> Result<ArgValue, DecodeError> {
    let arg_type =
        shadex_core::ArgType::from_raw(value_type).ok_or(DecodeError::UnknownType(value_type))?;
    if data.is_null() {
        return Err(DecodeError::Invalid(bad_pointer("decode_value")));
    }
    // SAFETY: Non-null checked; the tag selects the payload type per contract.
    let value = unsafe {
        match arg_type {
            shadex_core::ArgType::Bool => ArgValue::Bool(data.cast::<c_int>().read() != 0),
            shadex_core::ArgType::Int => ArgValue::Int(data.cast::<c_int>().read()),
            shadex_core::ArgType::Float => ArgValue::Float(data.cast::<f32>().read()),
            shadex_core::ArgType::String => {
                let arg = data.cast::<StringArg>().read();
                let len = usize::try_from(arg.length)
                    .map_err(|_| DecodeError::Invalid(bad_pointer("decode_value")))?;
                let raw = bytes(arg.data.cast::<c_void>(), len)
                    .ok_or_else(|| DecodeError::Invalid(bad_pointer("decode_value")))?;
                let text = shadex_core::text::decode_text(raw, shadex_core::Encoding::Utf8)
                    .map_err(DecodeError::Invalid)?;
                ArgValue::String(text)
            }
        }
    };
    Ok(value)
}

/// Converts a host dimension or index into an unsigned value.
pub(crate) fn non_negative(value: c_int, operation: &'static str) -> Result<u32, ExtError> {
    u32::try_from(value).map_err(|_| ExtError::InvalidState {
        operation,
        reason: "negative dimension or index",
    })
}
