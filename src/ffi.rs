//! C ABI exported by the shared library.
//!
//! Every function reports failure through its return value (`false`, null or
//! `-1`); errors are logged and panics are caught before they reach the caller.
//! Id buffers are `i32` arrays owned by this library until passed back to
//! [`free_ids`] with the exact length that was reported for them.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicI64, Ordering};

use log::{error, warn};

use crate::base::{Token, Tokenizer};
use crate::error::{Error, Result};
use crate::regex::RegexTokenizer;
use crate::registry;

static OUTSTANDING_BUFFERS: AtomicI64 = AtomicI64::new(0);

/// Opaque tokenizer instance handed to C callers by [`tokenizer_create`].
pub struct TokenizerHandle {
    tokenizer: RegexTokenizer,
}

/// Number of id buffers handed out and not yet released.
pub fn outstanding_buffers() -> i64 {
    OUTSTANDING_BUFFERS.load(Ordering::SeqCst)
}

fn guard<T>(op: &str, fallback: T, f: impl FnOnce() -> Result<T>) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("{op} failed: {e}");
            fallback
        }
        Err(_) => {
            error!("{op} panicked");
            fallback
        }
    }
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn lossy_str<'a>(ptr: *const c_char, what: &'static str) -> Result<Cow<'a, str>> {
    if ptr.is_null() {
        return Err(Error::NullPointer(what));
    }
    Ok(unsafe { CStr::from_ptr(ptr) }.to_string_lossy())
}

/// Zero `out_len` and hand back a writable reference to it.
///
/// # Safety
///
/// `out_len` must be null or valid for writes.
unsafe fn reset_len<'a>(out_len: *mut i32) -> Result<&'a mut i32> {
    let out_len = unsafe { out_len.as_mut() }.ok_or(Error::NullPointer("out_len"))?;
    *out_len = 0;
    Ok(out_len)
}

fn encode_into(tokenizer: &RegexTokenizer, text: &str, out_len: &mut i32) -> Result<*mut i32> {
    let ids = tokenizer.encode(text)?;
    let len = i32::try_from(ids.len()).map_err(|_| Error::LengthOverflow(ids.len()))?;
    // an empty boxed slice yields a dangling, non-null pointer
    let ptr = Box::into_raw(ids.into_boxed_slice()).cast::<Token>();
    OUTSTANDING_BUFFERS.fetch_add(1, Ordering::SeqCst);
    *out_len = len;
    Ok(ptr)
}

/// Load the configuration at `json_path` and install it as the process-wide
/// tokenizer. Returns `false` and keeps any previous tokenizer on failure.
///
/// # Safety
///
/// `json_path` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn init_tokenizer(json_path: *const c_char) -> bool {
    guard("init_tokenizer", false, || {
        let path = unsafe { lossy_str(json_path, "json_path") }?;
        registry::install_from_file(Path::new(path.as_ref()))?;
        Ok(true)
    })
}

/// Encode `text` with the process-wide tokenizer.
///
/// Returns null (with `*out_len == 0`) if no tokenizer is installed or
/// encoding fails. Empty input yields a non-null buffer of length 0, which
/// must still be released.
///
/// # Safety
///
/// `text` must be null or NUL-terminated; `out_len` must be null or valid
/// for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn encode_to_ids(text: *const c_char, out_len: *mut i32) -> *mut i32 {
    guard("encode_to_ids", ptr::null_mut(), || {
        let out_len = unsafe { reset_len(out_len) }?;
        let text = unsafe { lossy_str(text, "text") }?;
        let tokenizer = registry::current()?;
        encode_into(&tokenizer, &text, out_len)
    })
}

/// Release a buffer returned by one of the encode functions. Null pointers and
/// negative lengths are ignored.
///
/// # Safety
///
/// `ptr` must come from an encode function of this library, `len` must be the
/// length reported for it, and each buffer may be released only once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_ids(ptr: *mut i32, len: i32) {
    if ptr.is_null() || len < 0 {
        return;
    }
    let slice = ptr::slice_from_raw_parts_mut(ptr, len as usize);
    drop(unsafe { Box::from_raw(slice) });
    OUTSTANDING_BUFFERS.fetch_sub(1, Ordering::SeqCst);
}

/// Load a standalone tokenizer instance. Returns null on failure; release a
/// non-null handle with [`tokenizer_destroy`].
///
/// # Safety
///
/// `json_path` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tokenizer_create(json_path: *const c_char) -> *mut TokenizerHandle {
    guard("tokenizer_create", ptr::null_mut(), || {
        let path = unsafe { lossy_str(json_path, "json_path") }?;
        let tokenizer = RegexTokenizer::from_file(Path::new(path.as_ref()))?;
        Ok(Box::into_raw(Box::new(TokenizerHandle { tokenizer })))
    })
}

/// # Safety
///
/// `handle` must be null or come from [`tokenizer_create`], and may be
/// destroyed only once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tokenizer_destroy(handle: *mut TokenizerHandle) {
    if handle.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(handle) });
}

/// # Safety
///
/// `handle` must be null or a live handle; `text` must be null or
/// NUL-terminated; `out_len` must be null or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tokenizer_encode(
    handle: *const TokenizerHandle,
    text: *const c_char,
    out_len: *mut i32,
) -> *mut i32 {
    guard("tokenizer_encode", ptr::null_mut(), || {
        let out_len = unsafe { reset_len(out_len) }?;
        let handle = unsafe { handle.as_ref() }.ok_or(Error::NullPointer("handle"))?;
        let text = unsafe { lossy_str(text, "text") }?;
        encode_into(&handle.tokenizer, &text, out_len)
    })
}

/// Like [`tokenizer_encode`] but takes `len` bytes of UTF-8, which may contain
/// NUL bytes. Invalid sequences are replaced with U+FFFD.
///
/// # Safety
///
/// `handle` must be null or a live handle; `bytes` must be valid for `len`
/// reads (it may be null when `len` is 0); `out_len` must be null or valid for
/// writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tokenizer_encode_bytes(
    handle: *const TokenizerHandle,
    bytes: *const u8,
    len: i32,
    out_len: *mut i32,
) -> *mut i32 {
    guard("tokenizer_encode_bytes", ptr::null_mut(), || {
        let out_len = unsafe { reset_len(out_len) }?;
        let handle = unsafe { handle.as_ref() }.ok_or(Error::NullPointer("handle"))?;
        let bytes = unsafe { raw_slice(bytes, len, "bytes") }?;
        encode_into(&handle.tokenizer, &String::from_utf8_lossy(bytes), out_len)
    })
}

/// Decode ids back into a NUL-terminated string. Returns null on an unknown
/// id, or when the decoded text contains a NUL byte (use
/// [`tokenizer_decode_bytes`] for such vocabularies). Release the result with
/// [`free_string`].
///
/// # Safety
///
/// `handle` must be null or a live handle; `ids` must be valid for `len`
/// reads (it may be null when `len` is 0).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tokenizer_decode(
    handle: *const TokenizerHandle,
    ids: *const i32,
    len: i32,
) -> *mut c_char {
    guard("tokenizer_decode", ptr::null_mut(), || {
        let handle = unsafe { handle.as_ref() }.ok_or(Error::NullPointer("handle"))?;
        let ids = unsafe { raw_slice(ids, len, "ids") }?;
        let text = handle.tokenizer.decode(ids)?;
        let text = CString::new(text).map_err(|e| Error::InteriorNul(e.nul_position()))?;
        Ok(text.into_raw())
    })
}

/// Decode ids into `*out_len` bytes of UTF-8, NUL bytes included. Returns null
/// (with `*out_len == 0`) on an unknown id; an empty id list yields a non-null
/// buffer of length 0. Release the result with [`free_bytes`].
///
/// # Safety
///
/// `handle` must be null or a live handle; `ids` must be valid for `len`
/// reads (it may be null when `len` is 0); `out_len` must be null or valid for
/// writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tokenizer_decode_bytes(
    handle: *const TokenizerHandle,
    ids: *const i32,
    len: i32,
    out_len: *mut i32,
) -> *mut u8 {
    guard("tokenizer_decode_bytes", ptr::null_mut(), || {
        let out_len = unsafe { reset_len(out_len) }?;
        let handle = unsafe { handle.as_ref() }.ok_or(Error::NullPointer("handle"))?;
        let ids = unsafe { raw_slice(ids, len, "ids") }?;
        let bytes = handle.tokenizer.decode(ids)?.into_bytes();
        let len = i32::try_from(bytes.len()).map_err(|_| Error::LengthOverflow(bytes.len()))?;
        let ptr = Box::into_raw(bytes.into_boxed_slice()).cast::<u8>();
        *out_len = len;
        Ok(ptr)
    })
}

/// Vocabulary size including the unknown id, or `-1` for a null handle.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tokenizer_vocab_size(handle: *const TokenizerHandle) -> i32 {
    match unsafe { handle.as_ref() } {
        Some(handle) => i32::try_from(handle.tokenizer.vocab_size()).unwrap_or(i32::MAX),
        None => -1,
    }
}

/// # Safety
///
/// `ptr` must be null or come from [`tokenizer_decode`], and may be released
/// only once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr) });
}

/// Release a buffer returned by [`tokenizer_decode_bytes`]. Null pointers and
/// negative lengths are ignored.
///
/// # Safety
///
/// `ptr` must come from [`tokenizer_decode_bytes`], `len` must be the length
/// reported for it, and each buffer may be released only once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free_bytes(ptr: *mut u8, len: i32) {
    if ptr.is_null() || len < 0 {
        return;
    }
    let slice = ptr::slice_from_raw_parts_mut(ptr, len as usize);
    drop(unsafe { Box::from_raw(slice) });
}

#[unsafe(no_mangle)]
pub extern "C" fn tokenizer_outstanding_buffers() -> i64 {
    outstanding_buffers()
}

/// # Safety
///
/// `ptr` must be valid for `len` reads unless `len` is 0.
unsafe fn raw_slice<'a, T>(ptr: *const T, len: i32, what: &'static str) -> Result<&'a [T]> {
    let len = usize::try_from(len).map_err(|_| Error::NegativeLength { what, len })?;
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(Error::NullPointer(what));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}
