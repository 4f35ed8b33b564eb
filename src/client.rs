//! Safe caller-side wrappers over the exported C functions.
//!
//! Results and instances own what the engine handed out and give it back on
//! drop, so a buffer is released exactly once on every exit path.

use std::ffi::CString;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::ptr::NonNull;
use std::slice;

use crate::base::Token;
use crate::error::{Error, Result};
use crate::ffi::{self, TokenizerHandle};

/// Id buffer allocated by the engine. Released with `free_ids` on drop.
pub struct EncodedIds {
    ptr: NonNull<i32>,
    len: i32,
}

// The buffer is exclusively owned and never written after creation.
unsafe impl Send for EncodedIds {}
unsafe impl Sync for EncodedIds {}

impl EncodedIds {
    /// # Safety
    ///
    /// `ptr` and `len` must be a pair just returned by one of the engine's
    /// encode functions and not yet released.
    unsafe fn from_raw(ptr: *mut i32, len: i32) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| EncodedIds { ptr, len })
    }

    pub fn as_slice(&self) -> &[Token] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len as usize) }
    }
}

impl Deref for EncodedIds {
    type Target = [Token];

    fn deref(&self) -> &[Token] {
        self.as_slice()
    }
}

impl Drop for EncodedIds {
    fn drop(&mut self) {
        unsafe { ffi::free_ids(self.ptr.as_ptr(), self.len) };
    }
}

impl fmt::Debug for EncodedIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl PartialEq<[Token]> for EncodedIds {
    fn eq(&self, other: &[Token]) -> bool {
        self.as_slice() == other
    }
}

impl<const N: usize> PartialEq<[Token; N]> for EncodedIds {
    fn eq(&self, other: &[Token; N]) -> bool {
        self.as_slice() == other
    }
}

fn path_to_c(path: &Path) -> Result<CString> {
    CString::new(path.to_string_lossy().into_owned()).map_err(|e| Error::InteriorNul(e.nul_position()))
}

fn text_to_c(text: &str) -> Result<CString> {
    CString::new(text).map_err(|e| Error::InteriorNul(e.nul_position()))
}

/// Install the configuration at `path` as the process-wide tokenizer.
pub fn init(path: impl AsRef<Path>) -> Result<()> {
    let path = path_to_c(path.as_ref())?;
    if unsafe { ffi::init_tokenizer(path.as_ptr()) } {
        Ok(())
    } else {
        Err(Error::Engine("init_tokenizer"))
    }
}

/// Encode with the process-wide tokenizer. `text` must not contain NUL bytes;
/// use [`Instance::encode`] for arbitrary text.
pub fn encode(text: &str) -> Result<EncodedIds> {
    let text = text_to_c(text)?;
    let mut len = 0;
    let ptr = unsafe { ffi::encode_to_ids(text.as_ptr(), &mut len) };
    unsafe { EncodedIds::from_raw(ptr, len) }.ok_or(Error::Engine("encode_to_ids"))
}

/// Tokenizer instance created through `tokenizer_create`, destroyed on drop.
pub struct Instance {
    handle: NonNull<TokenizerHandle>,
}

// The engine never mutates an instance after creation.
unsafe impl Send for Instance {}
unsafe impl Sync for Instance {}

impl Instance {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path_to_c(path.as_ref())?;
        let handle = unsafe { ffi::tokenizer_create(path.as_ptr()) };
        NonNull::new(handle)
            .map(|handle| Instance { handle })
            .ok_or(Error::Engine("tokenizer_create"))
    }

    /// Encode arbitrary text, interior NUL bytes included.
    pub fn encode(&self, text: &str) -> Result<EncodedIds> {
        let len = i32::try_from(text.len()).map_err(|_| Error::LengthOverflow(text.len()))?;
        let mut out_len = 0;
        let ptr = unsafe {
            ffi::tokenizer_encode_bytes(self.handle.as_ptr(), text.as_ptr(), len, &mut out_len)
        };
        unsafe { EncodedIds::from_raw(ptr, out_len) }.ok_or(Error::Engine("tokenizer_encode_bytes"))
    }

    /// Encode through the NUL-terminated entry point.
    pub fn encode_c(&self, text: &str) -> Result<EncodedIds> {
        let text = text_to_c(text)?;
        let mut out_len = 0;
        let ptr =
            unsafe { ffi::tokenizer_encode(self.handle.as_ptr(), text.as_ptr(), &mut out_len) };
        unsafe { EncodedIds::from_raw(ptr, out_len) }.ok_or(Error::Engine("tokenizer_encode"))
    }

    /// Decode through the length-delimited entry point, so tokens holding
    /// NUL bytes survive.
    pub fn decode(&self, ids: &[Token]) -> Result<String> {
        let len = i32::try_from(ids.len()).map_err(|_| Error::LengthOverflow(ids.len()))?;
        let mut out_len = 0;
        let raw = unsafe {
            ffi::tokenizer_decode_bytes(self.handle.as_ptr(), ids.as_ptr(), len, &mut out_len)
        };
        if raw.is_null() {
            return Err(Error::Engine("tokenizer_decode_bytes"));
        }
        let bytes = unsafe { slice::from_raw_parts(raw, out_len as usize) };
        let text = String::from_utf8_lossy(bytes).into_owned();
        unsafe { ffi::free_bytes(raw, out_len) };
        Ok(text)
    }

    /// `None` when the engine reports failure.
    pub fn vocab_size(&self) -> Option<usize> {
        let size = unsafe { ffi::tokenizer_vocab_size(self.handle.as_ptr()) };
        usize::try_from(size).ok()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe { ffi::tokenizer_destroy(self.handle.as_ptr()) };
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(
            br#"{"ranks": {"V2luZG93cw==": 1, "IEo=": 7, "TkE=": 23, "IFRlc3Q=": 42}, "unk_id": 0}"#,
        )
        .unwrap();
        file
    }

    #[test]
    fn instance_encodes_and_decodes() {
        let file = fixture();
        let tok = Instance::open(file.path()).unwrap();
        let ids = tok.encode("Windows JNA Test").unwrap();
        assert_eq!(ids, [1, 7, 23, 42]);
        assert_eq!(tok.decode(&ids).unwrap(), "Windows JNA Test");
        assert_eq!(tok.vocab_size(), Some(5));
    }

    #[test]
    fn decode_keeps_nul_tokens() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"ranks": {"AA==": 1, "YQ==": 2}}"#).unwrap();
        let tok = Instance::open(file.path()).unwrap();
        let ids = tok.encode("a\0a").unwrap();
        assert_eq!(ids, [2, 1, 2]);
        assert_eq!(tok.decode(&ids).unwrap(), "a\0a");
        assert!(matches!(
            tok.decode(&[9]),
            Err(Error::Engine("tokenizer_decode_bytes"))
        ));
    }

    #[test]
    fn both_entry_points_agree() {
        let file = fixture();
        let tok = Instance::open(file.path()).unwrap();
        for text in ["Windows JNA Test", "", "JNA 日本", "Test Test"] {
            assert_eq!(
                tok.encode(text).unwrap().as_slice(),
                tok.encode_c(text).unwrap().as_slice()
            );
        }
    }

    #[test]
    fn results_outlive_the_instance() {
        let file = fixture();
        let tok = Instance::open(file.path()).unwrap();
        let ids = tok.encode("Windows").unwrap();
        drop(tok);
        assert_eq!(ids, [1]);
    }

    #[test]
    fn interior_nul_is_rejected_by_c_entry_point() {
        let file = fixture();
        let tok = Instance::open(file.path()).unwrap();
        assert!(matches!(tok.encode_c("a\0b"), Err(Error::InteriorNul(1))));
        assert!(tok.encode("a\0b").is_ok());
    }

    #[test]
    fn open_missing_file_fails() {
        assert!(matches!(
            Instance::open("/nonexistent/tokenizer.json"),
            Err(Error::Engine("tokenizer_create"))
        ));
    }
}
