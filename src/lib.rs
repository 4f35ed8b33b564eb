//! Native tokenizer engine exported over a C ABI, plus a safe Rust caller.
//!
//! The library is built as a `cdylib` named `rust_tokenizer_bridge` so that
//! JNA, ctypes or cgo callers can load it; see `include/rust_tokenizer_bridge.h`
//! for the exported symbols.

pub mod base;
pub mod bpe;
pub mod client;
pub mod error;
pub mod ffi;
pub mod regex;
pub mod registry;
pub mod vocab;

pub use base::{Token, Tokenizer};
pub use client::{EncodedIds, Instance};
pub use error::{Error, Result};
pub use regex::RegexTokenizer;
pub use vocab::{TokenizerConfig, Vocabulary};
