//! Process-wide tokenizer slot used by the three-call C API.
//!
//! The slot only ever holds a fully built tokenizer: a replacement is loaded
//! outside the lock and swapped in under the write lock, and readers clone the
//! `Arc` so in-flight encodes keep the instance they started with.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::regex::RegexTokenizer;

lazy_static! {
    static ref ACTIVE: RwLock<Option<Arc<RegexTokenizer>>> = RwLock::new(None);
}

/// Load `path` and install it as the active tokenizer. On error the previous
/// tokenizer (if any) stays installed.
pub fn install_from_file(path: &Path) -> Result<()> {
    let tokenizer = RegexTokenizer::from_file(path)?;
    install(tokenizer);
    info!("installed tokenizer from {}", path.display());
    Ok(())
}

/// Replace the active tokenizer, returning the previous one.
pub fn install(tokenizer: RegexTokenizer) -> Option<Arc<RegexTokenizer>> {
    let mut slot = ACTIVE.write().unwrap_or_else(PoisonError::into_inner);
    let previous = slot.replace(Arc::new(tokenizer));
    if previous.is_some() {
        debug!("replaced previously installed tokenizer");
    }
    previous
}

pub fn current() -> Result<Arc<RegexTokenizer>> {
    ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(Error::NotInitialized)
}

pub fn is_initialized() -> bool {
    ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}
