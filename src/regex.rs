use std::path::Path;

use fancy_regex::Regex;
use lazy_static::lazy_static;
use log::debug;

use crate::base::{Token, Tokenizer};
use crate::bpe::bpe;
use crate::error::{Error, Result};
use crate::vocab::{self, LoadedConfig, Vocabulary};

pub const GPT4_SPLIT_PATTERN: &str = r"'(?i:[sdmt]|ll|ve|re)|[^\r\n\p{L}\p{N}]?+\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]++[\r\n]*|\s*[\r\n]|\s+(?!\S)|\s+";

lazy_static! {
    static ref GPT4_SPLIT_COMPILED_PATTERN: Option<Regex> = Regex::new(GPT4_SPLIT_PATTERN).ok();
}

/// Splits text with a regex, then encodes each chunk against a rank table.
#[derive(Debug)]
pub struct RegexTokenizer {
    pattern: Regex,
    vocab: Vocabulary,
}

impl RegexTokenizer {
    /// Build a tokenizer from `vocab`, splitting with `pattern` or the GPT-4
    /// split pattern when `None`.
    pub fn new(vocab: Vocabulary, pattern: Option<&str>) -> Result<Self> {
        let pattern = match pattern {
            Some(p) => Regex::new(p)?,
            None => match GPT4_SPLIT_COMPILED_PATTERN.as_ref() {
                Some(re) => re.clone(),
                None => Regex::new(GPT4_SPLIT_PATTERN)?,
            },
        };
        Ok(RegexTokenizer { pattern, vocab })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let LoadedConfig { pattern, vocab } = vocab::load(path.as_ref())?;
        Self::new(vocab, pattern.as_deref())
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn encode_chunk(&self, chunk: &[u8], ids: &mut Vec<Token>) -> Result<()> {
        // whole-chunk hit skips merging entirely
        if let Some(id) = self.vocab.rank(chunk) {
            ids.push(id);
            return Ok(());
        }
        for part in bpe(self.vocab.ranks(), chunk) {
            match self.vocab.rank(&part).or(self.vocab.unk_id()) {
                Some(id) => ids.push(id),
                None => return Err(Error::UnknownPiece(part)),
            }
        }
        Ok(())
    }
}

impl Tokenizer for RegexTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<Token>> {
        let mut ids = Vec::new();
        for m in self.pattern.find_iter(text) {
            self.encode_chunk(m?.as_str().as_bytes(), &mut ids)?;
        }
        debug!("encoded {} bytes into {} ids", text.len(), ids.len());
        Ok(ids)
    }

    fn decode(&self, ids: &[Token]) -> Result<String> {
        let mut text_bytes = Vec::new();
        for &id in ids {
            match self.vocab.bytes(id) {
                Some(bytes) => text_bytes.extend_from_slice(bytes),
                None if Some(id) == self.vocab.unk_id() => {
                    text_bytes.extend_from_slice("\u{FFFD}".as_bytes())
                }
                None => return Err(Error::UnknownId(id)),
            }
        }
        Ok(String::from_utf8_lossy(&text_bytes).into_owned())
    }
}
