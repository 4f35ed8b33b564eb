use crate::error::Result;

/// Token ids cross the boundary as 32-bit signed integers.
pub type Token = i32;

pub trait Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<Token>>;
    fn decode(&self, ids: &[Token]) -> Result<String>;
}
