use thiserror::Error;

use crate::base::Token;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid split pattern: {0}")]
    Pattern(#[from] Box<fancy_regex::Error>),

    #[error("Invalid base64 token on line {line}: {source}")]
    Base64 {
        line: usize,
        source: base64::DecodeError,
    },

    #[error("Malformed ranks line {line}: {reason}")]
    RanksLine { line: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token id {0} is outside 0..=i32::MAX")]
    IdOutOfRange(i64),

    #[error("Token id {0} is assigned more than once")]
    DuplicateId(Token),

    #[error("Token bytes {0:?} are listed more than once")]
    DuplicateToken(Vec<u8>),

    #[error("No vocabulary entry for piece {0:?}")]
    UnknownPiece(Vec<u8>),

    #[error("Unknown token id {0}")]
    UnknownId(Token),

    #[error("Tokenizer not initialized")]
    NotInitialized,

    #[error("Null pointer passed for {0}")]
    NullPointer(&'static str),

    #[error("Negative length {len} passed for {what}")]
    NegativeLength { what: &'static str, len: i32 },

    #[error("Length {0} does not fit in a 32-bit count")]
    LengthOverflow(usize),

    #[error("Text contains an interior NUL byte at offset {0}")]
    InteriorNul(usize),

    #[error("Tokenizer engine rejected {0}")]
    Engine(&'static str),
}

impl From<fancy_regex::Error> for Error {
    fn from(err: fancy_regex::Error) -> Self {
        Error::Pattern(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
