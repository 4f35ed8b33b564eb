use std::fmt;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use indexmap::IndexMap;
use log::debug;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::base::Token;
use crate::error::{Error, Result};

/// On-disk tokenizer configuration. Token bytes are base64 encoded so that
/// byte-level pieces which are not valid UTF-8 can be written down.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub pattern: Option<String>,
    /// Resolved against the directory holding the configuration file.
    #[serde(default)]
    pub ranks_file: Option<PathBuf>,
    /// Entries in document order. Repeated keys are kept so that loading can
    /// reject them.
    #[serde(default, deserialize_with = "ranks_entries")]
    pub ranks: Vec<(String, i64)>,
    #[serde(default)]
    pub unk_id: Option<i64>,
}

impl TokenizerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn ranks_entries<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, i64)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, i64)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of base64 token bytes to ids")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor)
}

/// Bijection between token bytes and ids. An entry's rank is its id.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    ranks: IndexMap<Vec<u8>, Token>,
    decoder: IndexMap<Token, Vec<u8>>,
    unk_id: Option<Token>,
}

impl Vocabulary {
    pub fn new(ranks: IndexMap<Vec<u8>, Token>, unk_id: Option<Token>) -> Result<Self> {
        if ranks.is_empty() {
            return Err(Error::Config("vocabulary has no entries".to_string()));
        }
        let mut decoder = IndexMap::with_capacity(ranks.len());
        for (bytes, &id) in &ranks {
            if id < 0 {
                return Err(Error::IdOutOfRange(id.into()));
            }
            if decoder.insert(id, bytes.clone()).is_some() {
                return Err(Error::DuplicateId(id));
            }
        }
        if let Some(unk) = unk_id {
            if unk < 0 {
                return Err(Error::IdOutOfRange(unk.into()));
            }
            if decoder.contains_key(&unk) {
                return Err(Error::Config(format!(
                    "unk_id {unk} is already used by a vocabulary entry"
                )));
            }
        }
        Ok(Vocabulary {
            ranks,
            decoder,
            unk_id,
        })
    }

    pub fn rank(&self, bytes: &[u8]) -> Option<Token> {
        self.ranks.get(bytes).copied()
    }

    pub fn ranks(&self) -> &IndexMap<Vec<u8>, Token> {
        &self.ranks
    }

    pub fn bytes(&self, id: Token) -> Option<&[u8]> {
        self.decoder.get(&id).map(Vec::as_slice)
    }

    pub fn unk_id(&self) -> Option<Token> {
        self.unk_id
    }

    /// Entries plus the unknown id, if one is configured.
    pub fn len(&self) -> usize {
        self.ranks.len() + usize::from(self.unk_id.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A loaded configuration: the split pattern (if overridden) and the vocabulary.
#[derive(Debug)]
pub struct LoadedConfig {
    pub pattern: Option<String>,
    pub vocab: Vocabulary,
}

/// Load a tokenizer configuration. `*.tiktoken` files are read as bare rank
/// tables; anything else is parsed as a JSON [`TokenizerConfig`].
pub fn load(path: &Path) -> Result<LoadedConfig> {
    if path.extension().is_some_and(|ext| ext == "tiktoken") {
        let ranks = load_tiktoken(path)?;
        debug!("loaded {} ranks from {}", ranks.len(), path.display());
        return Ok(LoadedConfig {
            pattern: None,
            vocab: Vocabulary::new(ranks, None)?,
        });
    }

    let config = TokenizerConfig::from_json(&read_to_string(path)?)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let loaded = from_config(config, base_dir)?;
    debug!(
        "loaded {} vocabulary entries from {}",
        loaded.vocab.len(),
        path.display()
    );
    Ok(loaded)
}

pub fn from_config(config: TokenizerConfig, base_dir: &Path) -> Result<LoadedConfig> {
    let mut ranks = match &config.ranks_file {
        Some(file) => load_tiktoken(&base_dir.join(file))?,
        None => IndexMap::new(),
    };

    for (encoded, rank) in config.ranks {
        let bytes = general_purpose::STANDARD
            .decode(&encoded)
            // inline entries have no line number
            .map_err(|source| Error::Base64 { line: 0, source })?;
        let rank = checked_id(rank)?;
        if ranks.insert(bytes.clone(), rank).is_some() {
            return Err(Error::DuplicateToken(bytes));
        }
    }

    let unk_id = config.unk_id.map(checked_id).transpose()?;
    Ok(LoadedConfig {
        pattern: config.pattern,
        vocab: Vocabulary::new(ranks, unk_id)?,
    })
}

pub fn load_tiktoken(path: &Path) -> Result<IndexMap<Vec<u8>, Token>> {
    parse_tiktoken(&read_to_string(path)?)
}

/// Parse `<base64 bytes> <rank>` lines. Line numbers in errors are 1-based.
pub fn parse_tiktoken(contents: &str) -> Result<IndexMap<Vec<u8>, Token>> {
    let mut encoder = IndexMap::new();
    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(raw), Some(rank), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::RanksLine {
                line: line_no,
                reason: "expected `<base64 token> <rank>`".to_string(),
            });
        };
        let token = general_purpose::STANDARD
            .decode(raw)
            .map_err(|source| Error::Base64 {
                line: line_no,
                source,
            })?;
        let rank: i64 = rank.parse().map_err(|_| Error::RanksLine {
            line: line_no,
            reason: format!("rank {rank:?} is not an integer"),
        })?;
        let rank = checked_id(rank)?;
        if encoder.insert(token.clone(), rank).is_some() {
            return Err(Error::DuplicateToken(token));
        }
    }
    Ok(encoder)
}

fn checked_id(id: i64) -> Result<Token> {
    Token::try_from(id)
        .ok()
        .filter(|id| *id >= 0)
        .ok_or(Error::IdOutOfRange(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tiktoken_lines() {
        let ranks = parse_tiktoken("IQ== 0\n\nIg== 1\nIEpOQQ== 2\n").unwrap();
        assert_eq!(ranks.len(), 3);
        assert_eq!(ranks[&b" JNA".to_vec()], 2);
        assert_eq!(ranks[&b"!".to_vec()], 0);
    }

    #[test]
    fn rejects_negative_and_oversized_ranks() {
        assert!(matches!(
            parse_tiktoken("IQ== -1"),
            Err(Error::IdOutOfRange(-1))
        ));
        assert!(matches!(
            parse_tiktoken("IQ== 4294967296"),
            Err(Error::IdOutOfRange(4294967296))
        ));
    }

    #[test]
    fn reports_line_of_bad_base64() {
        let err = parse_tiktoken("IQ== 0\n*** 1\n").unwrap_err();
        assert!(matches!(err, Error::Base64 { line: 2, .. }));
    }

    #[test]
    fn reports_malformed_line() {
        let err = parse_tiktoken("IQ==\n").unwrap_err();
        assert!(matches!(err, Error::RanksLine { line: 1, .. }));
        let err = parse_tiktoken("IQ== one\n").unwrap_err();
        assert!(matches!(err, Error::RanksLine { line: 1, .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse_tiktoken("IQ== 3\nIg== 3\n")
            .and_then(|ranks| Vocabulary::new(ranks, None))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId(3)));
    }

    #[test]
    fn unk_id_must_not_collide() {
        let ranks = parse_tiktoken("IQ== 0\n").unwrap();
        assert!(matches!(
            Vocabulary::new(ranks, Some(0)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn empty_vocabulary_is_rejected() {
        assert!(matches!(
            Vocabulary::new(IndexMap::new(), None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn config_rejects_unknown_fields() {
        assert!(matches!(
            TokenizerConfig::from_json(r#"{"ranks": {}, "merges": []}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn inline_ranks_and_unk() {
        let config = TokenizerConfig::from_json(
            r#"{"ranks": {"V2luZG93cw==": 1, "IEo=": 7}, "unk_id": 0}"#,
        )
        .unwrap();
        let loaded = from_config(config, Path::new(".")).unwrap();
        assert_eq!(loaded.vocab.rank(b"Windows"), Some(1));
        assert_eq!(loaded.vocab.bytes(7), Some(&b" J"[..]));
        assert_eq!(loaded.vocab.unk_id(), Some(0));
        assert_eq!(loaded.vocab.len(), 3);
        assert!(loaded.pattern.is_none());
    }

    #[test]
    fn ranks_file_is_resolved_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.tiktoken"), "IQ== 0\nIg== 1\n").unwrap();
        let config_path = dir.path().join("tokenizer.json");
        std::fs::write(
            &config_path,
            r#"{"ranks_file": "base.tiktoken", "ranks": {"IyE=": 2}}"#,
        )
        .unwrap();

        let loaded = load(&config_path).unwrap();
        assert_eq!(loaded.vocab.len(), 3);
        assert_eq!(loaded.vocab.rank(b"#!"), Some(2));
    }

    #[test]
    fn duplicate_token_across_file_and_inline() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.tiktoken"), "IQ== 0\n").unwrap();
        let config = TokenizerConfig {
            ranks_file: Some(PathBuf::from("base.tiktoken")),
            ranks: vec![("IQ==".to_string(), 5)],
            ..Default::default()
        };
        assert!(matches!(
            from_config(config, dir.path()),
            Err(Error::DuplicateToken(_))
        ));
    }

    #[test]
    fn repeated_inline_key_is_rejected() {
        let config = TokenizerConfig::from_json(r#"{"ranks": {"IQ==": 1, "IQ==": 2}}"#).unwrap();
        assert_eq!(config.ranks.len(), 2);
        assert!(matches!(
            from_config(config, Path::new(".")),
            Err(Error::DuplicateToken(bytes)) if bytes == b"!"
        ));
    }

    #[test]
    fn repeated_inline_key_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, r#"{"ranks": {"IQ==": 1, "IQ==": 2}}"#).unwrap();
        assert!(matches!(load(&path), Err(Error::DuplicateToken(_))));
    }

    #[test]
    fn ranks_must_be_a_map() {
        assert!(matches!(
            TokenizerConfig::from_json(r#"{"ranks": [["IQ==", 1]]}"#),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load(Path::new("does/not/exist.json")),
            Err(Error::Io(_))
        ));
    }
}
