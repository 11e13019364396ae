pub mod model_proto;
pub mod sentencepiece;
pub mod traits;

pub use sentencepiece::SentencePieceTokenizer;
pub use traits::{EncodeOptions, Tokenizer};

use std::path::Path;

use crate::error::{Error, Result};

pub type TokenId = u32;

/// Loads a SentencePiece `tokenizer.model` file.
pub fn load_tokenizer(path: impl AsRef<Path>) -> Result<SentencePieceTokenizer> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::tokenizer_load(path, e))?;
    let vocab = model_proto::parse(&bytes).map_err(|e| Error::tokenizer_load(path, e))?;
    if vocab.size() == 0 {
        return Err(Error::tokenizer_load(path, "model contains no pieces"));
    }
    tracing::debug!(path = %path.display(), n_words = vocab.size(), "loaded tokenizer");
    Ok(SentencePieceTokenizer::new(vocab))
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub tokens: Vec<String>,
    pub scores: Vec<f32>,
    pub types: Vec<TokenType>,
    pub bos_token: TokenId,
    pub eos_token: TokenId,
    pub unk_token: Option<TokenId>,
    pub pad_token: Option<TokenId>,
}

impl Vocabulary {
    /// Builds a vocabulary with LLaMA's special ids (`<unk>`=0, `<s>`=1, `</s>`=2).
    pub fn new(tokens: Vec<String>) -> Self {
        let len = tokens.len();
        let types = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| match i {
                0 => TokenType::Unknown,
                1 | 2 => TokenType::Control,
                _ if is_byte_piece(t) => TokenType::Byte,
                _ => TokenType::Normal,
            })
            .collect();
        Self {
            tokens,
            scores: vec![0.0; len],
            types,
            bos_token: 1,
            eos_token: 2,
            unk_token: Some(0),
            pad_token: None,
        }
    }

    pub fn with_scores(mut self, scores: Vec<f32>) -> Self {
        self.scores = scores;
        self
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.tokens.get(id as usize).map(|s| s.as_str())
    }

    pub fn token_type(&self, id: TokenId) -> TokenType {
        self.types.get(id as usize).copied().unwrap_or(TokenType::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl TokenType {
    /// Maps SentencePiece's `ModelProto.SentencePiece.Type` enum.
    pub fn from_proto(value: u64) -> Self {
        match value {
            2 => Self::Unknown,
            3 => Self::Control,
            4 => Self::UserDefined,
            5 => Self::Unused,
            6 => Self::Byte,
            _ => Self::Normal,
        }
    }
}

/// `<0x0A>` style pieces used for byte fallback.
pub(crate) fn is_byte_piece(piece: &str) -> bool {
    parse_byte_piece(piece).is_some()
}

pub(crate) fn parse_byte_piece(piece: &str) -> Option<u8> {
    let hex = piece.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}
