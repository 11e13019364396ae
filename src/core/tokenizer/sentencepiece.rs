use super::traits::{EncodeOptions, Tokenizer};
use super::{parse_byte_piece, TokenId, TokenType, Vocabulary};
use std::collections::HashMap;

const SPACE: char = '▁';

#[derive(Debug)]
pub struct SentencePieceTokenizer {
    vocab: Vocabulary,
    encoder: HashMap<String, TokenId>,
    byte_ids: [Option<TokenId>; 256],
}

impl SentencePieceTokenizer {
    pub fn new(vocab: Vocabulary) -> Self {
        let mut encoder = HashMap::with_capacity(vocab.size());
        let mut byte_ids = [None; 256];

        for (i, token) in vocab.tokens.iter().enumerate() {
            let id = i as TokenId;
            match vocab.types.get(i) {
                Some(TokenType::Byte) => {
                    if let Some(b) = parse_byte_piece(token) {
                        byte_ids[b as usize] = Some(id);
                    }
                }
                Some(TokenType::Control) | Some(TokenType::Unknown) => {}
                _ => {
                    encoder.entry(token.clone()).or_insert(id);
                }
            }
        }

        Self {
            vocab,
            encoder,
            byte_ids,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    fn score(&self, id: TokenId) -> f32 {
        self.vocab.scores.get(id as usize).copied().unwrap_or(0.0)
    }

    /// Maps each character to a piece, falling back to its UTF-8 bytes.
    fn initial_pieces(&self, normalized: &str) -> Vec<TokenId> {
        let mut ids = Vec::with_capacity(normalized.len());
        let mut buf = [0u8; 4];
        for c in normalized.chars() {
            let s = c.encode_utf8(&mut buf);
            if let Some(&id) = self.encoder.get(&*s) {
                ids.push(id);
                continue;
            }
            for &b in s.as_bytes() {
                match self.byte_ids[b as usize].or(self.vocab.unk_token) {
                    Some(id) => ids.push(id),
                    None => tracing::warn!(byte = b, "no piece or byte fallback for input byte"),
                }
            }
        }
        ids
    }

    /// Repeatedly merges the adjacent pair whose concatenation has the best score.
    fn merge(&self, mut ids: Vec<TokenId>) -> Vec<TokenId> {
        loop {
            let mut best: Option<(f32, usize, TokenId)> = None;
            for i in 0..ids.len().saturating_sub(1) {
                let (Some(left), Some(right)) = (self.vocab.token(ids[i]), self.vocab.token(ids[i + 1])) else {
                    continue;
                };
                let merged = format!("{}{}", left, right);
                if let Some(&id) = self.encoder.get(&merged) {
                    let score = self.score(id);
                    if best.map_or(true, |(s, _, _)| score > s) {
                        best = Some((score, i, id));
                    }
                }
            }

            match best {
                Some((_, i, id)) => {
                    ids[i] = id;
                    ids.remove(i + 1);
                }
                None => return ids,
            }
        }
    }
}

impl Tokenizer for SentencePieceTokenizer {
    fn encode_with_options(&self, text: &str, options: &EncodeOptions) -> Vec<TokenId> {
        let mut tokens = Vec::new();

        if options.add_bos {
            tokens.push(self.vocab.bos_token);
        }

        if !text.is_empty() {
            let mut normalized = String::with_capacity(text.len() + 3);
            normalized.push(SPACE);
            normalized.extend(text.chars().map(|c| if c == ' ' { SPACE } else { c }));
            tokens.extend(self.merge(self.initial_pieces(&normalized)));
        }

        if options.add_eos {
            tokens.push(self.vocab.eos_token);
        }

        tokens
    }

    fn decode(&self, tokens: &[TokenId]) -> String {
        let mut bytes = Vec::new();

        for &id in tokens {
            let Some(piece) = self.vocab.token(id) else {
                continue;
            };
            match self.vocab.token_type(id) {
                TokenType::Control | TokenType::Unused => {}
                TokenType::Byte => match parse_byte_piece(piece) {
                    Some(b) => bytes.push(b),
                    None => bytes.extend_from_slice(piece.as_bytes()),
                },
                TokenType::Unknown => bytes.extend_from_slice(" \u{2047} ".as_bytes()),
                _ => bytes.extend_from_slice(piece.replace(SPACE, " ").as_bytes()),
            }
        }

        let text = String::from_utf8_lossy(&bytes);
        text.strip_prefix(' ').unwrap_or(&text).to_string()
    }

    fn n_words(&self) -> usize {
        self.vocab.size()
    }

    fn bos_id(&self) -> TokenId {
        self.vocab.bos_token
    }

    fn eos_id(&self) -> TokenId {
        self.vocab.eos_token
    }
}
