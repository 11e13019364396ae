use super::TokenId;

pub trait Tokenizer: Send + Sync {
    fn encode_with_options(&self, text: &str, options: &EncodeOptions) -> Vec<TokenId>;

    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.encode_with_options(text, &EncodeOptions::default())
    }

    /// Decodes ids back to text. Control tokens (BOS, EOS, ...) are skipped.
    fn decode(&self, tokens: &[TokenId]) -> String;

    /// Number of entries in the vocabulary.
    fn n_words(&self) -> usize;
    fn bos_id(&self) -> TokenId;
    fn eos_id(&self) -> TokenId;
}

#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub add_bos: bool,
    pub add_eos: bool,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bos(mut self) -> Self {
        self.add_bos = true;
        self
    }

    pub fn with_eos(mut self) -> Self {
        self.add_eos = true;
        self
    }
}
