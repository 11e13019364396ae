pub mod chat_format;
pub mod dialog;
pub mod llama;
pub mod stream;

pub use dialog::{ChatPrediction, Dialog, History, Message, Role};
pub use llama::{Llama2Generator, LlamaGenerator};
pub use stream::{printable_delta, CancelHandle, GenerationStream};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_gen_len: usize,
    pub temperature: f64,
    pub top_p: f64,
}

impl GenerationParams {
    pub const fn new(max_gen_len: usize, temperature: f64, top_p: f64) -> Self {
        Self {
            max_gen_len,
            temperature,
            top_p,
        }
    }
}

/// Text completion over a loaded model.
pub trait Generator: Send + Sync {
    /// Starts generating a continuation of `prompt`. Nothing runs until the
    /// returned stream is polled.
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<GenerationStream<'_>>;

    fn max_seq_len(&self) -> usize;
}

/// Dialog completion over a chat-tuned model.
pub trait ChatGenerator: Send + Sync {
    /// Answers each dialog; one prediction per input, in order.
    fn chat_completion(&self, dialogs: &[Dialog], params: &GenerationParams) -> Result<Vec<ChatPrediction>>;

    /// Length in tokens of `dialog` once laid out as a chat prompt.
    fn dialog_tokens(&self, dialog: &Dialog) -> Result<usize>;

    fn max_seq_len(&self) -> usize;
}
