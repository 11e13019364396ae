use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::Cache;

use super::chat_format::{dialog_prompt_tokens, has_special_tags, UNSAFE_ERROR};
use super::{ChatGenerator, ChatPrediction, Dialog, GenerationParams, GenerationStream, Generator, Message};
use crate::core::model::{ModelArgs, Transformer};
use crate::core::tokenizer::{EncodeOptions, TokenId, Tokenizer};
use crate::error::{Error, Result};

/// Completion generator: a transformer plus the tokenizer it was trained with.
pub struct LlamaGenerator {
    model: Transformer,
    tokenizer: Box<dyn Tokenizer>,
    seed: u64,
    calls: AtomicU64,
}

impl LlamaGenerator {
    pub fn new(model: Transformer, tokenizer: Box<dyn Tokenizer>, seed: u64) -> Self {
        Self {
            model,
            tokenizer,
            seed,
            calls: AtomicU64::new(0),
        }
    }

    pub fn args(&self) -> &ModelArgs {
        self.model.args()
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Streams the continuation of already tokenized input.
    pub fn stream_tokens(&self, mut prompt: Vec<TokenId>, params: &GenerationParams) -> Result<GenerationStream<'_>> {
        if prompt.is_empty() {
            return Err(Error::InvalidRequest("prompt must contain at least one token".into()));
        }
        let max_seq_len = self.args().max_seq_len;
        let prompt_budget = max_seq_len.saturating_sub(params.max_gen_len).max(1);
        if prompt.len() > prompt_budget {
            tracing::warn!(
                prompt_tokens = prompt.len(),
                kept = prompt_budget,
                "prompt longer than the context window, dropping its oldest tokens"
            );
            prompt.drain(..prompt.len() - prompt_budget);
        }

        let seed = self.seed.wrapping_add(self.calls.fetch_add(1, Ordering::Relaxed));
        let decoding = Decoding {
            model: &self.model,
            tokenizer: self.tokenizer.as_ref(),
            cache: self.model.new_cache()?,
            sampler: LogitsProcessor::new(seed, Some(params.temperature), Some(params.top_p)),
            prompt_len: prompt.len(),
            tokens: prompt,
            index_pos: 0,
            remaining: params.max_gen_len,
            max_seq_len,
            started: Instant::now(),
            finished: false,
        };
        Ok(GenerationStream::new(decoding))
    }
}

impl Generator for LlamaGenerator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<GenerationStream<'_>> {
        let tokens = self.tokenizer.encode_with_options(prompt, &EncodeOptions::new().with_bos());
        self.stream_tokens(tokens, params)
    }

    fn max_seq_len(&self) -> usize {
        self.args().max_seq_len
    }
}

/// Incremental sampling loop behind [`GenerationStream`].
struct Decoding<'a> {
    model: &'a Transformer,
    tokenizer: &'a dyn Tokenizer,
    cache: Cache,
    sampler: LogitsProcessor,
    tokens: Vec<TokenId>,
    prompt_len: usize,
    index_pos: usize,
    remaining: usize,
    max_seq_len: usize,
    started: Instant,
    finished: bool,
}

impl Decoding<'_> {
    fn step(&mut self) -> Result<Option<String>> {
        if self.remaining == 0 || self.tokens.len() >= self.max_seq_len {
            return Ok(None);
        }

        // The whole prompt on the first step, then one token at a time.
        let context = if self.index_pos == 0 {
            &self.tokens[..]
        } else {
            &self.tokens[self.tokens.len() - 1..]
        };
        let logits = self.model.forward(context, self.index_pos, &mut self.cache)?;
        self.index_pos += context.len();

        let next = self.sampler.sample(&logits)?;
        self.remaining -= 1;
        if next == self.tokenizer.eos_id() {
            return Ok(None);
        }

        self.tokens.push(next);
        Ok(Some(self.tokenizer.decode(&self.tokens[self.prompt_len..])))
    }
}

impl Iterator for Decoding<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(text)) => Some(Ok(text)),
            Ok(None) => {
                self.finished = true;
                let generated = self.tokens.len() - self.prompt_len;
                let elapsed = self.started.elapsed();
                tracing::debug!(
                    prompt_tokens = self.prompt_len,
                    generated,
                    tokens_per_sec = generated as f64 / elapsed.as_secs_f64().max(1e-9),
                    "generation finished"
                );
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Chat generator for LLaMA-2 chat checkpoints.
pub struct Llama2Generator {
    inner: LlamaGenerator,
}

impl Llama2Generator {
    pub fn new(inner: LlamaGenerator) -> Self {
        Self { inner }
    }

    pub fn args(&self) -> &ModelArgs {
        self.inner.args()
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.inner.tokenizer()
    }
}

impl ChatGenerator for Llama2Generator {
    fn chat_completion(&self, dialogs: &[Dialog], params: &GenerationParams) -> Result<Vec<ChatPrediction>> {
        let max_batch_size = self.args().max_batch_size;
        if dialogs.len() > max_batch_size {
            return Err(Error::InvalidRequest(format!(
                "{} dialogs exceed the batch size of {}",
                dialogs.len(),
                max_batch_size
            )));
        }

        dialogs
            .iter()
            .map(|dialog| {
                let content = if has_special_tags(dialog) {
                    UNSAFE_ERROR.to_string()
                } else {
                    let tokens = dialog_prompt_tokens(self.tokenizer(), dialog)?;
                    self.inner.stream_tokens(tokens, params)?.into_final()?
                };
                Ok(ChatPrediction {
                    generation: Message::assistant(content),
                })
            })
            .collect()
    }

    fn dialog_tokens(&self, dialog: &Dialog) -> Result<usize> {
        Ok(dialog_prompt_tokens(self.tokenizer(), dialog)?.len())
    }

    fn max_seq_len(&self) -> usize {
        self.args().max_seq_len
    }
}

impl Generator for Llama2Generator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<GenerationStream<'_>> {
        self.inner.generate(prompt, params)
    }

    fn max_seq_len(&self) -> usize {
        self.inner.max_seq_len()
    }
}
