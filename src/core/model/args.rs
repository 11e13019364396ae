use serde::{Deserialize, Serialize};
use std::path::Path;

use candle_transformers::models::llama::{Config, LlamaConfig};

use crate::error::{Error, Result};

/// Hyperparameters as written by Meta in `params.json`.
#[derive(Debug, Clone, Deserialize)]
struct ParamsFile {
    dim: usize,
    n_layers: usize,
    n_heads: usize,
    #[serde(default)]
    n_kv_heads: Option<usize>,
    #[serde(default = "default_multiple_of")]
    multiple_of: usize,
    #[serde(default)]
    ffn_dim_multiplier: Option<f64>,
    #[serde(default = "default_norm_eps")]
    norm_eps: f64,
    #[serde(default)]
    rope_theta: Option<f64>,
    // Usually -1; the tokenizer supplies the real value.
    #[serde(default)]
    #[allow(dead_code)]
    vocab_size: Option<i64>,
}

fn default_multiple_of() -> usize {
    256
}

fn default_norm_eps() -> f64 {
    1e-5
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelArgs {
    pub dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_kv_heads: Option<usize>,
    pub vocab_size: usize,
    pub multiple_of: usize,
    pub ffn_dim_multiplier: Option<f64>,
    pub norm_eps: f64,
    pub rope_theta: f64,
    pub max_seq_len: usize,
    pub max_batch_size: usize,
}

impl Default for ModelArgs {
    fn default() -> Self {
        Self {
            dim: 4096,
            n_layers: 32,
            n_heads: 32,
            n_kv_heads: None,
            vocab_size: 0,
            multiple_of: 256,
            ffn_dim_multiplier: None,
            norm_eps: 1e-5,
            rope_theta: 10000.0,
            max_seq_len: 512,
            max_batch_size: 32,
        }
    }
}

impl ModelArgs {
    pub fn builder() -> ModelArgsBuilder {
        ModelArgsBuilder::new()
    }

    /// Parses `params.json`. The vocabulary size stays 0 until
    /// [`ModelArgs::with_vocab_size`] is called with the tokenizer's count.
    pub fn from_params_file(
        path: impl AsRef<Path>,
        max_seq_len: usize,
        max_batch_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_params_json(&raw, max_seq_len, max_batch_size)
            .map_err(|reason| Error::malformed_params(path, reason))
    }

    pub fn from_params_json(
        json: &str,
        max_seq_len: usize,
        max_batch_size: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        let params: ParamsFile = serde_json::from_str(json)?;

        Ok(Self {
            dim: params.dim,
            n_layers: params.n_layers,
            n_heads: params.n_heads,
            n_kv_heads: params.n_kv_heads,
            vocab_size: 0,
            multiple_of: params.multiple_of,
            ffn_dim_multiplier: params.ffn_dim_multiplier,
            norm_eps: params.norm_eps,
            rope_theta: params.rope_theta.unwrap_or(10000.0),
            max_seq_len,
            max_batch_size,
        })
    }

    pub fn with_vocab_size(mut self, n_words: usize) -> Self {
        self.vocab_size = n_words;
        self
    }

    pub fn kv_heads(&self) -> usize {
        self.n_kv_heads.unwrap_or(self.n_heads)
    }

    pub fn head_dim(&self) -> usize {
        self.dim / self.n_heads
    }

    /// Width of the SwiGLU feed-forward layer, rounded up to `multiple_of`.
    pub fn hidden_dim(&self) -> usize {
        let mut hidden = 2 * (4 * self.dim) / 3;
        if let Some(multiplier) = self.ffn_dim_multiplier {
            hidden = (multiplier * hidden as f64) as usize;
        }
        let m = self.multiple_of.max(1);
        m * hidden.div_ceil(m)
    }

    pub fn to_candle_config(&self, use_flash_attn: bool) -> Result<Config> {
        let value = serde_json::json!({
            "hidden_size": self.dim,
            "intermediate_size": self.hidden_dim(),
            "vocab_size": self.vocab_size,
            "num_hidden_layers": self.n_layers,
            "num_attention_heads": self.n_heads,
            "num_key_value_heads": self.kv_heads(),
            "rms_norm_eps": self.norm_eps,
            "rope_theta": self.rope_theta,
            "max_position_embeddings": self.max_seq_len,
            "tie_word_embeddings": false,
        });
        let config: LlamaConfig = serde_json::from_value(value)
            .map_err(|e| Error::InvalidRequest(format!("cannot build model config: {}", e)))?;
        Ok(config.into_config(use_flash_attn))
    }
}

pub struct ModelArgsBuilder {
    args: ModelArgs,
}

impl ModelArgsBuilder {
    pub fn new() -> Self {
        Self {
            args: ModelArgs::default(),
        }
    }

    pub fn dim(mut self, dim: usize) -> Self {
        self.args.dim = dim;
        self
    }

    pub fn n_layers(mut self, n: usize) -> Self {
        self.args.n_layers = n;
        self
    }

    pub fn n_heads(mut self, n: usize) -> Self {
        self.args.n_heads = n;
        self
    }

    pub fn n_kv_heads(mut self, n: usize) -> Self {
        self.args.n_kv_heads = Some(n);
        self
    }

    pub fn multiple_of(mut self, m: usize) -> Self {
        self.args.multiple_of = m;
        self
    }

    pub fn ffn_dim_multiplier(mut self, multiplier: f64) -> Self {
        self.args.ffn_dim_multiplier = Some(multiplier);
        self
    }

    pub fn max_seq_len(mut self, len: usize) -> Self {
        self.args.max_seq_len = len;
        self
    }

    pub fn max_batch_size(mut self, n: usize) -> Self {
        self.args.max_batch_size = n;
        self
    }

    pub fn vocab_size(mut self, n: usize) -> Self {
        self.args.vocab_size = n;
        self
    }

    pub fn build(self) -> ModelArgs {
        self.args
    }
}

impl Default for ModelArgsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LLAMA_7B: &str =
        r#"{"dim": 4096, "multiple_of": 256, "n_heads": 32, "n_layers": 32, "norm_eps": 1e-06, "vocab_size": -1}"#;

    #[test]
    fn test_parse_llama_params() {
        let args = ModelArgs::from_params_json(LLAMA_7B, 512, 32).unwrap();
        assert_eq!(args.dim, 4096);
        assert_eq!(args.n_layers, 32);
        assert_eq!(args.kv_heads(), 32);
        assert_eq!(args.head_dim(), 128);
        assert_eq!(args.max_seq_len, 512);
        assert_eq!(args.max_batch_size, 32);
        assert_eq!(args.vocab_size, 0);
        assert_eq!(args.hidden_dim(), 11008);
    }

    #[test]
    fn test_vocab_size_comes_from_tokenizer() {
        let args = ModelArgs::from_params_json(LLAMA_7B, 512, 32)
            .unwrap()
            .with_vocab_size(32000);
        assert_eq!(args.vocab_size, 32000);
    }

    #[test]
    fn test_hidden_dim_with_multiplier() {
        // LLaMA-2 70B
        let args = ModelArgs::builder()
            .dim(8192)
            .n_heads(64)
            .n_kv_heads(8)
            .multiple_of(4096)
            .ffn_dim_multiplier(1.3)
            .build();
        assert_eq!(args.hidden_dim(), 28672);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let err = ModelArgs::from_params_json(r#"{"dim": 4096, "n_heads": 32}"#, 512, 32).unwrap_err();
        assert!(err.to_string().contains("n_layers"));
    }

    #[test]
    fn test_candle_config() {
        let args = ModelArgs::builder()
            .dim(64)
            .n_layers(2)
            .n_heads(4)
            .multiple_of(32)
            .vocab_size(100)
            .build();
        let config = args.to_candle_config(false).unwrap();
        assert_eq!(config.hidden_size, 64);
        assert_eq!(config.intermediate_size, args.hidden_dim());
        assert_eq!(config.vocab_size, 100);
        assert_eq!(config.num_key_value_heads, 4);
        assert_eq!(config.max_position_embeddings, 512);
    }
}
