use std::collections::HashMap;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama};

use super::ModelArgs;
use crate::core::runtime::RuntimeConfig;
use crate::error::Result;

/// A weight-initialised LLaMA network. The forward pass itself is candle's.
pub struct Transformer {
    args: ModelArgs,
    config: Config,
    device: Device,
    dtype: DType,
    weights: Llama,
}

impl Transformer {
    /// Builds the network from host-side tensors named the way candle's llama
    /// expects (`model.layers.N.self_attn.q_proj.weight`, ...). Tensors are
    /// converted to the runtime dtype and moved to its device here.
    pub fn from_state_dict(
        args: ModelArgs,
        state: HashMap<String, Tensor>,
        runtime: &RuntimeConfig,
    ) -> Result<Self> {
        let device = runtime.select_device()?;
        let dtype = runtime.dtype();
        let config = args.to_candle_config(runtime.use_flash_attn)?;

        let vb = VarBuilder::from_tensors(state, dtype, &device);
        let weights = Llama::load(vb, &config)?;

        Ok(Self {
            args,
            config,
            device,
            dtype,
            weights,
        })
    }

    /// Logits for the last position of `tokens`, as f32 of shape `(vocab,)`.
    pub fn forward(&self, tokens: &[u32], index_pos: usize, cache: &mut Cache) -> Result<Tensor> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        let logits = self.weights.forward(&input, index_pos, cache)?;
        Ok(logits.squeeze(0)?.to_dtype(DType::F32)?)
    }

    /// A fresh key/value cache sized for `max_seq_len` positions.
    pub fn new_cache(&self) -> Result<Cache> {
        Ok(Cache::new(true, self.dtype, &self.config, &self.device)?)
    }

    pub fn args(&self) -> &ModelArgs {
        &self.args
    }
}
