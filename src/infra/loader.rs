use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use super::checkpoint::{find_checkpoint, list_checkpoints, read_state_dict, to_candle_names, PARAMS_FILE};
use crate::core::generation::{Llama2Generator, LlamaGenerator};
use crate::core::model::{ModelArgs, ModelVariant, Transformer};
use crate::core::runtime::RuntimeConfig;
use crate::core::tokenizer::{load_tokenizer, SentencePieceTokenizer, Tokenizer};
use crate::error::Result;

/// A ready generator, shaped by the model variant it was loaded as.
pub enum LoadedGenerator {
    Completion(LlamaGenerator),
    Chat(Llama2Generator),
}

impl LoadedGenerator {
    pub fn variant(&self) -> ModelVariant {
        match self {
            Self::Completion(_) => ModelVariant::Llama,
            Self::Chat(_) => ModelVariant::Llama2,
        }
    }

    pub fn args(&self) -> &ModelArgs {
        match self {
            Self::Completion(generator) => generator.args(),
            Self::Chat(generator) => generator.args(),
        }
    }
}

/// Reads `params.json`, loads the tokenizer and back-fills the vocabulary
/// size from it. The tokenizer must be loaded before the arguments are final.
pub fn prepare_args(
    ckpt_dir: impl AsRef<Path>,
    tokenizer_path: impl AsRef<Path>,
    max_seq_len: usize,
    max_batch_size: usize,
) -> Result<(ModelArgs, SentencePieceTokenizer)> {
    let params_path = ckpt_dir.as_ref().join(PARAMS_FILE);
    let args = ModelArgs::from_params_file(&params_path, max_seq_len, max_batch_size)?;
    let tokenizer = load_tokenizer(tokenizer_path)?;
    let args = args.with_vocab_size(tokenizer.n_words());
    tracing::debug!(?args, "model arguments");
    Ok((args, tokenizer))
}

/// Loads a Meta checkpoint directory into a generator.
///
/// The model name is validated before anything touches the filesystem.
/// Weights are read into host memory and only moved to the runtime device
/// while the network is built.
pub fn load(
    ckpt_dir: impl AsRef<Path>,
    tokenizer_path: impl AsRef<Path>,
    max_seq_len: usize,
    max_batch_size: usize,
    model_name: &str,
    runtime: &RuntimeConfig,
) -> Result<LoadedGenerator> {
    let variant: ModelVariant = model_name.parse()?;
    let ckpt_dir = ckpt_dir.as_ref();
    let start = Instant::now();

    let checkpoint = find_checkpoint(ckpt_dir)?;
    tracing::info!(checkpoint = %checkpoint.display(), %variant, "Loading");

    let (args, tokenizer) = prepare_args(ckpt_dir, tokenizer_path, max_seq_len, max_batch_size)?;
    let state = read_state_dict(&checkpoint)?;
    let state = to_candle_names(state, &args)?;
    let model = Transformer::from_state_dict(args, state, runtime)?;

    let generator = LlamaGenerator::new(model, Box::new(tokenizer), runtime.seed);
    tracing::info!("Loaded in {:.2} seconds", start.elapsed().as_secs_f64());

    Ok(match variant {
        ModelVariant::Llama => LoadedGenerator::Completion(generator),
        ModelVariant::Llama2 => LoadedGenerator::Chat(Llama2Generator::new(generator)),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointSummary {
    pub checkpoints: Vec<PathBuf>,
    pub selected: PathBuf,
    pub args: ModelArgs,
}

/// Everything `load` would use, without reading any weights.
pub fn inspect(
    ckpt_dir: impl AsRef<Path>,
    tokenizer_path: impl AsRef<Path>,
    max_seq_len: usize,
    max_batch_size: usize,
) -> Result<CheckpointSummary> {
    let ckpt_dir = ckpt_dir.as_ref();
    let selected = find_checkpoint(ckpt_dir)?;
    let checkpoints = list_checkpoints(ckpt_dir)?;
    let (args, _) = prepare_args(ckpt_dir, tokenizer_path, max_seq_len, max_batch_size)?;
    Ok(CheckpointSummary {
        checkpoints,
        selected,
        args,
    })
}
