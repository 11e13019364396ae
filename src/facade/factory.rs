use super::{Llama2Model, LlamaModel, LlmModel};
use crate::config::ModelSettings;
use crate::core::model::ModelVariant;
use crate::error::Result;
use crate::infra::loader::{load, LoadedGenerator};

pub const MAX_SEQ_LEN: usize = 512;
pub const MAX_BATCH_SIZE: usize = 32;

/// Builds the facade named by `settings.model` (`llama` or `llama2`).
pub fn get_model(settings: &ModelSettings) -> Result<Box<dyn LlmModel>> {
    let variant: ModelVariant = settings.model.parse()?;
    let loaded = load(
        settings.ckpt_dir(),
        settings.tokenizer_path(),
        MAX_SEQ_LEN,
        MAX_BATCH_SIZE,
        variant.name(),
        &settings.runtime,
    )?;
    tracing::debug!(
        model = %loaded.variant(),
        vocab_size = loaded.args().vocab_size,
        n_layers = loaded.args().n_layers,
        "model ready"
    );
    Ok(wrap(loaded, settings))
}

fn wrap(loaded: LoadedGenerator, settings: &ModelSettings) -> Box<dyn LlmModel> {
    match loaded {
        LoadedGenerator::Completion(generator) => Box::new(LlamaModel::new(generator)),
        LoadedGenerator::Chat(generator) => {
            Box::new(Llama2Model::new(generator).with_system_prompt(settings.system_prompt.clone()))
        }
    }
}
