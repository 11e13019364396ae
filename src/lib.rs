pub mod app;
pub mod cmd;
pub mod config;
pub mod core;
pub mod envconfig;
pub mod error;
pub mod facade;
pub mod infra;

pub use config::ModelSettings;
pub use core::{
    ChatGenerator, Dialog, GenerationParams, GenerationStream, Generator, History, Message, ModelArgs,
    ModelVariant, Role, RuntimeConfig, Tokenizer,
};
pub use error::{Error, Result};
pub use facade::{get_model, Llama2Model, LlamaModel, LlmModel, WebDemoReply};
pub use infra::{load, LoadedGenerator};
