pub mod generation;
pub mod model;
pub mod runtime;
pub mod tokenizer;

pub use generation::{
    ChatGenerator, ChatPrediction, Dialog, GenerationParams, GenerationStream, Generator, History, Message, Role,
};
pub use model::{ModelArgs, ModelVariant, Transformer};
pub use runtime::{DevicePreference, Precision, RuntimeConfig};
pub use tokenizer::{SentencePieceTokenizer, TokenId, Tokenizer};
