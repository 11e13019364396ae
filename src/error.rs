//! Error types shared by the loader, the generators and the model facades.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The configured model name is neither `llama` nor `llama2`.
    #[error("invalid model variant `{0}`, expected `llama` or `llama2`")]
    InvalidModelVariant(String),

    #[error("no *.pth checkpoint found in {}", .dir.display())]
    NoCheckpointFound { dir: PathBuf },

    #[error("malformed params file {}: {reason}", .path.display())]
    MalformedParams { path: PathBuf, reason: String },

    #[error("failed to load tokenizer from {}: {reason}", .path.display())]
    TokenizerLoad { path: PathBuf, reason: String },

    #[error("invalid dialog: {0}")]
    InvalidDialog(String),

    #[error("invalid settings in {}: {reason}", .path.display())]
    InvalidSettings { path: PathBuf, reason: String },

    #[error("invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed_params(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::MalformedParams {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn tokenizer_load(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::TokenizerLoad {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
