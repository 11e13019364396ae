pub mod args;
pub mod transformer;

pub use args::{ModelArgs, ModelArgsBuilder};
pub use transformer::Transformer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Which generator the loaded weights are wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Plain text completion.
    Llama,
    /// Dialog completion with the `[INST]` chat format.
    Llama2,
}

impl ModelVariant {
    pub fn name(self) -> &'static str {
        match self {
            Self::Llama => "llama",
            Self::Llama2 => "llama2",
        }
    }
}

impl FromStr for ModelVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llama" => Ok(Self::Llama),
            "llama2" => Ok(Self::Llama2),
            other => Err(Error::InvalidModelVariant(other.to_string())),
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
