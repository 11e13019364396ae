use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::runtime::RuntimeConfig;
use crate::envconfig;
use crate::error::{Error, Result};

pub const TOKENIZER_FILE: &str = "tokenizer.model";

/// What the model factory needs to build a facade.
///
/// Paths left unset resolve under `cache_dir/<model>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub ckpt_dir: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub system_prompt: Option<String>,
    pub runtime: RuntimeConfig,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "llama".to_string(),
            ckpt_dir: None,
            tokenizer_path: None,
            cache_dir: envconfig::cache_dir(),
            system_prompt: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&raw).map_err(|e| Error::InvalidSettings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_yaml(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let mut settings: Self = serde_yaml::from_str(raw)?;
        settings.cache_dir = envconfig::expand_home(&settings.cache_dir.to_string_lossy());
        Ok(settings)
    }

    pub fn ckpt_dir(&self) -> PathBuf {
        self.ckpt_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join(&self.model))
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.tokenizer_path
            .clone()
            .unwrap_or_else(|| self.cache_dir.join(&self.model).join(TOKENIZER_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runtime::{DevicePreference, Precision};

    #[test]
    fn test_paths_default_under_cache_dir() {
        let settings = ModelSettings {
            cache_dir: PathBuf::from("/srv/ckpt"),
            ..ModelSettings::new("llama2")
        };
        assert_eq!(settings.ckpt_dir(), PathBuf::from("/srv/ckpt/llama2"));
        assert_eq!(settings.tokenizer_path(), PathBuf::from("/srv/ckpt/llama2/tokenizer.model"));
    }

    #[test]
    fn test_explicit_paths_win() {
        let settings = ModelSettings {
            ckpt_dir: Some(PathBuf::from("/data/7B")),
            tokenizer_path: Some(PathBuf::from("/data/tokenizer.model")),
            ..ModelSettings::new("llama")
        };
        assert_eq!(settings.ckpt_dir(), PathBuf::from("/data/7B"));
        assert_eq!(settings.tokenizer_path(), PathBuf::from("/data/tokenizer.model"));
    }

    #[test]
    fn test_from_yaml() {
        let settings = ModelSettings::from_yaml(
            r#"
model: llama2
cache_dir: /models
system_prompt: Answer in one sentence.
runtime:
  device: cpu
  precision: f32
"#,
        )
        .unwrap();
        assert_eq!(settings.model, "llama2");
        assert_eq!(settings.ckpt_dir(), PathBuf::from("/models/llama2"));
        assert_eq!(settings.runtime.device, DevicePreference::Cpu);
        assert_eq!(settings.runtime.precision, Precision::F32);
        assert_eq!(settings.runtime.seed, RuntimeConfig::default().seed);
        assert_eq!(settings.system_prompt.as_deref(), Some("Answer in one sentence."));
    }

    #[test]
    fn test_invalid_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "runtime: [1, 2").unwrap();
        let err = ModelSettings::from_yaml_file(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidSettings { .. }));
    }
}
