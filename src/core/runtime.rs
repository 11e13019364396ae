use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use candle_core::{DType, Device};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" => Ok(Self::Metal),
            other => Err(format!("unknown device `{}`", other)),
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Metal => "metal",
        };
        f.write_str(name)
    }
}

/// Floating point precision the weights are converted to when the model is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    F16,
    Bf16,
    F32,
}

impl Precision {
    pub fn dtype(self) -> DType {
        match self {
            Self::F16 => DType::F16,
            Self::Bf16 => DType::BF16,
            Self::F32 => DType::F32,
        }
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f16" | "half" => Ok(Self::F16),
            "bf16" => Ok(Self::Bf16),
            "f32" | "float" => Ok(Self::F32),
            other => Err(format!("unknown dtype `{}`", other)),
        }
    }
}

/// Device and precision settings handed to the loader and the generators.
///
/// Nothing here is process-global: two models loaded with different
/// configurations in the same process do not interfere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub device: DevicePreference,
    pub precision: Precision,
    pub seed: u64,
    pub use_flash_attn: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device: DevicePreference::Auto,
            precision: Precision::F16,
            seed: 299792458,
            use_flash_attn: false,
        }
    }
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Opens the compute device. `Auto` prefers CUDA, then Metal, then CPU.
    pub fn select_device(&self) -> Result<Device> {
        let device = match self.device {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => Device::new_cuda(0)?,
            DevicePreference::Metal => Device::new_metal(0)?,
            DevicePreference::Auto => {
                if candle_core::utils::cuda_is_available() {
                    Device::new_cuda(0)?
                } else if candle_core::utils::metal_is_available() {
                    Device::new_metal(0)?
                } else {
                    Device::Cpu
                }
            }
        };
        tracing::debug!(preference = %self.device, ?device, "selected compute device");
        Ok(device)
    }

    pub fn dtype(&self) -> DType {
        self.precision.dtype()
    }
}

#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    pub fn device(mut self, device: DevicePreference) -> Self {
        self.config.device = device;
        self
    }

    pub fn precision(mut self, precision: Precision) -> Self {
        self.config.precision = precision;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn use_flash_attn(mut self, enabled: bool) -> Self {
        self.config.use_flash_attn = enabled;
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}
