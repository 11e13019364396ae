//! Meta checkpoint discovery and state-dict translation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::Tensor;

use crate::core::model::ModelArgs;
use crate::error::{Error, Result};

pub const CHECKPOINT_EXTENSION: &str = "pth";
pub const PARAMS_FILE: &str = "params.json";

/// All `*.pth` files in `dir`, sorted by file name.
pub fn list_checkpoints(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut checkpoints = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == CHECKPOINT_EXTENSION) {
            checkpoints.push(path);
        }
    }
    checkpoints.sort();
    Ok(checkpoints)
}

/// The checkpoint that gets loaded: the first `*.pth` in sort order.
/// Sharded checkpoints are not merged.
pub fn find_checkpoint(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let mut checkpoints = list_checkpoints(dir)?;
    if checkpoints.len() > 1 {
        tracing::warn!(
            count = checkpoints.len(),
            "multiple checkpoints found, only the first one is loaded"
        );
    }
    if checkpoints.is_empty() {
        return Err(Error::NoCheckpointFound { dir: dir.to_path_buf() });
    }
    Ok(checkpoints.remove(0))
}

/// Reads a PyTorch checkpoint into host memory.
pub fn read_state_dict(path: impl AsRef<Path>) -> Result<HashMap<String, Tensor>> {
    let path = path.as_ref();
    let tensors = candle_core::pickle::read_all(path)?;
    Ok(tensors.into_iter().collect())
}

/// Renames Meta's parameter names to the layout candle's llama loads, and
/// reorders the query/key rows from interleaved to half-split rotary pairs.
pub fn to_candle_names(state: HashMap<String, Tensor>, args: &ModelArgs) -> Result<HashMap<String, Tensor>> {
    let head_dim = args.head_dim();
    let mut renamed = HashMap::with_capacity(state.len());

    for (name, tensor) in state {
        let Some(target) = candle_name(&name) else {
            tracing::debug!(name = %name, "skipping unused checkpoint tensor");
            continue;
        };
        let tensor = if name.ends_with("attention.wq.weight") {
            unpermute_rotary(&tensor, args.n_heads, head_dim)?
        } else if name.ends_with("attention.wk.weight") {
            unpermute_rotary(&tensor, args.kv_heads(), head_dim)?
        } else {
            tensor
        };
        renamed.insert(target, tensor);
    }

    Ok(renamed)
}

fn candle_name(name: &str) -> Option<String> {
    match name {
        "tok_embeddings.weight" => return Some("model.embed_tokens.weight".into()),
        "norm.weight" => return Some("model.norm.weight".into()),
        "output.weight" => return Some("lm_head.weight".into()),
        _ => {}
    }

    let rest = name.strip_prefix("layers.")?;
    let (layer, param) = rest.split_once('.')?;
    let layer: usize = layer.parse().ok()?;
    let param = match param {
        "attention.wq.weight" => "self_attn.q_proj.weight",
        "attention.wk.weight" => "self_attn.k_proj.weight",
        "attention.wv.weight" => "self_attn.v_proj.weight",
        "attention.wo.weight" => "self_attn.o_proj.weight",
        "feed_forward.w1.weight" => "mlp.gate_proj.weight",
        "feed_forward.w2.weight" => "mlp.down_proj.weight",
        "feed_forward.w3.weight" => "mlp.up_proj.weight",
        "attention_norm.weight" => "input_layernorm.weight",
        "ffn_norm.weight" => "post_attention_layernorm.weight",
        _ => return None,
    };
    Some(format!("model.layers.{}.{}", layer, param))
}

fn unpermute_rotary(weight: &Tensor, n_heads: usize, head_dim: usize) -> Result<Tensor> {
    let (rows, cols) = weight.dims2()?;
    Ok(weight
        .reshape((n_heads, head_dim / 2, 2, cols))?
        .transpose(1, 2)?
        .reshape((rows, cols))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_find_checkpoint_picks_first_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["consolidated.02.pth", "consolidated.00.pth", "consolidated.01.pth", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("backup.pth")).unwrap();

        let all = list_checkpoints(dir.path()).unwrap();
        assert_eq!(all.len(), 3);
        let chosen = find_checkpoint(dir.path()).unwrap();
        assert_eq!(chosen.file_name().unwrap(), "consolidated.00.pth");
    }

    #[test]
    fn test_no_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PARAMS_FILE), b"{}").unwrap();
        let err = find_checkpoint(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NoCheckpointFound { .. }));
    }

    #[test]
    fn test_missing_directory() {
        let err = find_checkpoint("/no/such/checkpoint/dir").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_candle_names() {
        assert_eq!(candle_name("tok_embeddings.weight").as_deref(), Some("model.embed_tokens.weight"));
        assert_eq!(
            candle_name("layers.11.feed_forward.w2.weight").as_deref(),
            Some("model.layers.11.mlp.down_proj.weight")
        );
        assert_eq!(
            candle_name("layers.0.attention_norm.weight").as_deref(),
            Some("model.layers.0.input_layernorm.weight")
        );
        assert_eq!(candle_name("rope.freqs"), None);
    }

    #[test]
    fn test_rotary_rows_reordered() {
        let args = ModelArgs::builder().dim(4).n_heads(1).build();
        let wq = Tensor::arange(0f32, 4., &Device::Cpu).unwrap().reshape((4, 1)).unwrap();
        let mut state = HashMap::new();
        state.insert("layers.0.attention.wq.weight".to_string(), wq.clone());
        state.insert("layers.0.attention.wv.weight".to_string(), wq);
        state.insert("rope.freqs".to_string(), Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap());

        let renamed = to_candle_names(state, &args).unwrap();
        assert_eq!(renamed.len(), 2);

        let q: Vec<f32> = renamed["model.layers.0.self_attn.q_proj.weight"].flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(q, vec![0., 2., 1., 3.]);
        let v: Vec<f32> = renamed["model.layers.0.self_attn.v_proj.weight"].flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(v, vec![0., 1., 2., 3.]);
    }
}
