//! Model file resolution, locally or from the Hugging Face Hub.

use std::path::{Path, PathBuf};

use crate::config::AlignerConfig;
#[cfg(feature = "hub")]
use crate::error::AlignmentError;

pub const DEFAULT_MODEL_ID: &str = "MahmoudAshraf/mms-300m-1130-forced-aligner";

const MODEL_FILE: &str = "model.safetensors";
const CONFIG_FILE: &str = "config.json";
const VOCAB_FILE: &str = "vocab.json";

/// Paths of the three files an aligner is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub model: PathBuf,
    pub config: PathBuf,
    pub vocab: PathBuf,
}

impl ModelFiles {
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(MODEL_FILE),
            config: dir.join(CONFIG_FILE),
            vocab: dir.join(VOCAB_FILE),
        }
    }

    /// Default aligner configuration pointing at these files.
    pub fn aligner_config(&self) -> AlignerConfig {
        AlignerConfig {
            model_path: self.model.to_string_lossy().into_owned(),
            config_path: self.config.to_string_lossy().into_owned(),
            vocab_path: self.vocab.to_string_lossy().into_owned(),
            ..AlignerConfig::default()
        }
    }
}

/// Download (or reuse from the local cache) the files of `model_id`.
#[cfg(feature = "hub")]
pub fn fetch_model(model_id: &str) -> Result<ModelFiles, AlignmentError> {
    let api = hf_hub::api::sync::Api::new()
        .map_err(|e| AlignmentError::runtime("init hub client", e))?;
    let repo = api.model(model_id.to_string());

    let fetch = |name: &str| {
        tracing::info!(model_id, file = name, "fetching model file");
        repo.get(name)
            .map_err(|e| AlignmentError::runtime("download model file", format!("{name}: {e}")))
    };
    Ok(ModelFiles {
        model: fetch(MODEL_FILE)?,
        config: fetch(CONFIG_FILE)?,
        vocab: fetch(VOCAB_FILE)?,
    })
}
