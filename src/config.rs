use std::path::{Path, PathBuf};

use crate::error::AlignmentError;

/// Where the acoustic model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeDevice {
    /// CUDA device 0 when the build and the host support it, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
}

/// Floating point precision used for model weights and activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// F16 on CUDA, F32 on CPU.
    #[default]
    Auto,
    F32,
    F16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitSize {
    Sentence,
    #[default]
    Word,
    Char,
}

/// Placement of `<star>` wildcard units around transcript chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StarFrequency {
    /// One `<star>` before every chunk.
    #[default]
    Segment,
    /// A single `<star>` at each end of the transcript.
    Edges,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmissionConfig {
    pub window_secs: u32,
    pub context_secs: u32,
    pub batch_size: usize,
    /// Zero-mean / unit-variance normalization of each window before inference.
    pub normalize_audio: bool,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            window_secs: 30,
            context_secs: 2,
            batch_size: 16,
            normalize_audio: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextConfig {
    /// ISO-639-3 code of the transcript language.
    pub language: String,
    pub romanize: bool,
    pub split_size: SplitSize,
    pub star_frequency: StarFrequency,
    /// Optional TSV table (`source<TAB>latin`) extending the built-in romanization.
    pub romanization_table: Option<PathBuf>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            language: "rus".to_string(),
            romanize: true,
            split_size: SplitSize::Word,
            star_frequency: StarFrequency::Segment,
            romanization_table: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlignerConfig {
    pub model_path: String,
    pub config_path: String,
    pub vocab_path: String,
    pub device: ComputeDevice,
    pub precision: Precision,
    pub expected_sample_rate_hz: u32,
    pub emission: EmissionConfig,
    pub text: TextConfig,
    /// Word gaps shorter than this many seconds are closed by moving the next start back.
    pub merge_threshold_secs: f64,
}

impl AlignerConfig {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;

    /// Config pointing at `model.safetensors`, `config.json` and `vocab.json` inside `dir`.
    pub fn from_model_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let join = |name: &str| dir.join(name).to_string_lossy().into_owned();
        Self {
            model_path: join("model.safetensors"),
            config_path: join("config.json"),
            vocab_path: join("vocab.json"),
            ..Self::default()
        }
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            config_path: String::new(),
            vocab_path: String::new(),
            device: ComputeDevice::Auto,
            precision: Precision::Auto,
            expected_sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
            emission: EmissionConfig::default(),
            text: TextConfig::default(),
            merge_threshold_secs: 0.0,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct Wav2Vec2ModelConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub conv_dim: Vec<usize>,
    pub conv_kernel: Vec<usize>,
    pub conv_stride: Vec<usize>,
    pub num_conv_pos_embeddings: usize,
    pub num_conv_pos_embedding_groups: usize,
    #[serde(default)]
    pub do_stable_layer_norm: bool,
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f64,
    pub pad_token_id: usize,
    pub vocab_size: usize,
    #[serde(default = "default_feat_norm")]
    pub feat_extract_norm: String,
    #[serde(default = "default_conv_bias")]
    pub conv_bias: bool,
}

fn default_eps() -> f64 {
    1e-5
}
fn default_feat_norm() -> String {
    "group".to_string()
}
fn default_conv_bias() -> bool {
    false
}

impl Wav2Vec2ModelConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read config.json", e))?;
        serde_json::from_str(&data).map_err(|e| AlignmentError::json("parse config.json", e))
    }

    pub(crate) fn frame_stride_ms(&self, sample_rate: u32) -> f64 {
        let stride_samples: usize = self.conv_stride.iter().product();
        stride_samples as f64 / sample_rate as f64 * 1000.0
    }
}
