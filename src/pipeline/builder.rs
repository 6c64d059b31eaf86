use std::path::Path;

use crate::alignment::vocab::Vocabulary;
use crate::config::{AlignerConfig, Wav2Vec2ModelConfig};
use crate::error::AlignmentError;
use crate::pipeline::defaults::{RomanizingTokenizer, SpanWordGrouper, ViterbiSequenceAligner};
use crate::pipeline::model_runtime::build_runtime_backend;
use crate::pipeline::runtime::{ForcedAligner, ForcedAlignerParts};
use crate::pipeline::traits::{RuntimeBackend, SequenceAligner, Tokenizer, WordGrouper};

pub struct ForcedAlignerBuilder {
    config: AlignerConfig,
    runtime_backend: Option<Box<dyn RuntimeBackend>>,
    tokenizer: Option<Box<dyn Tokenizer>>,
    sequence_aligner: Option<Box<dyn SequenceAligner>>,
    word_grouper: Option<Box<dyn WordGrouper>>,
}

impl ForcedAlignerBuilder {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            config,
            runtime_backend: None,
            tokenizer: None,
            sequence_aligner: None,
            word_grouper: None,
        }
    }

    pub fn with_runtime_backend(mut self, runtime_backend: Box<dyn RuntimeBackend>) -> Self {
        self.runtime_backend = Some(runtime_backend);
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Box<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_sequence_aligner(mut self, sequence_aligner: Box<dyn SequenceAligner>) -> Self {
        self.sequence_aligner = Some(sequence_aligner);
        self
    }

    pub fn with_word_grouper(mut self, word_grouper: Box<dyn WordGrouper>) -> Self {
        self.word_grouper = Some(word_grouper);
        self
    }

    pub fn build(self) -> Result<ForcedAligner, AlignmentError> {
        let model_cfg = Wav2Vec2ModelConfig::load(Path::new(&self.config.config_path))?;
        let expected_sample_rate_hz = if self.config.expected_sample_rate_hz == 0 {
            AlignerConfig::DEFAULT_SAMPLE_RATE_HZ
        } else {
            self.config.expected_sample_rate_hz
        };
        let frame_stride_ms = model_cfg.frame_stride_ms(expected_sample_rate_hz);

        let vocab = Vocabulary::load(
            Path::new(&self.config.vocab_path),
            model_cfg.pad_token_id,
            model_cfg.vocab_size,
        )?;

        let tokenizer = match self.tokenizer {
            Some(tokenizer) => tokenizer,
            None => Box::new(RomanizingTokenizer::new(self.config.text.clone())?),
        };

        let runtime_backend = match self.runtime_backend {
            Some(runtime_backend) => runtime_backend,
            None => build_runtime_backend(&self.config, &model_cfg)?,
        };

        tracing::debug!(
            frame_stride_ms,
            blank_id = vocab.blank_id(),
            star_id = vocab.star_id(),
            device = %runtime_backend.device_label(),
            "forced aligner assembled"
        );

        Ok(ForcedAligner::from_parts(ForcedAlignerParts {
            runtime_backend,
            vocab,
            frame_stride_ms,
            expected_sample_rate_hz,
            emission: self.config.emission,
            merge_threshold_secs: self.config.merge_threshold_secs,
            tokenizer,
            sequence_aligner: self
                .sequence_aligner
                .unwrap_or_else(|| Box::new(ViterbiSequenceAligner)),
            word_grouper: self
                .word_grouper
                .unwrap_or_else(|| Box::new(SpanWordGrouper)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlignmentInput;

    const VOCAB_SIZE: usize = 6;

    /// Every frame strongly favours `<blank>`.
    struct BlankBackend;

    impl RuntimeBackend for BlankBackend {
        fn infer(&self, windows: &[&[f32]]) -> Result<Vec<Vec<Vec<f32>>>, AlignmentError> {
            Ok(windows
                .iter()
                .map(|w| {
                    let frames = (w.len() - 400) / 320 + 1;
                    let mut row = vec![-5.0f32; VOCAB_SIZE];
                    row[0] = -0.01;
                    vec![row; frames]
                })
                .collect())
        }

        fn device_label(&self) -> String {
            "mock".to_string()
        }
    }

    const MINIMAL_CONFIG_JSON: &str = r#"{
        "hidden_size": 768,
        "num_hidden_layers": 12,
        "num_attention_heads": 12,
        "intermediate_size": 3072,
        "conv_dim": [512],
        "conv_kernel": [10],
        "conv_stride": [5, 2, 2, 2, 2, 2, 2],
        "num_conv_pos_embeddings": 128,
        "num_conv_pos_embedding_groups": 16,
        "pad_token_id": 1,
        "vocab_size": 6
    }"#;

    const VOCAB_JSON: &str = r#"{"<blank>": 0, "<pad>": 1, "</s>": 2, "a": 3, "b": 4, "'": 5}"#;

    fn model_dir(config_json: &str, vocab_json: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("config.json"), config_json).expect("write config");
        std::fs::write(dir.path().join("vocab.json"), vocab_json).expect("write vocab");
        dir
    }

    fn config(dir: &tempfile::TempDir) -> AlignerConfig {
        let mut config = AlignerConfig::from_model_dir(dir.path());
        config.emission.window_secs = 1;
        config.emission.context_secs = 0;
        config
    }

    #[test]
    fn builder_starts_without_injected_parts() {
        let builder = ForcedAlignerBuilder::new(AlignerConfig::default());
        assert!(builder.runtime_backend.is_none());
        assert!(builder.tokenizer.is_none());
    }

    #[test]
    fn build_success_with_mock_backend_and_temp_files() {
        let dir = model_dir(MINIMAL_CONFIG_JSON, VOCAB_JSON);
        let aligner = ForcedAlignerBuilder::new(config(&dir))
            .with_runtime_backend(Box::new(BlankBackend))
            .build()
            .expect("build should succeed");

        assert_eq!(aligner.device_label(), "mock");
        assert!((aligner.frame_stride_ms() - 20.0).abs() < 1e-9);
        assert_eq!(aligner.vocabulary().blank_id(), 0);
        assert_eq!(aligner.vocabulary().emission_width(), 7);

        let input = AlignmentInput {
            sample_rate_hz: 16_000,
            samples: vec![0.0f32; 16_000],
            transcript: "ab ba".to_string(),
        };
        let out = aligner.align(&input).expect("align");
        assert_eq!(out.words.len(), 2);
        assert_eq!(out.words[0].text, "ab");
        assert!(out.words[0].start <= out.words[1].start);
    }

    #[test]
    fn build_fails_on_invalid_config_path() {
        let dir = model_dir(MINIMAL_CONFIG_JSON, VOCAB_JSON);
        let mut config = config(&dir);
        config.config_path = "/nonexistent/config.json".to_string();
        let result = ForcedAlignerBuilder::new(config)
            .with_runtime_backend(Box::new(BlankBackend))
            .build();
        assert!(matches!(result, Err(AlignmentError::Io { .. })));
    }

    #[test]
    fn build_fails_on_invalid_vocab_path() {
        let dir = model_dir(MINIMAL_CONFIG_JSON, VOCAB_JSON);
        let mut config = config(&dir);
        config.vocab_path = "/nonexistent/vocab.json".to_string();
        let result = ForcedAlignerBuilder::new(config)
            .with_runtime_backend(Box::new(BlankBackend))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn emission_width_mismatch_is_reported() {
        let wider_vocab = r#"{"<blank>": 0, "<pad>": 1, "a": 2}"#;
        let config_json = MINIMAL_CONFIG_JSON.replace("\"vocab_size\": 6", "\"vocab_size\": 3");
        let dir = model_dir(&config_json, wider_vocab);
        let aligner = ForcedAlignerBuilder::new(config(&dir))
            .with_runtime_backend(Box::new(BlankBackend))
            .build()
            .expect("build");
        let err = aligner.generate_emissions(&[0.0; 16_000]).unwrap_err();
        assert!(matches!(err, AlignmentError::Runtime { .. }));
    }

    #[test]
    fn empty_transcript_is_rejected_before_inference() {
        let dir = model_dir(MINIMAL_CONFIG_JSON, VOCAB_JSON);
        let aligner = ForcedAlignerBuilder::new(config(&dir))
            .with_runtime_backend(Box::new(BlankBackend))
            .build()
            .expect("build");
        let input = AlignmentInput {
            sample_rate_hz: 16_000,
            samples: vec![0.0f32; 16_000],
            transcript: " \n ".to_string(),
        };
        assert!(matches!(
            aligner.align(&input),
            Err(AlignmentError::InvalidInput { .. })
        ));
    }
}
