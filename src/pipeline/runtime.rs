use std::borrow::Cow;

use crate::alignment::emissions::generate_emissions;
use crate::alignment::tokenization::target_ids;
use crate::alignment::vocab::Vocabulary;
use crate::audio::resample;
use crate::config::EmissionConfig;
use crate::error::AlignmentError;
use crate::pipeline::traits::{RuntimeBackend, SequenceAligner, Tokenizer, WordGrouper};
use crate::types::{AlignmentInput, AlignmentOutput, Emissions, TokenSequence};

pub struct ForcedAligner {
    runtime_backend: Box<dyn RuntimeBackend>,
    vocab: Vocabulary,
    frame_stride_ms: f64,
    expected_sample_rate_hz: u32,
    emission: EmissionConfig,
    merge_threshold_secs: f64,
    tokenizer: Box<dyn Tokenizer>,
    sequence_aligner: Box<dyn SequenceAligner>,
    word_grouper: Box<dyn WordGrouper>,
}

pub(crate) struct ForcedAlignerParts {
    pub runtime_backend: Box<dyn RuntimeBackend>,
    pub vocab: Vocabulary,
    pub frame_stride_ms: f64,
    pub expected_sample_rate_hz: u32,
    pub emission: EmissionConfig,
    pub merge_threshold_secs: f64,
    pub tokenizer: Box<dyn Tokenizer>,
    pub sequence_aligner: Box<dyn SequenceAligner>,
    pub word_grouper: Box<dyn WordGrouper>,
}

impl ForcedAligner {
    pub(crate) fn from_parts(parts: ForcedAlignerParts) -> Self {
        Self {
            runtime_backend: parts.runtime_backend,
            vocab: parts.vocab,
            frame_stride_ms: parts.frame_stride_ms,
            expected_sample_rate_hz: parts.expected_sample_rate_hz,
            emission: parts.emission,
            merge_threshold_secs: parts.merge_threshold_secs,
            tokenizer: parts.tokenizer,
            sequence_aligner: parts.sequence_aligner,
            word_grouper: parts.word_grouper,
        }
    }

    pub fn align(&self, input: &AlignmentInput) -> Result<AlignmentOutput, AlignmentError> {
        let token_sequence = self.tokenize(&input.transcript)?;
        let targets = target_ids(&token_sequence, &self.vocab);

        let samples = self.model_rate_samples(input)?;
        let emissions = self.generate_emissions(&samples)?;

        let path = self.sequence_aligner.align_path(
            &emissions.log_probs,
            &targets,
            self.vocab.blank_id(),
        )?;
        let words = self.word_grouper.group_words(
            &token_sequence,
            &path,
            &self.vocab,
            emissions.stride_ms,
            self.merge_threshold_secs,
        )?;

        tracing::info!(
            frames = emissions.num_frames(),
            stride_ms = emissions.stride_ms,
            targets = targets.len(),
            words = words.len(),
            "alignment finished"
        );
        Ok(AlignmentOutput { words })
    }

    /// Emissions for audio already at the model sample rate.
    pub fn generate_emissions(&self, samples: &[f32]) -> Result<Emissions, AlignmentError> {
        let emissions = generate_emissions(
            self.runtime_backend.as_ref(),
            samples,
            self.expected_sample_rate_hz,
            self.frame_stride_ms,
            &self.emission,
        )?;
        let width = emissions.log_probs.first().map_or(0, Vec::len);
        if width != self.vocab.emission_width() {
            return Err(AlignmentError::runtime(
                "generate emissions",
                format!(
                    "model emits {} columns (with <star>), vocabulary expects {}",
                    width,
                    self.vocab.emission_width()
                ),
            ));
        }
        Ok(emissions)
    }

    pub fn tokenize(&self, transcript: &str) -> Result<TokenSequence, AlignmentError> {
        self.tokenizer.tokenize(transcript, &self.vocab)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn frame_stride_ms(&self) -> f64 {
        self.frame_stride_ms
    }

    pub fn expected_sample_rate_hz(&self) -> u32 {
        self.expected_sample_rate_hz
    }

    pub fn device_label(&self) -> String {
        self.runtime_backend.device_label()
    }

    fn model_rate_samples<'a>(
        &self,
        input: &'a AlignmentInput,
    ) -> Result<Cow<'a, [f32]>, AlignmentError> {
        if input.sample_rate_hz == self.expected_sample_rate_hz {
            return Ok(Cow::Borrowed(&input.samples));
        }
        tracing::warn!(
            expected_rate_hz = self.expected_sample_rate_hz,
            actual_rate_hz = input.sample_rate_hz,
            "input sample rate differs from the model rate; resampling"
        );
        resample(
            &input.samples,
            input.sample_rate_hz,
            self.expected_sample_rate_hz,
        )
        .map(Cow::Owned)
        .map_err(|e| AlignmentError::invalid_input(format!("resample input: {e}")))
    }
}
