use crate::alignment::postprocess::to_word_spans;
use crate::alignment::segments::merge_repeats;
use crate::alignment::spans::word_spans;
use crate::alignment::tokenization::build_token_sequence;
use crate::alignment::viterbi::align_targets;
use crate::alignment::vocab::Vocabulary;
use crate::config::TextConfig;
use crate::error::AlignmentError;
use crate::pipeline::traits::{SequenceAligner, Tokenizer, WordGrouper};
use crate::text::Romanizer;
use crate::types::{FramePath, TokenSequence, WordSpan};

/// Splits, normalizes and (optionally) romanizes the transcript, then
/// inserts `<star>` units.
pub struct RomanizingTokenizer {
    config: TextConfig,
    romanizer: Option<Romanizer>,
}

impl RomanizingTokenizer {
    pub fn new(config: TextConfig) -> Result<Self, AlignmentError> {
        let romanizer = if config.romanize {
            let romanizer = Romanizer::new(&config.language);
            Some(match &config.romanization_table {
                Some(path) => romanizer.with_table_file(path)?,
                None => romanizer,
            })
        } else {
            None
        };
        Ok(Self { config, romanizer })
    }
}

impl Tokenizer for RomanizingTokenizer {
    fn tokenize(
        &self,
        transcript: &str,
        vocab: &Vocabulary,
    ) -> Result<TokenSequence, AlignmentError> {
        build_token_sequence(transcript, &self.config, self.romanizer.as_ref(), vocab)
    }
}

pub struct ViterbiSequenceAligner;

impl SequenceAligner for ViterbiSequenceAligner {
    fn align_path(
        &self,
        log_probs: &[Vec<f32>],
        targets: &[usize],
        blank_id: usize,
    ) -> Result<FramePath, AlignmentError> {
        align_targets(log_probs, targets, blank_id)
    }
}

/// Segments → blank-padded spans → timed words.
pub struct SpanWordGrouper;

impl WordGrouper for SpanWordGrouper {
    fn group_words(
        &self,
        token_sequence: &TokenSequence,
        path: &FramePath,
        vocab: &Vocabulary,
        stride_ms: u32,
        merge_threshold_secs: f64,
    ) -> Result<Vec<WordSpan>, AlignmentError> {
        let segments = merge_repeats(path);
        let spans = word_spans(token_sequence, &segments, vocab)?;
        to_word_spans(
            token_sequence,
            &spans,
            stride_ms,
            &path.scores,
            merge_threshold_secs,
        )
    }
}
