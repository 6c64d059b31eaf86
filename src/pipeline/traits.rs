use crate::alignment::vocab::Vocabulary;
use crate::error::AlignmentError;
use crate::types::{FramePath, TokenSequence, WordSpan};

/// Acoustic model inference over a batch of equally long audio windows.
pub trait RuntimeBackend: Send + Sync {
    /// Returns one `frames x vocab` matrix of log probabilities per window.
    fn infer(&self, windows: &[&[f32]]) -> Result<Vec<Vec<Vec<f32>>>, AlignmentError>;

    fn device_label(&self) -> String;
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(
        &self,
        transcript: &str,
        vocab: &Vocabulary,
    ) -> Result<TokenSequence, AlignmentError>;
}

pub trait SequenceAligner: Send + Sync {
    fn align_path(
        &self,
        log_probs: &[Vec<f32>],
        targets: &[usize],
        blank_id: usize,
    ) -> Result<FramePath, AlignmentError>;
}

pub trait WordGrouper: Send + Sync {
    fn group_words(
        &self,
        token_sequence: &TokenSequence,
        path: &FramePath,
        vocab: &Vocabulary,
        stride_ms: u32,
        merge_threshold_secs: f64,
    ) -> Result<Vec<WordSpan>, AlignmentError>;
}
