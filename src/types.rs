use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct AlignmentInput {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
    pub transcript: String,
}

/// Mono audio held in memory for one alignment run.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

impl Waveform {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        (self.samples.len() as u128 * 1000 / self.sample_rate_hz as u128) as u64
    }
}

/// Frame-level log probabilities over the model vocabulary.
///
/// Every row carries one extra trailing column for the `<star>` wildcard
/// with log probability `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Emissions {
    pub log_probs: Vec<Vec<f32>>,
    /// Duration of one frame in milliseconds, rounded up.
    pub stride_ms: u32,
}

impl Emissions {
    pub fn num_frames(&self) -> usize {
        self.log_probs.len()
    }
}

/// One chunk of transcript to align.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentUnit {
    /// Wildcard absorbing audio that the transcript does not cover.
    Star,
    Text {
        /// Chunk as written in the transcript; reported in the output.
        text: String,
        /// Vocabulary tokens the chunk normalizes to. Empty when nothing survives.
        tokens: Vec<String>,
    },
}

impl AlignmentUnit {
    pub const STAR_TOKEN: &'static str = "<star>";

    pub fn is_star(&self) -> bool {
        matches!(self, Self::Star)
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Star => Self::STAR_TOKEN,
            Self::Text { text, .. } => text,
        }
    }

    pub fn token_count(&self) -> usize {
        match self {
            Self::Star => 1,
            Self::Text { tokens, .. } => tokens.len(),
        }
    }

    pub fn token(&self, idx: usize) -> Option<&str> {
        match self {
            Self::Star => (idx == 0).then_some(Self::STAR_TOKEN),
            Self::Text { tokens, .. } => tokens.get(idx).map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenSequence {
    pub units: Vec<AlignmentUnit>,
}

impl TokenSequence {
    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.units
            .iter()
            .flat_map(|unit| (0..unit.token_count()).filter_map(move |i| unit.token(i)))
    }

    pub fn text_units(&self) -> impl Iterator<Item = &AlignmentUnit> + '_ {
        self.units.iter().filter(|unit| !unit.is_star())
    }
}

/// Best path through the emissions: the aligned token and its log probability per frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramePath {
    pub tokens: Vec<usize>,
    pub scores: Vec<f32>,
}

/// A run of consecutive frames aligned to the same token. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub token: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSpan {
    /// Seconds from the start of the audio.
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Sum of aligned log probabilities over the span's frames.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentOutput {
    pub words: Vec<WordSpan>,
}
