pub mod alignment;
pub mod audio;
pub mod config;
pub mod error;
pub mod hub;
mod model;
pub mod output;
pub mod pipeline;
pub mod text;
pub mod types;

pub use alignment::vocab::Vocabulary;
pub use config::{
    AlignerConfig, ComputeDevice, EmissionConfig, Precision, SplitSize, StarFrequency, TextConfig,
};
pub use error::AlignmentError;
pub use pipeline::builder::ForcedAlignerBuilder;
pub use pipeline::runtime::ForcedAligner;
pub use pipeline::traits::{RuntimeBackend, SequenceAligner, Tokenizer, WordGrouper};
pub use types::{
    AlignmentInput, AlignmentOutput, AlignmentUnit, Emissions, FramePath, Segment, TokenSequence,
    Waveform, WordSpan,
};
