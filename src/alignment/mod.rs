pub mod emissions;
pub mod postprocess;
pub mod segments;
pub mod spans;
pub mod tokenization;
pub mod viterbi;
pub mod vocab;
