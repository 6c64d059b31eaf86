use std::path::Path;

use ctc_forced_aligner::output::{to_json_pretty, write_word_spans};
use ctc_forced_aligner::{
    AlignerConfig, AlignmentError, AlignmentInput, ForcedAligner, ForcedAlignerBuilder,
    RuntimeBackend, StarFrequency, WordSpan,
};

const SAMPLE_RATE_HZ: u32 = 16_000;
const HOP: usize = 320;
const RECEPTIVE_FIELD: usize = 400;
const VOCAB_SIZE: usize = 31;
const CODE_SCALE: f32 = 100.0;

const CONFIG_JSON: &str = r#"{
    "hidden_size": 1024,
    "num_hidden_layers": 24,
    "num_attention_heads": 16,
    "intermediate_size": 4096,
    "conv_dim": [512, 512, 512, 512, 512, 512, 512],
    "conv_kernel": [10, 3, 3, 3, 3, 2, 2],
    "conv_stride": [5, 2, 2, 2, 2, 2, 2],
    "num_conv_pos_embeddings": 128,
    "num_conv_pos_embedding_groups": 16,
    "do_stable_layer_norm": true,
    "feat_extract_norm": "layer",
    "conv_bias": true,
    "pad_token_id": 1,
    "vocab_size": 31
}"#;

/// Reads the token id encoded in the audio under each frame and strongly
/// favours it. Padding (zeros) maps to `<blank>`.
struct TokenCodeBackend;

impl RuntimeBackend for TokenCodeBackend {
    fn infer(&self, windows: &[&[f32]]) -> Result<Vec<Vec<Vec<f32>>>, AlignmentError> {
        Ok(windows
            .iter()
            .map(|window| {
                let frames = (window.len() - RECEPTIVE_FIELD) / HOP + 1;
                (0..frames)
                    .map(|f| {
                        let code = (window[f * HOP + 200] * CODE_SCALE).round();
                        let id = (code.max(0.0) as usize).min(VOCAB_SIZE - 1);
                        let mut row = vec![-8.0f32; VOCAB_SIZE];
                        row[id] = -0.01;
                        row
                    })
                    .collect()
            })
            .collect())
    }

    fn device_label(&self) -> String {
        "token-code".to_string()
    }
}

fn vocab_json() -> String {
    let mut entries = vec![
        "\"<blank>\": 0".to_string(),
        "\"<pad>\": 1".to_string(),
        "\"</s>\": 2".to_string(),
        "\"<unk>\": 3".to_string(),
    ];
    for (i, c) in ('a'..='z').enumerate() {
        entries.push(format!("\"{c}\": {}", i + 4));
    }
    entries.push("\"'\": 30".to_string());
    format!("{{{}}}", entries.join(", "))
}

fn letter_id(c: char) -> usize {
    c as usize - 'a' as usize + 4
}

/// Runs of `(token, frames)` rendered as audio at 16 kHz.
fn encode_frames(runs: &[(usize, usize)]) -> Vec<f32> {
    let mut samples = Vec::new();
    for &(token, frames) in runs {
        samples.extend(std::iter::repeat(token as f32 / CODE_SCALE).take(frames * HOP));
    }
    samples
}

/// "Это мой дом." spoken as e t o | m o y | d o m, 60 frames in total.
fn house_audio() -> Vec<f32> {
    let mut runs = vec![(0, 10)];
    for word in ["eto", "moy", "dom"] {
        for c in word.chars() {
            runs.push((letter_id(c), 3));
        }
        runs.push((0, 6));
    }
    runs.last_mut().expect("runs").1 = 11;
    encode_frames(&runs)
}

fn write_model_files(dir: &Path) {
    std::fs::write(dir.join("config.json"), CONFIG_JSON).expect("write config");
    std::fs::write(dir.join("vocab.json"), vocab_json()).expect("write vocab");
}

fn build_aligner(dir: &Path, star_frequency: StarFrequency) -> ForcedAligner {
    let mut config = AlignerConfig::from_model_dir(dir);
    config.text.star_frequency = star_frequency;
    ForcedAlignerBuilder::new(config)
        .with_runtime_backend(Box::new(TokenCodeBackend))
        .build()
        .expect("build aligner")
}

fn house_input() -> AlignmentInput {
    AlignmentInput {
        sample_rate_hz: SAMPLE_RATE_HZ,
        samples: house_audio(),
        transcript: "Это мой дом.".to_string(),
    }
}

fn assert_word(word: &WordSpan, text: &str, start: f64, end: f64) {
    assert_eq!(word.text, text);
    assert!(
        (word.start - start).abs() < 1e-9 && (word.end - end).abs() < 1e-9,
        "{text}: got [{}, {}], expected [{start}, {end}]",
        word.start,
        word.end
    );
}

#[test]
fn emissions_cover_the_audio_at_twenty_ms() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Segment);

    let emissions = aligner.generate_emissions(&house_audio()).expect("emissions");
    assert_eq!(emissions.num_frames(), 60);
    assert_eq!(emissions.stride_ms, 20);
    assert!(emissions.log_probs.iter().all(|row| row.len() == VOCAB_SIZE + 1));
    assert!(emissions.log_probs.iter().all(|row| row[VOCAB_SIZE] == 0.0));
    assert_eq!(emissions.log_probs[12][letter_id('e')], -0.01);
}

#[test]
fn segment_stars_align_each_word_to_its_letters() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Segment);

    let output = aligner.align(&house_input()).expect("align");
    assert_eq!(output.words.len(), 3);
    assert_word(&output.words[0], "Это", 0.24, 0.32);
    assert_word(&output.words[1], "мой", 0.50, 0.62);
    // The trailing silence is folded into the last word.
    assert_word(&output.words[2], "дом.", 0.84, 1.18);
    assert!(output.words.iter().all(|w| w.score <= 0.0));
}

#[test]
fn edge_stars_split_silence_between_words() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Edges);

    let output = aligner.align(&house_input()).expect("align");
    assert_eq!(output.words.len(), 3);
    assert_word(&output.words[0], "Это", 0.24, 0.42);
    assert_word(&output.words[1], "мой", 0.42, 0.72);
    assert_word(&output.words[2], "дом.", 0.72, 0.96);
}

#[test]
fn repeated_runs_are_deterministic_and_ordered() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Segment);

    let first = aligner.align(&house_input()).expect("first run");
    let second = aligner.align(&house_input()).expect("second run");
    assert_eq!(first.words, second.words);
    for pair in first.words.windows(2) {
        assert!(pair[0].start <= pair[1].start);
    }
    for word in &first.words {
        assert!(word.start <= word.end);
    }
}

#[test]
fn json_output_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Segment);
    let output = aligner.align(&house_input()).expect("align");

    let json = to_json_pretty(&output.words).expect("json");
    assert!(json.contains("\"text\": \"дом.\""));
    let parsed: Vec<WordSpan> = serde_json::from_str(&json).expect("parse json");
    assert_eq!(parsed, output.words);

    let out_path = dir.path().join("results").join("alignment_results.json");
    write_word_spans(&out_path, &output.words).expect("write results");
    let from_file: Vec<WordSpan> =
        serde_json::from_str(&std::fs::read_to_string(&out_path).expect("read results"))
            .expect("parse file");
    assert_eq!(from_file, output.words);
}

#[test]
fn empty_transcript_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Segment);

    let input = AlignmentInput {
        transcript: "  ".to_string(),
        ..house_input()
    };
    let err = aligner.align(&input).unwrap_err();
    assert!(matches!(err, AlignmentError::InvalidInput { .. }));
}

#[test]
fn transcript_longer_than_audio_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Segment);

    let input = AlignmentInput {
        samples: encode_frames(&[(0, 5)]),
        ..house_input()
    };
    let err = aligner.align(&input).unwrap_err();
    assert!(matches!(err, AlignmentError::InvalidInput { .. }));
}

#[test]
fn input_at_another_rate_is_resampled() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_model_files(dir.path());
    let aligner = build_aligner(dir.path(), StarFrequency::Segment);

    let samples = house_audio().into_iter().step_by(2).collect::<Vec<_>>();
    let input = AlignmentInput {
        sample_rate_hz: 8_000,
        samples,
        transcript: "Это мой дом.".to_string(),
    };
    let output = aligner.align(&input).expect("align resampled input");
    assert_eq!(output.words.len(), 3);
    assert_eq!(output.words[2].text, "дом.");
}
