use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, ValueEnum};
use ctc_forced_aligner::audio::load_audio;
use ctc_forced_aligner::hub::{ModelFiles, DEFAULT_MODEL_ID};
use ctc_forced_aligner::output::{to_json_pretty, write_word_spans};
use ctc_forced_aligner::text::read_transcript;
use ctc_forced_aligner::{
    AlignerConfig, AlignmentInput, ComputeDevice, ForcedAlignerBuilder, Precision, SplitSize,
    StarFrequency,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT_FILE: &str = "alignment_results.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeviceChoice {
    /// CUDA when available, CPU otherwise.
    Auto,
    Cpu,
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PrecisionChoice {
    /// f16 on CUDA, f32 on CPU.
    Auto,
    F32,
    F16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SplitChoice {
    Sentence,
    Word,
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StarChoice {
    Segment,
    Edges,
}

#[derive(Debug, Parser)]
#[command(name = "ctc-align")]
#[command(about = "Align a transcript to audio and write word timestamps as JSON")]
struct Args {
    /// WAV or FLAC recording.
    #[arg(long, env = "CTC_ALIGN_AUDIO")]
    audio: PathBuf,
    /// UTF-8 transcript; lines are joined with spaces.
    #[arg(long, env = "CTC_ALIGN_TEXT")]
    text: PathBuf,
    /// Defaults to `alignment_results.json` next to the audio file.
    #[arg(long, env = "CTC_ALIGN_OUT")]
    out: Option<PathBuf>,
    /// ISO-639-3 language code.
    #[arg(long, env = "CTC_ALIGN_LANGUAGE", default_value = "rus")]
    language: String,
    #[arg(long, env = "CTC_ALIGN_DEVICE", value_enum, default_value_t = DeviceChoice::Auto)]
    device: DeviceChoice,
    #[arg(long, env = "CTC_ALIGN_CUDA_ORDINAL", default_value_t = 0)]
    cuda_ordinal: usize,
    #[arg(long, env = "CTC_ALIGN_PRECISION", value_enum, default_value_t = PrecisionChoice::Auto)]
    precision: PrecisionChoice,
    #[arg(long, env = "CTC_ALIGN_BATCH_SIZE", default_value_t = 16)]
    batch_size: usize,
    #[arg(long, env = "CTC_ALIGN_WINDOW_SECS", default_value_t = 30)]
    window_secs: u32,
    #[arg(long, env = "CTC_ALIGN_CONTEXT_SECS", default_value_t = 2)]
    context_secs: u32,
    /// Normalize each window to zero mean and unit variance before inference.
    #[arg(long, env = "CTC_ALIGN_NORMALIZE_AUDIO")]
    normalize_audio: bool,
    /// Local directory with model.safetensors, config.json and vocab.json.
    /// Takes priority over `--model-id`.
    #[arg(long, env = "CTC_ALIGN_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Hugging Face model id, used when no model directory is given.
    #[arg(long, env = "CTC_ALIGN_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    model_id: String,
    /// Align the normalized transcript without transliteration.
    #[arg(long, env = "CTC_ALIGN_NO_ROMANIZE")]
    no_romanize: bool,
    #[arg(long, env = "CTC_ALIGN_SPLIT_SIZE", value_enum, default_value_t = SplitChoice::Word)]
    split_size: SplitChoice,
    #[arg(long, env = "CTC_ALIGN_STAR_FREQUENCY", value_enum, default_value_t = StarChoice::Segment)]
    star_frequency: StarChoice,
    /// Gaps between words shorter than this many seconds are closed.
    #[arg(long, env = "CTC_ALIGN_MERGE_THRESHOLD", default_value_t = 0.0)]
    merge_threshold: f64,
    /// TSV table (`source<TAB>latin`) extending the built-in romanization.
    #[arg(long, env = "CTC_ALIGN_ROMANIZATION_TABLE")]
    romanization_table: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(message) = run() {
        eprintln!("error: {message}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args = Args::parse();
    if args.batch_size == 0 {
        return Err("--batch-size must be >= 1.".to_string());
    }
    if args.window_secs == 0 {
        return Err("--window-secs must be >= 1.".to_string());
    }

    let files = resolve_model_files(&args)?;
    let config = aligner_config(&args, &files);
    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| default_out_path(&args.audio));

    let started = Instant::now();
    let aligner = ForcedAlignerBuilder::new(config)
        .build()
        .map_err(|e| format!("failed to build aligner: {e}"))?;
    tracing::info!(
        device = %aligner.device_label(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "aligner ready"
    );

    let transcript = read_transcript(&args.text).map_err(|e| e.to_string())?;
    let waveform =
        load_audio(&args.audio, aligner.expected_sample_rate_hz()).map_err(|e| e.to_string())?;
    tracing::info!(
        audio = %args.audio.display(),
        duration_ms = waveform.duration_ms(),
        "audio loaded"
    );

    let output = aligner
        .align(&AlignmentInput {
            sample_rate_hz: waveform.sample_rate_hz,
            samples: waveform.samples,
            transcript,
        })
        .map_err(|e| format!("alignment failed: {e}"))?;

    let json = to_json_pretty(&output.words).map_err(|e| e.to_string())?;
    println!("{json}");
    write_word_spans(&out_path, &output.words).map_err(|e| e.to_string())?;
    tracing::info!(path = %out_path.display(), "results saved");
    Ok(())
}

fn resolve_model_files(args: &Args) -> Result<ModelFiles, String> {
    if let Some(dir) = &args.model_dir {
        if !dir.is_dir() {
            return Err(format!("model directory not found: {}", dir.display()));
        }
        return Ok(ModelFiles::from_dir(dir));
    }
    fetch_model_files(&args.model_id)
}

#[cfg(feature = "hub")]
fn fetch_model_files(model_id: &str) -> Result<ModelFiles, String> {
    ctc_forced_aligner::hub::fetch_model(model_id).map_err(|e| e.to_string())
}

#[cfg(not(feature = "hub"))]
fn fetch_model_files(model_id: &str) -> Result<ModelFiles, String> {
    Err(format!(
        "cannot download '{model_id}': built without the `hub` feature; pass --model-dir"
    ))
}

fn aligner_config(args: &Args, files: &ModelFiles) -> AlignerConfig {
    let mut config = files.aligner_config();
    config.device = match args.device {
        DeviceChoice::Auto => ComputeDevice::Auto,
        DeviceChoice::Cpu => ComputeDevice::Cpu,
        DeviceChoice::Cuda => ComputeDevice::Cuda(args.cuda_ordinal),
    };
    config.precision = match args.precision {
        PrecisionChoice::Auto => Precision::Auto,
        PrecisionChoice::F32 => Precision::F32,
        PrecisionChoice::F16 => Precision::F16,
    };
    config.emission.batch_size = args.batch_size;
    config.emission.window_secs = args.window_secs;
    config.emission.context_secs = args.context_secs;
    config.emission.normalize_audio = args.normalize_audio;
    config.text.language = args.language.clone();
    config.text.romanize = !args.no_romanize;
    config.text.split_size = match args.split_size {
        SplitChoice::Sentence => SplitSize::Sentence,
        SplitChoice::Word => SplitSize::Word,
        SplitChoice::Char => SplitSize::Char,
    };
    config.text.star_frequency = match args.star_frequency {
        StarChoice::Segment => StarFrequency::Segment,
        StarChoice::Edges => StarFrequency::Edges,
    };
    config.text.romanization_table = args.romanization_table.clone();
    config.merge_threshold_secs = args.merge_threshold;
    config
}

fn default_out_path(audio: &Path) -> PathBuf {
    audio
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(DEFAULT_OUTPUT_FILE)
}
