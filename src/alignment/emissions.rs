use std::borrow::Cow;

use crate::config::EmissionConfig;
use crate::error::AlignmentError;
use crate::pipeline::traits::RuntimeBackend;
use crate::types::Emissions;

/// Run the acoustic model over overlapping windows and stitch the frames.
///
/// The signal is cut into `window_secs` windows with `context_secs` of
/// neighbouring audio on each side. Context frames are dropped again after
/// inference, as are the frames produced by the zero padding at the end.
/// A `<star>` column of zeros is appended to every row.
pub fn generate_emissions(
    backend: &dyn RuntimeBackend,
    samples: &[f32],
    sample_rate_hz: u32,
    frame_stride_ms: f64,
    config: &EmissionConfig,
) -> Result<Emissions, AlignmentError> {
    if samples.is_empty() {
        return Err(AlignmentError::invalid_input("empty audio"));
    }
    if config.batch_size == 0 {
        return Err(AlignmentError::invalid_input("batch size must be positive"));
    }
    if config.window_secs == 0 {
        return Err(AlignmentError::invalid_input("window length must be positive"));
    }
    if sample_rate_hz == 0 || !(frame_stride_ms > 0.0) {
        return Err(AlignmentError::invalid_input(format!(
            "invalid frame geometry: {sample_rate_hz} Hz, {frame_stride_ms} ms stride"
        )));
    }

    let rate = sample_rate_hz as usize;
    let context = config.context_secs as usize * rate;
    let window = config.window_secs as usize * rate;
    let n = samples.len();
    let extension = n.div_ceil(window) * window - n;

    let mut padded = Vec::with_capacity(n + 2 * context + extension);
    padded.resize(context, 0.0);
    padded.extend_from_slice(samples);
    padded.resize(n + 2 * context + extension, 0.0);

    let span = window + 2 * context;
    let num_windows = (n + extension) / window;
    let window_starts = (0..num_windows).map(|i| i * window).collect::<Vec<_>>();

    let context_frames = (config.context_secs as f64 * 1000.0 / frame_stride_ms) as usize;
    let extension_frames =
        (extension as f64 / sample_rate_hz as f64 * (1000.0 / frame_stride_ms)) as usize;
    tracing::debug!(
        windows = num_windows,
        batch_size = config.batch_size,
        context_frames,
        extension_frames,
        "generating emissions"
    );

    let mut log_probs: Vec<Vec<f32>> = Vec::new();
    let mut width: Option<usize> = None;
    for batch in window_starts.chunks(config.batch_size) {
        let chunks = batch
            .iter()
            .map(|&start| {
                let chunk = &padded[start..start + span];
                if config.normalize_audio {
                    Cow::Owned(normalize_audio(chunk))
                } else {
                    Cow::Borrowed(chunk)
                }
            })
            .collect::<Vec<_>>();
        let views = chunks.iter().map(AsRef::as_ref).collect::<Vec<_>>();
        let outputs = backend.infer(&views)?;
        if outputs.len() != views.len() {
            return Err(AlignmentError::runtime(
                "generate emissions",
                format!("backend returned {} outputs for {} windows", outputs.len(), views.len()),
            ));
        }
        for frames in outputs {
            for row in drop_context(frames, context_frames)? {
                let expected = *width.get_or_insert(row.len());
                if row.len() != expected {
                    return Err(AlignmentError::runtime(
                        "generate emissions",
                        format!("emission width changed from {expected} to {}", row.len()),
                    ));
                }
                log_probs.push(row);
            }
        }
    }

    log_probs.truncate(log_probs.len().saturating_sub(extension_frames));
    if log_probs.is_empty() {
        return Err(AlignmentError::runtime(
            "generate emissions",
            "no frames left after trimming",
        ));
    }
    for row in &mut log_probs {
        row.push(0.0);
    }

    let stride_ms = (n as f64 * 1000.0 / log_probs.len() as f64 / sample_rate_hz as f64).ceil() as u32;
    tracing::debug!(frames = log_probs.len(), stride_ms, "emissions ready");
    Ok(Emissions {
        log_probs,
        stride_ms,
    })
}

/// Drop `context_frames` leading and `context_frames - 1` trailing frames.
fn drop_context(
    mut frames: Vec<Vec<f32>>,
    context_frames: usize,
) -> Result<Vec<Vec<f32>>, AlignmentError> {
    if context_frames == 0 {
        return Ok(frames);
    }
    let trailing = context_frames - 1;
    if frames.len() < context_frames + trailing {
        return Err(AlignmentError::runtime(
            "generate emissions",
            format!(
                "window produced {} frames, fewer than its {} context frames",
                frames.len(),
                context_frames + trailing
            ),
        ));
    }
    frames.truncate(frames.len() - trailing);
    frames.drain(..context_frames);
    Ok(frames)
}

/// Zero mean, unit variance.
fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = var.sqrt().max(1e-7);
    samples
        .iter()
        .map(|&x| ((x as f64 - mean) / std) as f32)
        .collect()
}
