//! Audio decoding, downmixing and resampling.

use std::path::Path;

use claxon::FlacReader;
use hound::{SampleFormat, WavReader};
use rubato::{FftFixedIn, Resampler};

use crate::error::AlignmentError;
use crate::types::Waveform;

const RESAMPLER_CHUNK_SIZE: usize = 1024;
const RESAMPLER_SUB_CHUNKS: usize = 2;

/// Load a WAV or FLAC file as mono f32 samples at `target_rate_hz`.
pub fn load_audio(path: impl AsRef<Path>, target_rate_hz: u32) -> Result<Waveform, AlignmentError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let (sample_rate_hz, channels, interleaved) = match extension.as_str() {
        "wav" | "wave" => read_wav(path)?,
        "flac" => read_flac(path)?,
        other => {
            return Err(AlignmentError::audio(
                path,
                format!("unsupported audio format '{other}' (expected wav or flac)"),
            ))
        }
    };

    let mono = downmix(&interleaved, channels);
    tracing::debug!(
        path = %path.display(),
        sample_rate_hz,
        channels,
        samples = mono.len(),
        "audio decoded"
    );

    let samples = if sample_rate_hz == target_rate_hz {
        mono
    } else {
        tracing::info!(
            from_hz = sample_rate_hz,
            to_hz = target_rate_hz,
            "resampling audio"
        );
        resample(&mono, sample_rate_hz, target_rate_hz)
            .map_err(|err| AlignmentError::audio(path, err))?
    };

    Ok(Waveform {
        sample_rate_hz: target_rate_hz,
        samples,
    })
}

fn read_wav(path: &Path) -> Result<(u32, usize, Vec<f32>), AlignmentError> {
    let mut reader = WavReader::open(path).map_err(|err| AlignmentError::audio(path, err))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AlignmentError::audio(path, "zero channels"));
    }

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<hound::Result<Vec<_>>>()
            .map_err(|err| AlignmentError::audio(path, err))?,
        SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as u32);
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<hound::Result<Vec<_>>>()
                .map_err(|err| AlignmentError::audio(path, err))?
        }
    };

    Ok((spec.sample_rate, spec.channels as usize, samples))
}

fn read_flac(path: &Path) -> Result<(u32, usize, Vec<f32>), AlignmentError> {
    let mut reader = FlacReader::open(path).map_err(|err| AlignmentError::audio(path, err))?;
    let streaminfo = reader.streaminfo();
    let channels = streaminfo.channels as usize;
    if channels == 0 {
        return Err(AlignmentError::audio(path, "zero channels"));
    }
    let scale = int_scale(streaminfo.bits_per_sample);

    let samples = reader
        .samples()
        .map(|s| s.map(|s| s as f32 / scale))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| AlignmentError::audio(path, err))?;

    Ok((streaminfo.sample_rate, channels, samples))
}

fn int_scale(bits_per_sample: u32) -> f32 {
    if bits_per_sample > 1 {
        ((1_i64 << (bits_per_sample - 1)) - 1) as f32
    } else {
        1.0
    }
}

/// Average interleaved channels into one. A trailing partial frame is dropped.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let inv_channels = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * inv_channels)
        .collect()
}

/// Offline FFT resampling of a whole mono signal.
///
/// The tail is zero-padded to fill the last chunk; the output is cut to
/// `round(len * to / from)` samples after skipping the resampler delay.
pub fn resample(samples: &[f32], from_rate_hz: u32, to_rate_hz: u32) -> Result<Vec<f32>, String> {
    if from_rate_hz == 0 || to_rate_hz == 0 {
        return Err(format!(
            "invalid resampling rates: {from_rate_hz} Hz -> {to_rate_hz} Hz"
        ));
    }
    if from_rate_hz == to_rate_hz || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate_hz as usize,
        to_rate_hz as usize,
        RESAMPLER_CHUNK_SIZE,
        RESAMPLER_SUB_CHUNKS,
        1,
    )
    .map_err(|err| err.to_string())?;

    let expected_len =
        (samples.len() as f64 * to_rate_hz as f64 / from_rate_hz as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected_len + delay + RESAMPLER_CHUNK_SIZE);

    let mut offset = 0;
    while output.len() < expected_len + delay {
        let mut chunk = vec![0.0f32; RESAMPLER_CHUNK_SIZE];
        if offset < samples.len() {
            let end = (offset + RESAMPLER_CHUNK_SIZE).min(samples.len());
            chunk[..end - offset].copy_from_slice(&samples[offset..end]);
        }
        offset += RESAMPLER_CHUNK_SIZE;

        let resampled = resampler
            .process(&[chunk], None)
            .map_err(|err| err.to_string())?;
        match resampled.into_iter().next() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(&channel),
            _ => return Err("resampler produced no output".to_string()),
        }
    }

    Ok(output
        .into_iter()
        .skip(delay)
        .take(expected_len)
        .collect())
}
