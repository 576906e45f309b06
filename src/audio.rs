//! Decoding of WAV and FLAC files into the canonical [`Waveform`].
//!
//! Resampling is out of scope: files must already be 16 kHz. Multi-channel
//! input is averaged down to mono.

use std::path::Path;

use claxon::FlacReader;
use hound::{SampleFormat, WavReader};

use crate::error::DetectorError;
use crate::types::Waveform;

pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["wav", "flac"];

pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

pub fn load_waveform(path: &Path) -> Result<Waveform, DetectorError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let (sample_rate_hz, mono) = match ext.as_deref() {
        Some("wav") => read_wav_mono(path)?,
        Some("flac") => read_flac_mono(path)?,
        _ => {
            return Err(DetectorError::invalid_input(format!(
                "unsupported audio file '{}': expected .wav or .flac",
                path.display()
            )))
        }
    };
    Waveform::from_mono(sample_rate_hz, mono).map_err(|err| match err {
        DetectorError::InvalidInput { message } => {
            DetectorError::invalid_input(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

fn read_wav_mono(path: &Path) -> Result<(u32, Vec<f32>), DetectorError> {
    let mut reader = WavReader::open(path).map_err(|err| {
        DetectorError::invalid_input(format!("failed to decode WAV '{}': {err}", path.display()))
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(DetectorError::invalid_input(format!(
            "WAV has zero channels: {}",
            path.display()
        )));
    }
    let read_err = |err: hound::Error| {
        DetectorError::invalid_input(format!(
            "failed reading sample from '{}': {err}",
            path.display()
        ))
    };

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(read_err)?,
        SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as i32);
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(read_err)?
        }
    };
    Ok((spec.sample_rate, downmix(&interleaved, channels)))
}

fn read_flac_mono(path: &Path) -> Result<(u32, Vec<f32>), DetectorError> {
    let mut reader = FlacReader::open(path).map_err(|err| {
        DetectorError::invalid_input(format!("failed to decode FLAC '{}': {err}", path.display()))
    })?;
    let streaminfo = reader.streaminfo();
    let channels = streaminfo.channels as usize;
    let scale = int_scale(streaminfo.bits_per_sample as i32);
    let sample_rate_hz = streaminfo.sample_rate;
    if channels == 0 {
        return Err(DetectorError::invalid_input(format!(
            "FLAC has zero channels: {}",
            path.display()
        )));
    }

    let mut interleaved = Vec::new();
    for sample in reader.samples() {
        let sample = sample.map_err(|err| {
            DetectorError::invalid_input(format!(
                "failed reading sample from '{}': {err}",
                path.display()
            ))
        })?;
        interleaved.push(sample as f32 / scale);
    }
    Ok((sample_rate_hz, downmix(&interleaved, channels)))
}

fn int_scale(bits_per_sample: i32) -> f32 {
    if bits_per_sample > 1 {
        ((1_i64 << (bits_per_sample - 1)) - 1) as f32
    } else {
        1.0
    }
}

/// Averages interleaved frames; a trailing partial frame is dropped.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
