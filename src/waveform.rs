use rayon::prelude::*;
use thiserror::Error;

use crate::audio::buffer::SampleBuffer;
use crate::audio::decode::decode_bytes;
use crate::audio::error::DecodeError;
use crate::fetch::{fetch_bytes, FetchError};

/// Bucket count used by the playback view.
pub const PLAYER_SAMPLES: usize = 300;
/// Bucket count for generic previews.
pub const DEFAULT_SAMPLES: usize = 100;

#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("Waveform sample count must be at least 1")]
    InvalidSampleCount,

    #[error("Could not fetch audio for waveform: {0}")]
    Fetch(#[from] FetchError),

    #[error("Could not decode audio for waveform: {0}")]
    Decode(#[from] DecodeError),
}

/// Fixed-length RMS amplitude summary of channel 0.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformEnvelope(Vec<f32>);

impl WaveformEnvelope {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn peak(&self) -> f32 {
        self.0.iter().copied().fold(0.0f32, f32::max)
    }
}

/// Fetch `source` (URL or path), decode it and build an `samples`-bucket envelope.
pub fn extract_waveform(source: &str, samples: usize) -> Result<WaveformEnvelope, WaveformError> {
    if samples == 0 {
        return Err(WaveformError::InvalidSampleCount);
    }
    let bytes = fetch_bytes(source)?;
    envelope_from_bytes(bytes, samples)
}

pub fn envelope_from_bytes(bytes: Vec<u8>, samples: usize) -> Result<WaveformEnvelope, WaveformError> {
    if samples == 0 {
        return Err(WaveformError::InvalidSampleCount);
    }
    let buffer = decode_bytes(bytes, None)?;
    envelope_from_buffer(&buffer, samples)
}

/// Split channel 0 into `samples` blocks of `floor(F/N)` frames and take the
/// RMS of each.
///
/// Block `i` spans `[i*block, min(i*block + block, F))`; the trailing
/// `F - N*block` frames are not sampled. When `F < N` every block is widened to
/// one frame (clamped to the last) so short inputs still yield `samples`
/// finite values.
pub fn envelope_from_buffer(buffer: &SampleBuffer, samples: usize) -> Result<WaveformEnvelope, WaveformError> {
    if samples == 0 {
        return Err(WaveformError::InvalidSampleCount);
    }

    let data = buffer.channel(0);
    let frames = data.len();

    let values: Vec<f32> = (0..samples)
        .into_par_iter()
        .map(|i| {
            let (start, end) = block_bounds(i, samples, frames);
            let block = &data[start..end];
            let sum: f64 = block.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum / block.len() as f64).sqrt() as f32
        })
        .collect();

    log::debug!(
        "Waveform: {} frames -> {} buckets, peak {:.3}",
        frames,
        samples,
        values.iter().copied().fold(0.0f32, f32::max)
    );

    Ok(WaveformEnvelope(values))
}

fn block_bounds(index: usize, blocks: usize, frames: usize) -> (usize, usize) {
    let block = frames / blocks;
    if block == 0 {
        let start = ((index as u128 * frames as u128) / blocks as u128) as usize;
        let start = start.min(frames - 1);
        return (start, start + 1);
    }
    let start = index * block;
    (start, (start + block).min(frames))
}
