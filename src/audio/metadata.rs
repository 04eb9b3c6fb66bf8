use serde::{Deserialize, Serialize};

use super::buffer::SampleBuffer;
use super::decode::decode_bytes;
use super::error::DecodeError;

/// Floor of the loudness scale; silence and anything quieter land here.
pub const MIN_LEVEL_DB: f64 = -60.0;
pub const MAX_LEVEL_DB: f64 = 0.0;

/// Acoustic attributes stored alongside each file and version record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub duration_seconds: f64,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    /// Pooled RMS level in dBFS, clamped to [-60, 0].
    ///
    /// This is a rough loudness figure for sorting and filtering clips, not an
    /// EBU R128 / LUFS measurement.
    pub average_level_db: f64,
}

pub fn extract(buffer: &SampleBuffer) -> AudioMetadata {
    AudioMetadata {
        duration_seconds: buffer.duration_seconds(),
        sample_rate_hz: buffer.sample_rate_hz(),
        channel_count: buffer.channel_count().min(u16::MAX as usize) as u16,
        average_level_db: average_level_db(buffer),
    }
}

/// Decode `bytes` and extract metadata in one step.
pub fn extract_from_bytes(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<AudioMetadata, DecodeError> {
    let buffer = decode_bytes(bytes, extension_hint)?;
    Ok(extract(&buffer))
}

/// RMS over every sample of every channel pooled together, in dB.
pub fn average_level_db(buffer: &SampleBuffer) -> f64 {
    let mut sum_squares = 0.0f64;
    let mut count = 0usize;
    for plane in buffer.channels() {
        sum_squares += plane.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
        count += plane.len();
    }

    let rms = (sum_squares / count as f64).sqrt();
    let db = if rms > 0.0 { 20.0 * rms.log10() } else { MIN_LEVEL_DB };
    db.clamp(MIN_LEVEL_DB, MAX_LEVEL_DB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_minus_sixty() {
        let buf = SampleBuffer::new(vec![vec![0.0; 1000], vec![0.0; 1000]], 8000).unwrap();
        assert_eq!(average_level_db(&buf), -60.0);
    }

    #[test]
    fn full_scale_square_is_zero_db() {
        let square: Vec<f32> = (0..1000).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let buf = SampleBuffer::new(vec![square], 8000).unwrap();
        assert!(average_level_db(&buf).abs() < 1e-9);
    }

    #[test]
    fn over_full_scale_is_clamped() {
        let buf = SampleBuffer::new(vec![vec![4.0; 100]], 8000).unwrap();
        assert_eq!(average_level_db(&buf), 0.0);
    }

    #[test]
    fn very_quiet_signal_is_clamped_to_floor() {
        let buf = SampleBuffer::new(vec![vec![1e-6; 100]], 8000).unwrap();
        assert_eq!(average_level_db(&buf), -60.0);
    }

    #[test]
    fn level_pools_channels_instead_of_averaging_them() {
        // One channel at 0.5 and one silent: pooled RMS = sqrt(0.25 / 2)
        let buf = SampleBuffer::new(vec![vec![0.5; 100], vec![0.0; 100]], 8000).unwrap();
        let expected = 20.0 * (0.125f64).sqrt().log10();
        assert!((average_level_db(&buf) - expected).abs() < 1e-9);
    }

    #[test]
    fn level_stays_in_range_for_arbitrary_signals() {
        for amp in [0.0f32, 0.001, 0.01, 0.3, 0.99, 1.0, 3.0] {
            let plane: Vec<f32> = (0..500).map(|i| amp * ((i as f32) * 0.37).sin()).collect();
            let buf = SampleBuffer::new(vec![plane.clone(), plane], 16000).unwrap();
            let db = average_level_db(&buf);
            assert!((-60.0..=0.0).contains(&db), "amp {amp} gave {db}");
        }
    }

    #[test]
    fn extract_fills_every_field() {
        let buf = SampleBuffer::new(vec![vec![0.1; 4410], vec![0.1; 4410]], 44100).unwrap();
        let meta = extract(&buf);
        assert!((meta.duration_seconds - 0.1).abs() < 1e-12);
        assert_eq!(meta.sample_rate_hz, 44100);
        assert_eq!(meta.channel_count, 2);
        assert!((meta.average_level_db - (-20.0)).abs() < 1e-4);
    }

    #[test]
    fn extract_from_garbage_fails() {
        assert!(extract_from_bytes(b"nope".to_vec(), None).is_err());
    }
}
