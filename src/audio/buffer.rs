use super::error::DecodeError;

/// Decoded audio: one plane of `f32` samples per channel plus the source rate.
///
/// A buffer always holds at least one channel and one frame, and every channel
/// has the same length. It is produced fresh by the decoder and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate_hz: u32,
}

impl SampleBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate_hz: u32) -> Result<Self, DecodeError> {
        if sample_rate_hz == 0 {
            return Err(DecodeError::InvalidLayout("sample rate must be positive".into()));
        }
        let Some(first) = channels.first() else {
            return Err(DecodeError::InvalidLayout("no channels".into()));
        };
        let frames = first.len();
        if let Some(bad) = channels.iter().position(|c| c.len() != frames) {
            return Err(DecodeError::InvalidLayout(format!(
                "channel {} has {} frames, expected {}",
                bad,
                channels[bad].len(),
                frames
            )));
        }
        if frames == 0 {
            return Err(DecodeError::Empty);
        }
        Ok(Self {
            channels,
            sample_rate_hz,
        })
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels[0].len()
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate_hz as f64
    }
}
