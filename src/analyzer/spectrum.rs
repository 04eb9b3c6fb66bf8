use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;
pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Byte-valued magnitude spectrum with temporal smoothing between frames.
///
/// Each call windows the input (Blackman), takes the FFT, normalizes the
/// magnitudes by the FFT size, blends them with the previous frame and maps
/// decibels in `[MIN_DECIBELS, MAX_DECIBELS]` linearly onto `0..=255`.
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl Analyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
            window: blackman_window(FFT_SIZE),
            smoothed: vec![0.0; BIN_COUNT],
            scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
        }
    }

    /// `samples` shorter than the FFT size are zero-padded at the front;
    /// longer input uses its last `FFT_SIZE` samples.
    pub fn byte_frequency_data(&mut self, samples: &[f32]) -> Vec<u8> {
        let tail = &samples[samples.len().saturating_sub(FFT_SIZE)..];
        let pad = FFT_SIZE - tail.len();

        self.scratch.fill(Complex::new(0.0, 0.0));
        for (i, &s) in tail.iter().enumerate() {
            self.scratch[pad + i] = Complex::new(s * self.window[pad + i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        self.smoothed
            .iter_mut()
            .zip(&self.scratch[..BIN_COUNT])
            .map(|(prev, c)| {
                let magnitude = c.norm() / FFT_SIZE as f32;
                *prev = SMOOTHING_TIME_CONSTANT * *prev + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
                if *prev <= 0.0 {
                    return 0;
                }
                let db = 20.0 * prev.log10();
                (255.0 * (db - MIN_DECIBELS) / range).clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new()
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / size as f32;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

/// Mean of a byte spectrum, 0 for an empty one.
pub fn average_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    bins.iter().map(|&b| b as f32).sum::<f32>() / bins.len() as f32
}
