use crate::render::surface::{Color, Surface};
use crate::render::waveform::{self, ProgressStyle};
use crate::waveform::{extract_waveform, WaveformEnvelope, WaveformError, PLAYER_SAMPLES};

/// Envelope state held by one player instance.
#[derive(Debug)]
pub enum EnvelopeState {
    Ready(WaveformEnvelope),
    /// Extraction failed; playback still works, the view shows a placeholder
    Unavailable(String),
}

/// View state for a single clip player: envelope cache plus playback clock.
///
/// The envelope is computed once per instance and discarded with it.
pub struct WaveformPlayer {
    envelope: EnvelopeState,
    duration: f64,
    current_time: f64,
    style: ProgressStyle,
}

impl WaveformPlayer {
    /// Load the envelope for `source`; failures degrade to a placeholder.
    pub fn load(source: &str, duration: f64, style: ProgressStyle) -> Self {
        let envelope = match extract_waveform(source, PLAYER_SAMPLES) {
            Ok(env) => EnvelopeState::Ready(env),
            Err(e) => {
                log::warn!("Waveform unavailable for {}: {}", source, e);
                EnvelopeState::Unavailable(e.to_string())
            }
        };
        Self::with_envelope(envelope, duration, style)
    }

    pub fn from_result(
        result: Result<WaveformEnvelope, WaveformError>,
        duration: f64,
        style: ProgressStyle,
    ) -> Self {
        let envelope = match result {
            Ok(env) => EnvelopeState::Ready(env),
            Err(e) => EnvelopeState::Unavailable(e.to_string()),
        };
        Self::with_envelope(envelope, duration, style)
    }

    fn with_envelope(envelope: EnvelopeState, duration: f64, style: ProgressStyle) -> Self {
        Self {
            envelope,
            duration: if duration.is_finite() { duration.max(0.0) } else { 0.0 },
            current_time: 0.0,
            style,
        }
    }

    pub fn envelope(&self) -> &EnvelopeState {
        &self.envelope
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Playback clock update; called on every timeupdate tick.
    pub fn tick(&mut self, current_time: f64) {
        self.current_time = current_time.clamp(0.0, self.duration);
    }

    /// current time / duration, 0 when the duration is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Click-to-seek; returns the new playback time.
    pub fn seek_to_pointer(&mut self, px: f64, width: f64) -> f64 {
        if self.duration > 0.0 {
            self.current_time = waveform::seek_time(px, width, self.duration);
        }
        self.current_time
    }

    pub fn render(&self, surface: &mut Surface) {
        match &self.envelope {
            EnvelopeState::Ready(env) => {
                waveform::draw_progress(surface, env, self.progress(), &self.style);
            }
            EnvelopeState::Unavailable(_) => {
                let (w, h) = (surface.logical_width(), surface.logical_height());
                surface.clear();
                surface.fill_rect(0.0, 0.0, w, h, Color::WHITE, 1.0);
                surface.fill_rect(0.0, h / 2.0 - 1.0, w, 2.0, self.style.unplayed, 1.0);
            }
        }
    }
}

/// `mm:ss` for the time readout.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
