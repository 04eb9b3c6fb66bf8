use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use super::AnalyzerInitError;
use crate::audio::buffer::SampleBuffer;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a playback element, never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementId(u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Clock {
    /// Position accumulated while paused, in seconds
    offset: f64,
    started: Option<Instant>,
}

/// A playable clip: decoded audio plus a wall-clock playhead.
///
/// A media source can be attached to an element exactly once; the analysis
/// graph does this on creation and every later attach is refused.
#[derive(Debug)]
pub struct PlaybackElement {
    id: ElementId,
    buffer: Arc<SampleBuffer>,
    clock: Mutex<Clock>,
    source_attached: AtomicBool,
}

impl PlaybackElement {
    pub fn new(buffer: SampleBuffer) -> Self {
        Self {
            id: ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)),
            buffer: Arc::new(buffer),
            clock: Mutex::new(Clock::default()),
            source_attached: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration_seconds()
    }

    pub fn play(&self) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if clock.started.is_none() {
            clock.started = Some(Instant::now());
        }
    }

    pub fn pause(&self) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(started) = clock.started.take() {
            clock.offset += started.elapsed().as_secs_f64();
        }
    }

    pub fn seek(&self, seconds: f64) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        clock.offset = seconds.clamp(0.0, self.duration());
        if clock.started.is_some() {
            clock.started = Some(Instant::now());
        }
    }

    pub fn is_playing(&self) -> bool {
        self.clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .started
            .is_some()
    }

    pub fn current_time(&self) -> f64 {
        let clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        let running = clock.started.map_or(0.0, |s| s.elapsed().as_secs_f64());
        (clock.offset + running).min(self.duration())
    }

    pub fn has_media_source(&self) -> bool {
        self.source_attached.load(Ordering::Acquire)
    }

    /// Claim the element's single media-source slot.
    pub fn attach_media_source(&self) -> Result<(), AnalyzerInitError> {
        if self.source_attached.swap(true, Ordering::AcqRel) {
            return Err(AnalyzerInitError::SourceAlreadyAttached(self.id));
        }
        Ok(())
    }

    /// The `len` frames leading up to the playhead, down-mixed to mono.
    /// Positions before the start of the clip are zero.
    pub fn window_ending_at_playhead(&self, len: usize) -> Vec<f32> {
        let frames = self.buffer.frame_count();
        let rate = self.buffer.sample_rate_hz() as f64;
        let end = ((self.current_time() * rate) as usize).min(frames);
        let mut window = vec![0.0f32; len];

        let available = end.min(len);
        let start = end - available;
        let scale = 1.0 / self.buffer.channel_count() as f32;
        for plane in self.buffer.channels() {
            for (dst, &s) in window[len - available..].iter_mut().zip(&plane[start..end]) {
                *dst += s * scale;
            }
        }
        window
    }
}
