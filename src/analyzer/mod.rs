//! Live spectrum sampling of a playing element for level meters.
//!
//! Every element gets at most one [`graph::AnalysisGraph`] for its lifetime,
//! tracked by a [`graph::GraphRegistry`]. Starting analysis reuses that graph
//! and adds a tap; stopping removes the tap only, so playback keeps its output.

pub mod element;
pub mod graph;
pub mod spectrum;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use element::{ElementId, PlaybackElement};
use graph::{AnalysisGraph, GraphRegistry, TapId};
use spectrum::{Analyser, FFT_SIZE};

pub use spectrum::average_level;

/// One display frame at 60 Hz.
const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

#[derive(Debug, Error)]
pub enum AnalyzerInitError {
    #[error("A media source is already attached to {0}")]
    SourceAlreadyAttached(ElementId),

    #[error("Failed to spawn analyzer worker: {0}")]
    Worker(#[from] std::io::Error),
}

pub struct RealtimeAnalyzer {
    registry: Arc<GraphRegistry>,
}

impl RealtimeAnalyzer {
    pub fn new(registry: Arc<GraphRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<GraphRegistry> {
        &self.registry
    }

    /// Begin calling `on_update` with 128 byte bins once per frame.
    ///
    /// Never fails: if the graph cannot be set up the returned handle is inert
    /// and playback is left untouched.
    pub fn start<F>(&self, element: &Arc<PlaybackElement>, on_update: F) -> AnalyzerHandle
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        match self.try_start(element, on_update) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Realtime analysis unavailable for {}: {}", element.id(), e);
                AnalyzerHandle::inert()
            }
        }
    }

    fn try_start<F>(&self, element: &Arc<PlaybackElement>, mut on_update: F) -> Result<AnalyzerHandle, AnalyzerInitError>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let graph = self.registry.get_or_create(element)?;
        let tap = graph.connect_tap();

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let weak: Weak<PlaybackElement> = Arc::downgrade(element);
        let mut analyser = Analyser::new();

        let spawned = thread::Builder::new()
            .name(format!("analyzer-{}", element.id()))
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    let Some(element) = weak.upgrade() else { break };
                    let window = element.window_ending_at_playhead(FFT_SIZE);
                    drop(element);

                    let bins = analyser.byte_frequency_data(&window);
                    on_update(&bins);
                    thread::park_timeout(FRAME_INTERVAL);
                }
            });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                graph.disconnect_tap(tap);
                return Err(e.into());
            }
        };

        log::debug!("Analyzer started on {}", element.id());
        Ok(AnalyzerHandle {
            active: Some(Active {
                running,
                worker: Some(worker),
                graph,
                tap,
            }),
        })
    }
}

impl Default for RealtimeAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(GraphRegistry::new()))
    }
}

struct Active {
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    graph: Arc<AnalysisGraph>,
    tap: TapId,
}

/// Cancellation handle returned by [`RealtimeAnalyzer::start`].
///
/// Dropping it stops the analysis.
pub struct AnalyzerHandle {
    active: Option<Active>,
}

impl AnalyzerHandle {
    /// A handle that was never running; `stop` is a no-op.
    pub fn inert() -> Self {
        Self { active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Clear the running flag, cancel the pending frame, wait for the worker
    /// and detach the tap. Idempotent.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.running.store(false, Ordering::Release);
        if let Some(worker) = active.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                log::warn!("Analyzer worker panicked");
            }
        }
        active.graph.disconnect_tap(active.tap);
        log::debug!("Analyzer stopped on {}", active.graph.element());
    }
}

impl Drop for AnalyzerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
