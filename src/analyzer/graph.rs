use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::element::{ElementId, PlaybackElement};
use super::AnalyzerInitError;

/// Identifies one analysis tap inside a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TapId(u64);

/// The persistent processing graph of one element: media source node wired to
/// the output, plus any number of short-lived analysis taps.
#[derive(Debug)]
pub struct AnalysisGraph {
    element: ElementId,
    output_connected: AtomicBool,
    taps: Mutex<HashSet<TapId>>,
    next_tap: AtomicU64,
}

impl AnalysisGraph {
    /// Build the graph, claiming the element's media source.
    pub fn create(element: &PlaybackElement) -> Result<Self, AnalyzerInitError> {
        element.attach_media_source()?;
        log::debug!("Analysis graph created for {}", element.id());
        Ok(Self {
            element: element.id(),
            output_connected: AtomicBool::new(true),
            taps: Mutex::new(HashSet::new()),
            next_tap: AtomicU64::new(0),
        })
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Whether the source still reaches the output (playback stays audible).
    pub fn output_connected(&self) -> bool {
        self.output_connected.load(Ordering::Acquire)
    }

    pub fn connect_tap(&self) -> TapId {
        let tap = TapId(self.next_tap.fetch_add(1, Ordering::Relaxed));
        self.taps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tap);
        tap
    }

    /// Returns false if the tap was already gone.
    pub fn disconnect_tap(&self, tap: TapId) -> bool {
        self.taps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tap)
    }

    pub fn tap_count(&self) -> usize {
        self.taps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct Entry {
    element: Weak<PlaybackElement>,
    graph: Arc<AnalysisGraph>,
}

/// Side table from element identity to its graph.
///
/// Holds elements weakly. Entries go away through [`GraphRegistry::release`]
/// when the host discards an element, or [`GraphRegistry::prune`] for
/// elements that were dropped without an explicit release.
#[derive(Default)]
pub struct GraphRegistry {
    entries: Mutex<HashMap<ElementId, Entry>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing graph for `element`, or a newly created one.
    pub fn get_or_create(&self, element: &Arc<PlaybackElement>) -> Result<Arc<AnalysisGraph>, AnalyzerInitError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(&element.id()) {
            if entry.element.strong_count() > 0 {
                return Ok(Arc::clone(&entry.graph));
            }
        }

        let graph = Arc::new(AnalysisGraph::create(element)?);
        entries.insert(
            element.id(),
            Entry {
                element: Arc::downgrade(element),
                graph: Arc::clone(&graph),
            },
        );
        Ok(graph)
    }

    pub fn get(&self, id: ElementId) -> Option<Arc<AnalysisGraph>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|e| Arc::clone(&e.graph))
    }

    /// Forget the graph of a discarded element.
    pub fn release(&self, id: ElementId) -> Option<Arc<AnalysisGraph>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .map(|e| e.graph)
    }

    /// Drop entries whose element no longer exists. Returns how many went.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.element.strong_count() > 0);
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Pruned {} analysis graph(s)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
