use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Receives the one-shot notification for each closed section.
pub trait SectionSink: Send {
    fn section_closed(&mut self, section: u32);
}

impl<F: FnMut(u32) + Send> SectionSink for F {
    fn section_closed(&mut self, section: u32) {
        self(section);
    }
}

/// Fatal accounting faults in the section tracker.
///
/// An underflow invalidates every future closeability decision, so callers
/// must abort the run rather than continue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QuiescenceError {
    #[error("section {section} released more records than it started")]
    Underflow { section: u32 },
}

#[derive(Debug, Default)]
struct TrackerState {
    live: BTreeMap<u32, u64>,
    max_started: Option<u32>,
    closed_total: u64,
}

impl TrackerState {
    /// A section is closeable once drained and provably final: zero live
    /// records and a strictly later section already started.
    fn drain_closeable(&mut self) -> Vec<u32> {
        let Some(max) = self.max_started else {
            return Vec::new();
        };
        let closeable: Vec<u32> = self
            .live
            .iter()
            .take_while(|(section, _)| **section < max)
            .filter(|(_, count)| **count == 0)
            .map(|(section, _)| *section)
            .collect();
        for section in &closeable {
            self.live.remove(section);
        }
        self.closed_total += closeable.len() as u64;
        closeable
    }
}

/// Per-section in-flight accounting with exactly-once close notification.
///
/// Each open section moves Open (live > 0) → Drained (live == 0, not yet
/// provably final) → Closed (emitted, removed); no section is revisited after
/// closing. Relies on seed fragments carrying non-decreasing section numbers
/// — a precondition of the upstream coordinator, not something enforced here.
///
/// `record_started` and `record_released` may be called from different
/// threads; the counts sit behind one mutex.
pub struct SectionTracker {
    state: Mutex<TrackerState>,
    sink: Mutex<Box<dyn SectionSink>>,
}

impl SectionTracker {
    pub fn new(sink: Box<dyn SectionSink>) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            sink: Mutex::new(sink),
        }
    }

    /// Accounts one record opened in `section`. Advancing the running
    /// maximum can retroactively prove an older drained section final, so
    /// closeability is re-evaluated here as well.
    pub fn record_started(&self, section: u32) {
        let closed = {
            let mut state = self.state.lock().unwrap();
            *state.live.entry(section).or_insert(0) += 1;
            match state.max_started {
                Some(max) if max >= section => {}
                _ => state.max_started = Some(section),
            }
            state.drain_closeable()
        };
        self.emit(closed);
    }

    /// Accounts one record fully consumed and released from `section`.
    pub fn record_released(&self, section: u32) -> Result<(), QuiescenceError> {
        let closed = {
            let mut state = self.state.lock().unwrap();
            let count = state
                .live
                .get_mut(&section)
                .filter(|count| **count > 0)
                .ok_or(QuiescenceError::Underflow { section })?;
            *count -= 1;
            state.drain_closeable()
        };
        self.emit(closed);
        Ok(())
    }

    /// Live record count for a tracked section, if still open or drained.
    pub fn live_count(&self, section: u32) -> Option<u64> {
        self.state.lock().unwrap().live.get(&section).copied()
    }

    /// Highest section number seen at the seed boundary.
    pub fn max_started(&self) -> Option<u32> {
        self.state.lock().unwrap().max_started
    }

    /// Sections closed since construction.
    pub fn closed_total(&self) -> u64 {
        self.state.lock().unwrap().closed_total
    }

    fn emit(&self, closed: Vec<u32>) {
        if closed.is_empty() {
            return;
        }
        let mut sink = self.sink.lock().unwrap();
        for section in closed {
            sink.section_closed(section);
        }
    }
}

/// Sink that records closed sections in memory, in emission order. Clones
/// share the same log so callers keep a handle after handing the sink over.
#[derive(Debug, Clone, Default)]
pub struct CollectingSectionSink {
    closed: Arc<Mutex<Vec<u32>>>,
}

impl CollectingSectionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closed(&self) -> Vec<u32> {
        self.closed.lock().unwrap().clone()
    }
}

impl SectionSink for CollectingSectionSink {
    fn section_closed(&mut self, section: u32) {
        self.closed.lock().unwrap().push(section);
    }
}
