use crate::allocator::{AllocatorError, FlushSink, ResourceAllocator};
use crate::assembly::{
    validate_and_locate, AppendOutcome, AssemblyError, Chunk, Fragment, ProtocolViolation,
    RecordAssembler, RecordKey, ResourceId,
};
use crate::config::{CorruptionPolicy, PipelineConfig};
use crate::quiescence::{QuiescenceError, SectionSink, SectionTracker};
use crate::ring::SpscRing;
use crate::sink::{BuiltRecord, RecordSink};
use crate::telemetry::PipelineMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use thiserror::Error;

/// One chunk arriving from the transport layer, addressed to a record.
///
/// Mirrors the ingestion boundary tuple: resource id, source index, chunk
/// bytes, final-for-source flag, section number, and record key, plus the
/// run id used for the stale-run guard.
#[derive(Debug)]
pub struct FragmentEnvelope {
    pub resource_id: ResourceId,
    pub record_key: RecordKey,
    pub section: u32,
    pub run_id: u32,
    pub source_index: u16,
    pub chunk_bytes: Vec<u8>,
    pub chunk_position: u32,
    pub chunk_total: u32,
    pub final_for_source: bool,
}

/// Faults escalated out of the worker loops.
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Allocator(#[from] AllocatorError),
}

impl PipelineError {
    /// Whether the supervising loop may discard the offending record and
    /// continue. A quiescence underflow never qualifies: it invalidates all
    /// future closeability decisions.
    fn discardable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Assembly(AssemblyError::Quiescence(QuiescenceError::Underflow {
                ..
            }))
        )
    }
}

struct WorkerShared {
    config: PipelineConfig,
    input: SpscRing<FragmentEnvelope>,
    completed: SpscRing<BuiltRecord>,
    credits: SpscRing<ResourceId>,
    assembler: RecordAssembler,
    allocator: ResourceAllocator,
    tracker: Arc<SectionTracker>,
    metrics: PipelineMetrics,
    stop: AtomicBool,
    ingest_done: AtomicBool,
    fatal: Mutex<Option<PipelineError>>,
}

impl WorkerShared {
    fn abort(&self, error: PipelineError) {
        let mut fatal = self.fatal.lock().unwrap();
        if fatal.is_none() {
            *fatal = Some(error);
        }
        self.stop.store(true, Ordering::Release);
    }

    fn aborted(&self) -> bool {
        self.fatal.lock().unwrap().is_some()
    }
}

/// The assembled pipeline: an ingest worker draining the fragment input
/// ring into the assembler, and a consumer worker draining validated
/// records into the configured sink and recycling their resources.
///
/// Workers run tight poll loops with a short sleep on an empty ring; there
/// is no async runtime and the rings never block. Stopping signals the
/// cancellation flag, lets both workers drain, then joins them.
pub struct EventPipeline {
    shared: Arc<WorkerShared>,
    record_sink: Option<Box<dyn RecordSink>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl EventPipeline {
    pub fn new(
        config: PipelineConfig,
        section_sink: Box<dyn SectionSink>,
        flush_sink: Box<dyn FlushSink>,
        record_sink: Box<dyn RecordSink>,
    ) -> Self {
        let tracker = Arc::new(SectionTracker::new(section_sink));
        let assembler =
            RecordAssembler::new(config.expected_sources, config.run_id, tracker.clone());
        let allocator = ResourceAllocator::new(
            config.resource_pool,
            config.packing,
            config.flush_age(),
            flush_sink,
        );
        let shared = Arc::new(WorkerShared {
            input: SpscRing::with_capacity(config.input_ring),
            completed: SpscRing::with_capacity(config.completion_ring),
            credits: SpscRing::with_capacity(config.resource_pool as usize),
            assembler,
            allocator,
            tracker,
            metrics: PipelineMetrics::new(),
            stop: AtomicBool::new(false),
            ingest_done: AtomicBool::new(false),
            fatal: Mutex::new(None),
            config,
        });
        Self {
            shared,
            record_sink: Some(record_sink),
            workers: Vec::new(),
        }
    }

    /// Spawns the ingest and consumer workers.
    pub fn start(&mut self) {
        let ingest_shared = self.shared.clone();
        let ingest = thread::Builder::new()
            .name("colligo_ingest".into())
            .spawn(move || ingest_loop(&ingest_shared))
            .expect("failed to spawn ingest worker");
        let consume_shared = self.shared.clone();
        let sink = self.record_sink.take().expect("pipeline already started");
        let consumer = thread::Builder::new()
            .name("colligo_consume".into())
            .spawn(move || consume_loop(&consume_shared, sink))
            .expect("failed to spawn consumer worker");
        self.workers.push(ingest);
        self.workers.push(consumer);
    }

    /// Signals cancellation, waits for both workers to drain and exit, and
    /// flushes any allocator operations still pending. Returns the first
    /// fatal fault, if any worker hit one.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        self.shared.stop.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.shared.allocator.flush();
        match self.shared.fatal.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Hands one envelope to the ingest worker. Returns the envelope back
    /// when the input ring is full so the coordinator can retry.
    pub fn submit(&self, envelope: FragmentEnvelope) -> Result<(), FragmentEnvelope> {
        self.shared.input.enqueue(envelope)
    }

    /// Coordinator-side resource acquisition: recycled ids first, then the
    /// free pool. `None` means the full budget is in flight.
    pub fn acquire_resource(&self) -> Option<ResourceId> {
        if let Some(recycled) = self.shared.credits.dequeue() {
            return Some(recycled);
        }
        match self.shared.allocator.acquire(Instant::now()) {
            Some(id) => Some(id),
            None => {
                self.shared.metrics.record_acquire_denied();
                None
            }
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.shared.metrics
    }

    pub fn tracker(&self) -> &SectionTracker {
        &self.shared.tracker
    }

    /// Counter, gauge, and depth lines for `/metrics`-style export.
    pub fn render_metrics(&self) -> String {
        let shared = &self.shared;
        let mut out = shared.metrics.snapshot().render_metrics();
        out.push_str(&format!(
            "ring_depth{{ring=\"input\"}} {}\nring_depth{{ring=\"completion\"}} {}\nsections_closed_total {}\nresource_ids_free {}\nresource_ids_live {}\nallocator_pending_ops {}\n",
            shared.input.len(),
            shared.completed.len(),
            shared.tracker.closed_total(),
            shared.allocator.free_len(),
            shared.allocator.live_len(),
            shared.allocator.pending_len(),
        ));
        out
    }
}

impl Drop for EventPipeline {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let _ = self.stop();
        }
    }
}

/// A fault bound to one envelope, with the resource to clean up when the
/// policy says discard.
struct EnvelopeFault {
    cleanup: Option<ResourceId>,
    error: PipelineError,
}

fn ingest_loop(shared: &WorkerShared) {
    let poll_sleep = shared.config.poll_sleep();
    loop {
        if shared.aborted() {
            break;
        }
        match shared.input.dequeue() {
            Some(envelope) => {
                shared.metrics.record_fragment();
                if let Err(fault) = handle_envelope(shared, envelope) {
                    escalate(shared, fault);
                }
            }
            None => {
                if shared.stop.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(poll_sleep);
            }
        }
    }
    shared.ingest_done.store(true, Ordering::Release);
}

fn handle_envelope(shared: &WorkerShared, envelope: FragmentEnvelope) -> Result<(), EnvelopeFault> {
    if envelope.run_id != shared.config.run_id {
        shared.metrics.record_stale_run();
        return Ok(());
    }
    let resource_id = envelope.resource_id;
    let chunk = Chunk::new(
        envelope.chunk_bytes,
        envelope.chunk_position,
        envelope.chunk_total,
    );
    let fragment = Fragment::single(envelope.source_index, chunk, envelope.final_for_source);
    if envelope.source_index == 0 {
        shared
            .assembler
            .start_record(resource_id, envelope.record_key, envelope.section, fragment)
            .map_err(|error| EnvelopeFault {
                cleanup: None,
                error: error.into(),
            })?;
        shared.metrics.record_started();
        let complete = shared
            .assembler
            .is_complete(resource_id)
            .map_err(|error| EnvelopeFault {
                cleanup: Some(resource_id),
                error: error.into(),
            })?;
        if complete {
            dispatch_complete(shared, resource_id)?;
        }
        return Ok(());
    }
    let outcome = shared
        .assembler
        .append_fragment(resource_id, fragment)
        .map_err(|error| EnvelopeFault {
            cleanup: cleanup_target(&error, resource_id),
            error: error.into(),
        })?;
    if outcome == AppendOutcome::Complete {
        dispatch_complete(shared, resource_id)?;
    }
    Ok(())
}

/// Only faults bound to a record still held by the assembler get a cleanup
/// target. Releasing on an unknown or duplicate id would hit the wrong
/// record, and a record already handed downstream belongs to the consumer.
fn cleanup_target(error: &AssemblyError, resource_id: ResourceId) -> Option<ResourceId> {
    match error {
        AssemblyError::Protocol(ProtocolViolation::FragmentAfterDispatch { .. }) => None,
        AssemblyError::Protocol(_) | AssemblyError::Validation(_) => Some(resource_id),
        _ => None,
    }
}

fn dispatch_complete(shared: &WorkerShared, resource_id: ResourceId) -> Result<(), EnvelopeFault> {
    let record = shared
        .assembler
        .take_complete(resource_id)
        .map_err(|error| EnvelopeFault {
            cleanup: None,
            error: error.into(),
        })?;
    let segments = validate_and_locate(&record).map_err(|error| EnvelopeFault {
        cleanup: Some(resource_id),
        error: error.into(),
    })?;
    shared.metrics.record_completed();
    let mut built = BuiltRecord::new(record, segments);
    let poll_sleep = shared.config.poll_sleep();
    loop {
        match shared.completed.enqueue(built) {
            Ok(()) => return Ok(()),
            Err(back) => {
                if shared.aborted() {
                    drop(back);
                    return Ok(());
                }
                built = back;
                thread::sleep(poll_sleep);
            }
        }
    }
}

fn escalate(shared: &WorkerShared, fault: EnvelopeFault) {
    let discard = shared.config.corruption_policy == CorruptionPolicy::Discard
        && fault.error.discardable();
    if !discard {
        shared.abort(fault.error);
        return;
    }
    if let Some(resource_id) = fault.cleanup {
        if let Ok(released) = shared.assembler.release_record(resource_id) {
            if let Err(error) =
                shared
                    .allocator
                    .release(resource_id, released.record_key, Instant::now())
            {
                shared.abort(error.into());
                return;
            }
        }
    }
    match &fault.error {
        PipelineError::Assembly(AssemblyError::Validation(_)) => {
            shared.metrics.record_validation_failure()
        }
        _ => shared.metrics.record_protocol_violation(),
    }
    shared.metrics.record_discarded();
}

fn consume_loop(shared: &WorkerShared, mut sink: Box<dyn RecordSink>) {
    let poll_sleep = shared.config.poll_sleep();
    loop {
        if shared.aborted() {
            break;
        }
        match shared.completed.dequeue() {
            Some(built) => {
                sink.consume(&built);
                if let Err(error) = release_consumed(shared, &built) {
                    shared.abort(error);
                    break;
                }
                shared.metrics.record_released();
            }
            None => {
                if shared.ingest_done.load(Ordering::Acquire) && shared.completed.is_empty() {
                    break;
                }
                thread::sleep(poll_sleep);
            }
        }
        if shared.allocator.flush_if_aged(Instant::now()) {
            shared.metrics.record_aged_flush();
        }
    }
}

fn release_consumed(shared: &WorkerShared, built: &BuiltRecord) -> Result<(), PipelineError> {
    let resource_id = built.record().resource_id();
    let released = shared.assembler.release_record(resource_id)?;
    let now = Instant::now();
    if shared.config.recycle_on_release {
        let recycled =
            shared
                .allocator
                .release_and_acquire(resource_id, released.record_key, now)?;
        // The credit ring is pool-sized, so every live id fits.
        let _ = shared.credits.enqueue(recycled);
    } else {
        shared
            .allocator
            .release(resource_id, released.record_key, now)?;
    }
    Ok(())
}
