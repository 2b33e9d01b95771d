use crate::assembly::{RecordKey, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// One resource transition staged toward the upstream coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceOp {
    /// A fresh id was taken from the free pool.
    Request { resource_id: ResourceId },
    /// A consumed record's id returned to the free pool.
    Release {
        resource_id: ResourceId,
        record_key: RecordKey,
    },
    /// Release plus immediate re-request: the id recycles without a
    /// free-list round trip.
    ReleaseAndRequest {
        resource_id: ResourceId,
        record_key: RecordKey,
    },
}

/// Ordered burst of staged operations, flushed as one outbound unit.
///
/// `sequence` increases by one per flush so the transport side can detect
/// loss or reordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpBatch {
    sequence: u64,
    ops: Vec<ResourceOp>,
}

impl OpBatch {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn ops(&self) -> &[ResourceOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Transport boundary for flushed batches. Delivery is the transport's
/// problem, not the allocator's.
pub trait FlushSink: Send {
    fn dispatch(&mut self, batch: OpBatch);
}

/// Pool accounting faults.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorError {
    #[error("resource {resource_id} is not currently allocated")]
    NotLive { resource_id: ResourceId },
}

#[derive(Debug)]
struct AllocState {
    free: VecDeque<ResourceId>,
    live: HashSet<ResourceId>,
    pending: Vec<ResourceOp>,
    aged_since: Option<Instant>,
    next_sequence: u64,
}

/// Tracks the fixed pool of resource ids and batches their request/release
/// transitions into aggregated bursts, flushed when `packing` operations
/// accumulate or when the oldest pending operation exceeds `max_age`.
///
/// Batching amortizes per-operation control-plane overhead; the age-based
/// fallback bounds the latency of a lone operation that would otherwise
/// wait indefinitely for `packing` siblings.
///
/// The pending batch sits behind its own mutex, independent of the record
/// table, so a slow downstream flush never blocks fragment ingestion.
pub struct ResourceAllocator {
    capacity: usize,
    packing: usize,
    max_age: Duration,
    state: Mutex<AllocState>,
    sink: Mutex<Box<dyn FlushSink>>,
}

impl ResourceAllocator {
    pub fn new(
        pool_size: u16,
        packing: usize,
        max_age: Duration,
        sink: Box<dyn FlushSink>,
    ) -> Self {
        assert!(pool_size > 0, "resource pool must hold at least one id");
        assert!(packing > 0, "packing must be at least one operation");
        Self {
            capacity: pool_size as usize,
            packing,
            max_age,
            state: Mutex::new(AllocState {
                free: (0..pool_size).map(ResourceId::new).collect(),
                live: HashSet::new(),
                pending: Vec::new(),
                aged_since: None,
                next_sequence: 0,
            }),
            sink: Mutex::new(sink),
        }
    }

    /// Total pool size: the bound on simultaneously in-flight records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ids waiting in the free pool.
    pub fn free_len(&self) -> usize {
        self.state.lock().unwrap().free.len()
    }

    /// Ids currently bound to in-flight records.
    pub fn live_len(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    /// Operations staged but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Takes an id from the free pool, staging a request op. `None` when
    /// every id is in flight: the pool bound holds.
    pub fn acquire(&self, now: Instant) -> Option<ResourceId> {
        let (resource_id, ready) = {
            let mut state = self.state.lock().unwrap();
            let resource_id = state.free.pop_front()?;
            state.live.insert(resource_id);
            let ready = self.stage(&mut state, ResourceOp::Request { resource_id }, now);
            (resource_id, ready)
        };
        if let Some(batch) = ready {
            self.dispatch(batch);
        }
        Some(resource_id)
    }

    /// Returns a consumed id to the free pool, staging a release op.
    pub fn release(
        &self,
        resource_id: ResourceId,
        record_key: RecordKey,
        now: Instant,
    ) -> Result<(), AllocatorError> {
        let ready = {
            let mut state = self.state.lock().unwrap();
            if !state.live.remove(&resource_id) {
                return Err(AllocatorError::NotLive { resource_id });
            }
            state.free.push_back(resource_id);
            self.stage(
                &mut state,
                ResourceOp::Release {
                    resource_id,
                    record_key,
                },
                now,
            )
        };
        if let Some(batch) = ready {
            self.dispatch(batch);
        }
        Ok(())
    }

    /// Releases and immediately re-requests in one operation: the id never
    /// touches the free list and stays live for the next record.
    pub fn release_and_acquire(
        &self,
        resource_id: ResourceId,
        record_key: RecordKey,
        now: Instant,
    ) -> Result<ResourceId, AllocatorError> {
        let ready = {
            let mut state = self.state.lock().unwrap();
            if !state.live.contains(&resource_id) {
                return Err(AllocatorError::NotLive { resource_id });
            }
            self.stage(
                &mut state,
                ResourceOp::ReleaseAndRequest {
                    resource_id,
                    record_key,
                },
                now,
            )
        };
        if let Some(batch) = ready {
            self.dispatch(batch);
        }
        Ok(resource_id)
    }

    /// Flushes a non-empty pending batch whose oldest operation has aged
    /// past `max_age`. Returns whether anything was flushed.
    pub fn flush_if_aged(&self, now: Instant) -> bool {
        let batch = {
            let mut state = self.state.lock().unwrap();
            match state.aged_since {
                Some(since) if now.duration_since(since) >= self.max_age => {
                    Some(Self::take_batch(&mut state))
                }
                _ => None,
            }
        };
        match batch {
            Some(batch) => {
                self.dispatch(batch);
                true
            }
            None => false,
        }
    }

    /// Unconditionally hands any pending operations to the sink.
    pub fn flush(&self) {
        let batch = {
            let mut state = self.state.lock().unwrap();
            if state.pending.is_empty() {
                None
            } else {
                Some(Self::take_batch(&mut state))
            }
        };
        if let Some(batch) = batch {
            self.dispatch(batch);
        }
    }

    /// Stages one op. The first op into an empty batch (re)starts the age
    /// timer; hitting `packing` hands back a batch to dispatch once the
    /// state lock is gone.
    fn stage(&self, state: &mut AllocState, op: ResourceOp, now: Instant) -> Option<OpBatch> {
        state.pending.push(op);
        if state.pending.len() == 1 {
            state.aged_since = Some(now);
        }
        if state.pending.len() >= self.packing {
            Some(Self::take_batch(state))
        } else {
            None
        }
    }

    fn take_batch(state: &mut AllocState) -> OpBatch {
        let batch = OpBatch {
            sequence: state.next_sequence,
            ops: mem::take(&mut state.pending),
        };
        state.next_sequence += 1;
        state.aged_since = None;
        batch
    }

    fn dispatch(&self, batch: OpBatch) {
        if batch.is_empty() {
            return;
        }
        self.sink.lock().unwrap().dispatch(batch);
    }
}

/// Sink that collects dispatched batches in memory. Clones share the same
/// log so callers keep a handle after handing the sink over.
#[derive(Debug, Clone, Default)]
pub struct CollectingFlushSink {
    batches: Arc<Mutex<Vec<OpBatch>>>,
}

impl CollectingFlushSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<OpBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn total_ops(&self) -> usize {
        self.batches.lock().unwrap().iter().map(OpBatch::len).sum()
    }
}

impl FlushSink for CollectingFlushSink {
    fn dispatch(&mut self, batch: OpBatch) {
        self.batches.lock().unwrap().push(batch);
    }
}
