use super::payload::ValidationError;
use super::record::{Fragment, ProtocolViolation, Record, RecordKey, ResourceId};
use crate::quiescence::{QuiescenceError, SectionTracker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Typed failures surfaced by the assembly table and payload validation.
///
/// All are local, synchronous, and recoverable by the caller; nothing is
/// retried internally. Protocol and validation faults escalate to the
/// supervising loop, which discards the record or aborts the cycle
/// according to its configured tolerance. A quiescence underflow is always
/// fatal to the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("resource {resource_id} already has an open record")]
    DuplicateResource { resource_id: ResourceId },
    #[error("no open record for resource {resource_id}")]
    UnknownResource { resource_id: ResourceId },
    #[error("record for resource {resource_id} is not complete")]
    NotComplete { resource_id: ResourceId },
    #[error("record for resource {resource_id} was already handed downstream")]
    AlreadyDispatched { resource_id: ResourceId },
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Quiescence(#[from] QuiescenceError),
}

/// Result of appending one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// More sources still owe their final chunk.
    Pending,
    /// Every expected source has delivered; the record can be taken.
    Complete,
}

/// Record released from the table, echoed back so the caller can feed the
/// allocator's release queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleasedRecord {
    pub resource_id: ResourceId,
    pub record_key: RecordKey,
    pub section: u32,
}

enum Slot {
    Assembling(Record),
    // The record moved downstream; the id stays bound until release.
    Dispatched { record_key: RecordKey, section: u32 },
}

/// The in-flight table of partially built records, keyed by resource id.
///
/// One mutex guards the whole table; contention stays low because a single
/// thread drives fragment ingestion. Section accounting is wired straight
/// into the tracker: starting a record increments its section, releasing
/// decrements it.
pub struct RecordAssembler {
    expected_sources: u16,
    run_id: u32,
    tracker: Arc<SectionTracker>,
    open: Mutex<HashMap<ResourceId, Slot>>,
}

impl RecordAssembler {
    pub fn new(expected_sources: u16, run_id: u32, tracker: Arc<SectionTracker>) -> Self {
        assert!(expected_sources > 0, "a record needs at least the seed source");
        Self {
            expected_sources,
            run_id,
            tracker,
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn expected_sources(&self) -> u16 {
        self.expected_sources
    }

    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    /// Records currently assembling or awaiting release.
    pub fn open_len(&self) -> usize {
        self.open.lock().unwrap().len()
    }

    /// Opens a record from its seed fragment and accounts it in the seed's
    /// section.
    pub fn start_record(
        &self,
        resource_id: ResourceId,
        record_key: RecordKey,
        section: u32,
        seed: Fragment,
    ) -> Result<(), AssemblyError> {
        if seed.source_index() != 0 {
            return Err(ProtocolViolation::SeedSourceIndex {
                resource_id,
                source_index: seed.source_index(),
            }
            .into());
        }
        {
            let mut open = self.open.lock().unwrap();
            if open.contains_key(&resource_id) {
                return Err(AssemblyError::DuplicateResource { resource_id });
            }
            let record = Record::open(
                resource_id,
                record_key,
                section,
                self.run_id,
                self.expected_sources,
                seed,
            )?;
            open.insert(resource_id, Slot::Assembling(record));
        }
        self.tracker.record_started(section);
        Ok(())
    }

    /// Appends a peer fragment to the record bound to `resource_id`.
    pub fn append_fragment(
        &self,
        resource_id: ResourceId,
        fragment: Fragment,
    ) -> Result<AppendOutcome, AssemblyError> {
        if fragment.source_index() == 0 {
            return Err(ProtocolViolation::ReservedSeedIndex { resource_id }.into());
        }
        let mut open = self.open.lock().unwrap();
        match open.get_mut(&resource_id) {
            None => Err(AssemblyError::UnknownResource { resource_id }),
            Some(Slot::Dispatched { .. }) => {
                Err(ProtocolViolation::FragmentAfterDispatch { resource_id }.into())
            }
            Some(Slot::Assembling(record)) => {
                record.append(fragment)?;
                if record.is_complete() {
                    Ok(AppendOutcome::Complete)
                } else {
                    Ok(AppendOutcome::Pending)
                }
            }
        }
    }

    /// Whether the record bound to `resource_id` has every contribution.
    pub fn is_complete(&self, resource_id: ResourceId) -> Result<bool, AssemblyError> {
        let open = self.open.lock().unwrap();
        match open.get(&resource_id) {
            None => Err(AssemblyError::UnknownResource { resource_id }),
            Some(Slot::Dispatched { .. }) => Ok(true),
            Some(Slot::Assembling(record)) => Ok(record.is_complete()),
        }
    }

    /// Takes a complete record out for validation and downstream handoff.
    /// The resource id stays bound until [`RecordAssembler::release_record`].
    pub fn take_complete(&self, resource_id: ResourceId) -> Result<Record, AssemblyError> {
        let mut open = self.open.lock().unwrap();
        match open.remove(&resource_id) {
            None => Err(AssemblyError::UnknownResource { resource_id }),
            Some(slot @ Slot::Dispatched { .. }) => {
                open.insert(resource_id, slot);
                Err(AssemblyError::AlreadyDispatched { resource_id })
            }
            Some(Slot::Assembling(record)) => {
                if !record.is_complete() {
                    let resource_id = record.resource_id();
                    open.insert(resource_id, Slot::Assembling(record));
                    return Err(AssemblyError::NotComplete { resource_id });
                }
                open.insert(
                    resource_id,
                    Slot::Dispatched {
                        record_key: record.record_key(),
                        section: record.section(),
                    },
                );
                Ok(record)
            }
        }
    }

    /// Drops the record's table entry and decrements its section. The sole
    /// path that makes a resource id eligible for reuse.
    pub fn release_record(&self, resource_id: ResourceId) -> Result<ReleasedRecord, AssemblyError> {
        let (record_key, section) = {
            let mut open = self.open.lock().unwrap();
            match open.remove(&resource_id) {
                None => return Err(AssemblyError::UnknownResource { resource_id }),
                Some(Slot::Assembling(record)) => (record.record_key(), record.section()),
                Some(Slot::Dispatched {
                    record_key,
                    section,
                }) => (record_key, section),
            }
        };
        self.tracker.record_released(section)?;
        Ok(ReleasedRecord {
            resource_id,
            record_key,
            section,
        })
    }
}
