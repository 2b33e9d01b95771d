use super::fragment::{Chunk, ChunkChain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Slot in the bounded resource pool identifying one in-flight record.
///
/// Reused across many records over time; [`RecordKey`] is the identifier
/// that survives reuse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResourceId(u16);

impl ResourceId {
    pub fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Globally unique record identifier, independent of resource-id reuse.
///
/// `sequence` is monotone non-decreasing within an `epoch`; the epoch bumps
/// on resynchronization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordKey {
    pub epoch: u32,
    pub sequence: u64,
}

impl RecordKey {
    pub fn new(epoch: u32, sequence: u64) -> Self {
        Self { epoch, sequence }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.epoch, self.sequence)
    }
}

/// One source's contribution to a record: its index plus a chunk chain,
/// optionally carrying the source's final chunk.
#[derive(Debug)]
pub struct Fragment {
    source_index: u16,
    chain: ChunkChain,
}

impl Fragment {
    /// Builds a fragment from already-chained chunks.
    pub fn new(source_index: u16, mut chain: ChunkChain, final_for_source: bool) -> Self {
        if final_for_source {
            chain.mark_final();
        }
        Self {
            source_index,
            chain,
        }
    }

    /// Convenience constructor for a single-chunk fragment.
    pub fn single(source_index: u16, chunk: Chunk, final_for_source: bool) -> Self {
        let mut chain = ChunkChain::new();
        chain.push(chunk);
        Self::new(source_index, chain, final_for_source)
    }

    pub fn source_index(&self) -> u16 {
        self.source_index
    }

    pub fn is_final_for_source(&self) -> bool {
        self.chain.is_final()
    }

    pub(crate) fn into_chain(self) -> ChunkChain {
        self.chain
    }
}

/// Upstream protocol breaches. Never absorbed silently: the caller treats
/// these as fatal for the current processing cycle unless configured to
/// discard the offending record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("seed fragment for {resource_id} arrived with source index {source_index}, expected 0")]
    SeedSourceIndex {
        resource_id: ResourceId,
        source_index: u16,
    },
    #[error("non-seed fragment for {resource_id} claims the seed source index 0")]
    ReservedSeedIndex { resource_id: ResourceId },
    #[error("source {source_index} of {resource_id} sent a second final chunk")]
    DuplicateFinal {
        resource_id: ResourceId,
        source_index: u16,
    },
    #[error(
        "source {source_index} of {resource_id} sent chunk position {position}, expected {expected}"
    )]
    ChunkOutOfOrder {
        resource_id: ResourceId,
        source_index: u16,
        position: u32,
        expected: u32,
    },
    #[error("source index {source_index} exceeds the {expected_sources} expected sources")]
    SourceIndexOutOfRange {
        source_index: u16,
        expected_sources: u16,
    },
    #[error("fragment for {resource_id} arrived after the record was handed downstream")]
    FragmentAfterDispatch { resource_id: ResourceId },
    #[error("logical unit {unit_id} appears more than once in record {record_key}")]
    DuplicateUnit { record_key: RecordKey, unit_id: u16 },
}

/// A record under construction: the aggregate of fragments from
/// `expected_sources` distinct sources, addressed by one resource id.
#[derive(Debug)]
pub struct Record {
    resource_id: ResourceId,
    record_key: RecordKey,
    section: u32,
    run_id: u32,
    expected_sources: u16,
    completed_sources: u16,
    byte_len: usize,
    chains: BTreeMap<u16, ChunkChain>,
}

impl Record {
    /// Opens a standalone record from its seed fragment. The assembler has
    /// already checked that the seed uses source index 0.
    pub fn open(
        resource_id: ResourceId,
        record_key: RecordKey,
        section: u32,
        run_id: u32,
        expected_sources: u16,
        seed: Fragment,
    ) -> Result<Self, ProtocolViolation> {
        let mut record = Self {
            resource_id,
            record_key,
            section,
            run_id,
            expected_sources,
            completed_sources: 0,
            byte_len: 0,
            chains: BTreeMap::new(),
        };
        record.append(seed)?;
        Ok(record)
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    pub fn record_key(&self) -> RecordKey {
        self.record_key
    }

    /// Time-ordered section (batch) the record belongs to.
    pub fn section(&self) -> u32 {
        self.section
    }

    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    /// Running byte count across all appended chains.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn expected_sources(&self) -> u16 {
        self.expected_sources
    }

    /// Number of sources whose final chunk has arrived.
    pub fn completed_sources(&self) -> u16 {
        self.completed_sources
    }

    /// Complete exactly when every expected source has delivered its final
    /// chunk.
    pub fn is_complete(&self) -> bool {
        self.completed_sources == self.expected_sources
    }

    /// The per-source chains, keyed by source index.
    pub fn chains(&self) -> &BTreeMap<u16, ChunkChain> {
        &self.chains
    }

    /// Appends one fragment, concatenating onto any chain the source already
    /// started. Sources may complete in any interleaving; within one source
    /// chunks must arrive in declared order.
    pub(crate) fn append(&mut self, fragment: Fragment) -> Result<(), ProtocolViolation> {
        let source_index = fragment.source_index();
        if source_index >= self.expected_sources {
            return Err(ProtocolViolation::SourceIndexOutOfRange {
                source_index,
                expected_sources: self.expected_sources,
            });
        }
        let finalizes = fragment.is_final_for_source();
        let chain = fragment.into_chain();
        let entry = self.chains.entry(source_index).or_default();
        if entry.is_final() {
            // Any chunk after the final one is a breach, final-marked or not.
            return Err(ProtocolViolation::DuplicateFinal {
                resource_id: self.resource_id,
                source_index,
            });
        }
        let mut expected = entry.chunk_count() as u32;
        for chunk in chain.chunks() {
            if chunk.position() != expected {
                return Err(ProtocolViolation::ChunkOutOfOrder {
                    resource_id: self.resource_id,
                    source_index,
                    position: chunk.position(),
                    expected,
                });
            }
            expected += 1;
        }
        self.byte_len += chain.byte_len();
        entry.extend(chain);
        if finalizes {
            entry.mark_final();
            self.completed_sources += 1;
        }
        Ok(())
    }
}

/// Located, length-bounded view into one chunk's backing storage.
///
/// Segments are ordered and collectively reconstruct one logical unit's
/// payload; a unit spanning several chunks yields one segment per chunk.
#[derive(Debug, Clone)]
pub struct PayloadSegment {
    source_index: u16,
    unit_id: u16,
    backing: Arc<[u8]>,
    offset: usize,
    len: usize,
}

impl PayloadSegment {
    pub(crate) fn new(
        source_index: u16,
        unit_id: u16,
        backing: Arc<[u8]>,
        offset: usize,
        len: usize,
    ) -> Self {
        debug_assert!(offset + len <= backing.len());
        Self {
            source_index,
            unit_id,
            backing,
            offset,
            len,
        }
    }

    pub fn source_index(&self) -> u16 {
        self.source_index
    }

    /// Identifier of the logical unit this segment belongs to.
    pub fn unit_id(&self) -> u16 {
        self.unit_id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The located bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.backing[self.offset..self.offset + self.len]
    }
}
