use crate::assembly::{ChunkChain, PayloadSegment, Record, RecordKey};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

/// A validated record ready for consumption, paired with its located
/// payload segments.
#[derive(Debug)]
pub struct BuiltRecord {
    record: Record,
    segments: Vec<PayloadSegment>,
}

impl BuiltRecord {
    pub fn new(record: Record, segments: Vec<PayloadSegment>) -> Self {
        Self { record, segments }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn segments(&self) -> &[PayloadSegment] {
        &self.segments
    }
}

/// Downstream consumer of validated records: persist-to-storage or
/// forward-to-peer. The pipeline hands each record to exactly one sink and
/// is indifferent to which.
pub trait RecordSink: Send {
    fn consume(&mut self, built: &BuiltRecord);
}

/// Bookkeeping row kept by the store sink for each consumed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub record_key: RecordKey,
    pub section: u32,
    pub byte_len: usize,
    pub payload_digest: [u8; 32],
}

impl StoredRecord {
    /// Digest rendered as lowercase hex, for logs and manifests.
    pub fn digest_hex(&self) -> String {
        self.payload_digest.iter().fold(
            String::with_capacity(64),
            |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            },
        )
    }
}

/// Persist-oriented sink: records a SHA-256 digest over every payload
/// segment in order, giving downstream storage an end-to-end integrity
/// anchor. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct StoreSink {
    stored: Arc<Mutex<Vec<StoredRecord>>>,
}

impl StoreSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<StoredRecord> {
        self.stored.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.stored.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.lock().unwrap().is_empty()
    }
}

impl RecordSink for StoreSink {
    fn consume(&mut self, built: &BuiltRecord) {
        let mut hasher = Sha256::new();
        let mut byte_len = 0;
        for segment in built.segments() {
            hasher.update(segment.bytes());
            byte_len += segment.len();
        }
        let record = built.record();
        self.stored.lock().unwrap().push(StoredRecord {
            record_key: record.record_key(),
            section: record.section(),
            byte_len,
            payload_digest: hasher.finalize().into(),
        });
    }
}

/// A record duplicated for a peer: the chains share the original chunk
/// storage by refcount.
#[derive(Debug)]
pub struct ForwardedRecord {
    pub record_key: RecordKey,
    pub section: u32,
    pub chains: Vec<ChunkChain>,
}

/// Peer-oriented sink: re-chains each record's fragments through the
/// explicit fan-out duplication path, as a forwarding transport would
/// before shipping them on. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ForwardSink {
    forwarded: Arc<Mutex<Vec<ForwardedRecord>>>,
}

impl ForwardSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.forwarded.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.forwarded.lock().unwrap().is_empty()
    }

    /// Runs `inspect` over the forwarded log without moving it.
    pub fn with_forwarded<R>(&self, inspect: impl FnOnce(&[ForwardedRecord]) -> R) -> R {
        inspect(&self.forwarded.lock().unwrap())
    }
}

impl RecordSink for ForwardSink {
    fn consume(&mut self, built: &BuiltRecord) {
        let record = built.record();
        let chains = record
            .chains()
            .values()
            .map(ChunkChain::clone_for_fanout)
            .collect();
        self.forwarded.lock().unwrap().push(ForwardedRecord {
            record_key: record.record_key(),
            section: record.section(),
            chains,
        });
    }
}
