//! Colligo assembles complete logical records out of fragments produced
//! independently by many upstream sources, recycles a bounded pool of
//! resource ids through a batched request/release protocol, and closes each
//! time-ordered section exactly once when it is provably drained.
//!
//! The moving parts, leaves first: a wait-free SPSC ring used for every
//! inter-stage handoff, the fragment assembler with its two-pass payload
//! locator, the resource lifecycle allocator, and the section quiescence
//! tracker. [`pipeline::EventPipeline`] wires them into ingest and consumer
//! worker threads.

pub mod allocator;
pub mod app;
pub mod assembly;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod quiescence;
pub mod ring;
pub mod sink;
pub mod telemetry;

pub use allocator::{
    AllocatorError, CollectingFlushSink, FlushSink, OpBatch, ResourceAllocator, ResourceOp,
};
pub use assembly::{
    unit_checksum, validate_and_locate, AppendOutcome, AssemblyError, Chunk, ChunkChain, Fragment,
    PayloadSegment, ProtocolViolation, Record, RecordAssembler, RecordKey, ReleasedRecord,
    ResourceId, ValidationError, CONTRIB_HEADER_LEN, CONTRIB_MAGIC, CONTRIB_VERSION,
    UNIT_TRAILER_LEN,
};
pub use config::{load_config, ConfigError, CorruptionPolicy, PipelineConfig};
pub use logging::{LogLevel, LogRotationPolicy, LogSegment, LoggingError, PipelineLogger};
pub use pipeline::{EventPipeline, FragmentEnvelope, PipelineError};
pub use quiescence::{CollectingSectionSink, QuiescenceError, SectionSink, SectionTracker};
pub use ring::{RingResizeError, SpscRing};
pub use sink::{BuiltRecord, ForwardSink, ForwardedRecord, RecordSink, StoreSink, StoredRecord};
pub use telemetry::{MetricsSnapshot, PipelineMetrics};
