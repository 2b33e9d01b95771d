//! Fragment reassembly: chunk chains, the in-flight record table, and the
//! two-pass payload location that turns a completed record's raw chunks into
//! addressable, checksum-validated segments.

pub mod assembler;
pub mod fragment;
pub mod payload;
pub mod record;

pub use assembler::{AppendOutcome, AssemblyError, RecordAssembler, ReleasedRecord};
pub use fragment::{Chunk, ChunkChain};
pub use payload::{
    unit_checksum, validate_and_locate, ValidationError, CONTRIB_HEADER_LEN, CONTRIB_MAGIC,
    CONTRIB_VERSION, UNIT_TRAILER_LEN,
};
pub use record::{Fragment, PayloadSegment, ProtocolViolation, Record, RecordKey, ResourceId};
