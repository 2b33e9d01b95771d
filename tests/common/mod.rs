#![allow(dead_code)]

use colligo::{
    unit_checksum, Chunk, ChunkChain, CollectingSectionSink, Fragment, Record, RecordAssembler,
    RecordKey, ResourceId, SectionTracker, CONTRIB_HEADER_LEN, CONTRIB_MAGIC, CONTRIB_VERSION,
    UNIT_TRAILER_LEN,
};
use std::sync::Arc;

/// Encodes one source contribution: header, then each unit's body followed
/// by its trailer.
pub fn contribution(units: &[(u16, &[u8])]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (unit_id, body) in units {
        payload.extend_from_slice(body);
        let unit_len = (body.len() + UNIT_TRAILER_LEN) as u32;
        payload.extend_from_slice(&unit_len.to_le_bytes());
        payload.extend_from_slice(&unit_id.to_le_bytes());
        payload.extend_from_slice(&unit_checksum(body).to_le_bytes());
    }
    let mut out = Vec::with_capacity(CONTRIB_HEADER_LEN + payload.len());
    out.extend_from_slice(&CONTRIB_MAGIC.to_le_bytes());
    out.push(CONTRIB_VERSION);
    out.push(0);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Splits `bytes` at the given offsets, producing contiguous pieces.
pub fn split_at(bytes: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        pieces.push(bytes[start..*cut].to_vec());
        start = *cut;
    }
    pieces.push(bytes[start..].to_vec());
    pieces
}

/// Chains `pieces` into one fragment for `source_index`.
pub fn fragment(source_index: u16, pieces: Vec<Vec<u8>>, final_for_source: bool) -> Fragment {
    fragment_with_offset(source_index, pieces, 0, final_for_source)
}

/// Like [`fragment`], with chunk positions numbered from `start_position` so
/// a later fragment can continue an earlier one's chain.
pub fn fragment_with_offset(
    source_index: u16,
    pieces: Vec<Vec<u8>>,
    start_position: u32,
    final_for_source: bool,
) -> Fragment {
    let total = start_position + pieces.len() as u32;
    let mut chain = ChunkChain::new();
    for (index, piece) in pieces.into_iter().enumerate() {
        chain.push(Chunk::new(piece, start_position + index as u32, total));
    }
    Fragment::new(source_index, chain, final_for_source)
}

/// Single-chunk final fragment carrying a whole contribution.
pub fn whole_fragment(source_index: u16, bytes: &[u8]) -> Fragment {
    fragment(source_index, vec![bytes.to_vec()], true)
}

/// Assembles a complete record from one contribution per source, seed
/// first, through the real assembler path.
pub fn build_record(contributions: &[Vec<u8>]) -> Record {
    let tracker = Arc::new(SectionTracker::new(Box::new(CollectingSectionSink::new())));
    let assembler = RecordAssembler::new(contributions.len() as u16, 1, tracker);
    let resource_id = ResourceId::new(0);
    assembler
        .start_record(
            resource_id,
            RecordKey::new(1, 1),
            1,
            whole_fragment(0, &contributions[0]),
        )
        .expect("seed accepted");
    for (source_index, bytes) in contributions.iter().enumerate().skip(1) {
        assembler
            .append_fragment(resource_id, whole_fragment(source_index as u16, bytes))
            .expect("peer fragment accepted");
    }
    assembler.take_complete(resource_id).expect("record complete")
}

/// Assembles a complete record from prepared fragments, seed first.
pub fn build_record_from_fragments(fragments: Vec<Fragment>) -> Record {
    let tracker = Arc::new(SectionTracker::new(Box::new(CollectingSectionSink::new())));
    let assembler = RecordAssembler::new(fragments.len() as u16, 1, tracker);
    let resource_id = ResourceId::new(0);
    let mut fragments = fragments.into_iter();
    let seed = fragments.next().expect("at least the seed fragment");
    assembler
        .start_record(resource_id, RecordKey::new(1, 2), 1, seed)
        .expect("seed accepted");
    for fragment in fragments {
        assembler
            .append_fragment(resource_id, fragment)
            .expect("peer fragment accepted");
    }
    assembler.take_complete(resource_id).expect("record complete")
}

/// A record still waiting on a peer source.
pub fn open_partial_record() -> Record {
    let seed = contribution(&[(1, b"seed")]);
    Record::open(
        ResourceId::new(0),
        RecordKey::new(1, 3),
        1,
        1,
        2,
        whole_fragment(0, &seed),
    )
    .expect("seed accepted")
}
