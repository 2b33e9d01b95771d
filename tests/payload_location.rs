mod common;

use colligo::{
    unit_checksum, validate_and_locate, AssemblyError, ProtocolViolation, ValidationError,
    CONTRIB_HEADER_LEN, CONTRIB_MAGIC, CONTRIB_VERSION, UNIT_TRAILER_LEN,
};

#[test]
fn locates_units_in_forward_order() {
    let seed = common::contribution(&[(1, b"alpha"), (2, b"bravo-longer")]);
    let peer = common::contribution(&[(3, b"charlie")]);
    let record = common::build_record(&[seed, peer]);

    let segments = validate_and_locate(&record).expect("record validates");
    let units: Vec<u16> = segments.iter().map(|segment| segment.unit_id()).collect();
    assert_eq!(units, vec![1, 2, 3]);
    assert_eq!(segments[0].bytes(), b"alpha");
    assert_eq!(segments[1].bytes(), b"bravo-longer");
    assert_eq!(segments[2].bytes(), b"charlie");
    assert_eq!(segments[2].source_index(), 1);
}

#[test]
fn reassembles_units_spanning_chunk_boundaries() {
    let body: Vec<u8> = (0u8..=255).cycle().take(400).collect();
    let bytes = common::contribution(&[(7, &body), (8, b"tail unit")]);
    // Cuts fall inside the first unit's body, inside its trailer, and inside
    // the second unit.
    let cuts = [
        CONTRIB_HEADER_LEN + 13,
        CONTRIB_HEADER_LEN + 200,
        CONTRIB_HEADER_LEN + 400 + 3,
        bytes.len() - 5,
    ];
    let pieces = common::split_at(&bytes, &cuts);
    let record = common::build_record_from_fragments(vec![common::fragment(0, pieces, true)]);

    let segments = validate_and_locate(&record).expect("record validates");
    let unit7: Vec<u8> = segments
        .iter()
        .filter(|segment| segment.unit_id() == 7)
        .flat_map(|segment| segment.bytes().to_vec())
        .collect();
    assert_eq!(unit7, body);
    assert!(segments.iter().filter(|segment| segment.unit_id() == 7).count() > 1);
    let unit8: Vec<u8> = segments
        .iter()
        .filter(|segment| segment.unit_id() == 8)
        .flat_map(|segment| segment.bytes().to_vec())
        .collect();
    assert_eq!(unit8, b"tail unit");
}

#[test]
fn truncated_chain_is_reported() {
    // Header declares 100 payload bytes; only 60 follow.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&CONTRIB_MAGIC.to_le_bytes());
    bytes.push(CONTRIB_VERSION);
    bytes.push(0);
    bytes.extend_from_slice(&100u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 60]);
    let record = common::build_record(&[bytes]);

    let err = validate_and_locate(&record).expect_err("short chain rejected");
    assert_eq!(
        err,
        AssemblyError::Validation(ValidationError::TruncatedChain {
            source_index: 0,
            declared: 100,
            available: 60,
        })
    );
}

#[test]
fn trailing_bytes_are_reported() {
    let mut bytes = common::contribution(&[(1, b"unit")]);
    let declared = bytes.len() - CONTRIB_HEADER_LEN;
    bytes.push(0xEE);
    let record = common::build_record(&[bytes]);

    let err = validate_and_locate(&record).expect_err("long chain rejected");
    assert_eq!(
        err,
        AssemblyError::Validation(ValidationError::TrailingBytes {
            source_index: 0,
            declared,
            available: declared + 1,
        })
    );
}

#[test]
fn duplicate_unit_across_sources_is_a_violation() {
    let seed = common::contribution(&[(5, b"seed unit")]);
    let peer = common::contribution(&[(5, b"peer reuses the id")]);
    let record = common::build_record(&[seed, peer]);

    let err = validate_and_locate(&record).expect_err("duplicate unit rejected");
    assert_eq!(
        err,
        AssemblyError::Protocol(ProtocolViolation::DuplicateUnit {
            record_key: record.record_key(),
            unit_id: 5,
        })
    );
}

#[test]
fn checksum_mismatch_is_reported() {
    let mut bytes = common::contribution(&[(3, b"checksummed body")]);
    let crc_offset = bytes.len() - 2;
    bytes[crc_offset] ^= 0xFF;
    let record = common::build_record(&[bytes]);

    let err = validate_and_locate(&record).expect_err("corrupt unit rejected");
    assert!(matches!(
        err,
        AssemblyError::Validation(ValidationError::ChecksumMismatch { unit_id: 3, .. })
    ));
}

#[test]
fn bad_magic_is_reported() {
    let mut bytes = common::contribution(&[(1, b"unit")]);
    bytes[0] = 0x00;
    let record = common::build_record(&[bytes]);

    let err = validate_and_locate(&record).expect_err("bad magic rejected");
    assert!(matches!(
        err,
        AssemblyError::Validation(ValidationError::BadMagic { source_index: 0, .. })
    ));
}

#[test]
fn unit_length_running_past_the_header_is_reported() {
    // One unit whose declared length exceeds the payload region.
    let body = b"short";
    let mut payload = Vec::new();
    payload.extend_from_slice(body);
    let oversized = (body.len() + UNIT_TRAILER_LEN + 32) as u32;
    payload.extend_from_slice(&oversized.to_le_bytes());
    payload.extend_from_slice(&9u16.to_le_bytes());
    payload.extend_from_slice(&unit_checksum(body).to_le_bytes());
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&CONTRIB_MAGIC.to_le_bytes());
    bytes.push(CONTRIB_VERSION);
    bytes.push(0);
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    let record = common::build_record(&[bytes]);

    let err = validate_and_locate(&record).expect_err("oversized unit rejected");
    assert!(matches!(
        err,
        AssemblyError::Validation(ValidationError::BadUnitLength { unit_id: 9, .. })
    ));
}

#[test]
fn leftover_smaller_than_a_trailer_is_reported() {
    let mut payload = common::contribution(&[(1, b"unit")])[CONTRIB_HEADER_LEN..].to_vec();
    payload.insert(0, 0xAB);
    payload.insert(0, 0xCD);
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&CONTRIB_MAGIC.to_le_bytes());
    bytes.push(CONTRIB_VERSION);
    bytes.push(0);
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    let record = common::build_record(&[bytes]);

    let err = validate_and_locate(&record).expect_err("dangling bytes rejected");
    assert_eq!(
        err,
        AssemblyError::Validation(ValidationError::DanglingBytes {
            source_index: 0,
            leftover: 2,
        })
    );
}

#[test]
fn empty_payload_yields_no_segments() {
    let bytes = common::contribution(&[]);
    let record = common::build_record(&[bytes]);
    let segments = validate_and_locate(&record).expect("empty payload validates");
    assert!(segments.is_empty());
}

#[test]
fn incomplete_record_is_rejected() {
    let record = common::open_partial_record();
    let err = validate_and_locate(&record).expect_err("incomplete record rejected");
    assert!(matches!(err, AssemblyError::NotComplete { .. }));
}

#[test]
fn checksum_is_stable_for_known_input() {
    // Pin the reversed-order accumulation so producers and validators agree.
    assert_eq!(unit_checksum(b""), 0xFFFF);
    let forward = unit_checksum(b"ab");
    let reversed = unit_checksum(b"ba");
    assert_ne!(forward, reversed);
}
