//! Binary Codec Tests
//!
//! Tests for header layout, frame packing and frame decoding.

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use mcharness::protocol::binary::{
    decode_binary_frame, encode_binary_frame, encode_response_frame, read_binary_frame, Header,
    Opcode, RequestFrame, Status, ARITH_EXTRAS_SIZE, ARITH_NO_CREATE, HEADER_SIZE,
    REQUEST_MAGIC, RESPONSE_MAGIC, STORE_EXTRAS_SIZE,
};
use mcharness::McError;

// =============================================================================
// Frame Packing Tests
// =============================================================================

#[test]
fn test_set_frame_layout() {
    let frame = RequestFrame::store(Opcode::Set, "foo", Bytes::from_static(b"bar"), 0, 0);
    let bytes = frame.encode().unwrap();

    assert_eq!(bytes.len(), HEADER_SIZE + 14);
    assert_eq!(bytes[0], REQUEST_MAGIC);
    assert_eq!(bytes[1], Opcode::Set as u8);
    assert_eq!(&bytes[2..4], &[0, 3]); // key length
    assert_eq!(bytes[4], STORE_EXTRAS_SIZE as u8);
    assert_eq!(&bytes[8..12], &14u32.to_be_bytes()); // body length

    let (decoded, consumed) = decode_binary_frame(&bytes).unwrap();
    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded.header.total_body_length, 14);
    assert_eq!(&decoded.key[..], b"foo");
    assert_eq!(&decoded.value[..], b"bar");
    assert_eq!(decoded.extras.len(), 8);
}

#[test]
fn test_store_extras_are_big_endian() {
    let frame = RequestFrame::store(Opcode::Add, "k", Bytes::new(), 0xDEAD_BEEF, 3600);
    assert_eq!(&frame.extras[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(&frame.extras[4..], &3600u32.to_be_bytes());
}

#[test]
fn test_arith_extras_layout() {
    let frame = RequestFrame::arith(Opcode::Increment, "n", 5, 10, ARITH_NO_CREATE);
    assert_eq!(frame.extras.len(), ARITH_EXTRAS_SIZE);
    assert_eq!(&frame.extras[..8], &5u64.to_be_bytes());
    assert_eq!(&frame.extras[8..16], &10u64.to_be_bytes());
    assert_eq!(&frame.extras[16..], &[0xFF, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn test_flush_extras_only_with_delay() {
    assert!(RequestFrame::flush(None).extras.is_empty());
    assert_eq!(&RequestFrame::flush(Some(30)).extras[..], &30u32.to_be_bytes());
}

#[test]
fn test_opaque_and_cas_in_header() {
    let bytes = RequestFrame::keyed(Opcode::Get, "k")
        .with_opaque(0x0102_0304)
        .with_cas(77)
        .encode()
        .unwrap();
    let header = Header::parse(&bytes).unwrap();
    assert_eq!(header.opaque, 0x0102_0304);
    assert_eq!(header.cas, 77);
    assert!(!header.is_response());
}

#[test]
fn test_quiet_variants() {
    let quiet = RequestFrame::keyed(Opcode::Delete, "k").quiet().unwrap();
    assert_eq!(quiet.opcode, Opcode::DeleteQ);
    assert!(quiet.opcode.is_quiet());

    assert!(matches!(
        RequestFrame::touch("k", 0).quiet(),
        Err(McError::Unsupported(_))
    ));
}

#[test]
fn test_oversized_key_rejected() {
    let key = vec![b'k'; 70_000];
    let result = encode_binary_frame(Opcode::Get, &key, &[], &[], 0, 0);
    assert!(matches!(result, Err(McError::InvalidArgument(_))));
}

// =============================================================================
// Frame Decoding Tests
// =============================================================================

#[test]
fn test_read_response_frame() {
    let bytes = encode_response_frame(
        Opcode::Get,
        Status::NoError,
        b"",
        &5u32.to_be_bytes(),
        b"hello",
        9,
        1234,
    )
    .unwrap();
    let mut source = Cursor::new(bytes.to_vec());

    let frame = read_binary_frame(&mut source).unwrap();
    assert_eq!(frame.header.magic, RESPONSE_MAGIC);
    assert_eq!(frame.header.status().unwrap(), Status::NoError);
    assert_eq!(frame.header.opaque, 9);
    assert_eq!(frame.header.cas, 1234);
    assert_eq!(frame.flags(), 5);
    assert_eq!(&frame.value[..], b"hello");
}

#[test]
fn test_read_rejects_request_magic() {
    let bytes = RequestFrame::new(Opcode::Noop).encode().unwrap();
    let mut source = Cursor::new(bytes.to_vec());
    assert!(matches!(read_binary_frame(&mut source), Err(McError::Framing(_))));
}

#[test]
fn test_bad_magic() {
    let mut bytes = BytesMut::from(&RequestFrame::new(Opcode::Noop).encode().unwrap()[..]);
    bytes[0] = 0x42;
    assert!(matches!(Header::parse(&bytes), Err(McError::Framing(_))));
}

#[test]
fn test_body_shorter_than_key_and_extras() {
    let mut bytes = BytesMut::from(
        &RequestFrame::keyed(Opcode::Get, "abcdefghij").encode().unwrap()[..],
    );
    // Declare 4 body bytes for a 10-byte key
    bytes[8..12].copy_from_slice(&4u32.to_be_bytes());
    assert!(matches!(Header::parse(&bytes), Err(McError::Framing(_))));
}

#[test]
fn test_truncated_body() {
    let bytes = encode_response_frame(Opcode::Get, Status::NoError, b"", b"", b"hello", 0, 0).unwrap();
    let mut source = Cursor::new(bytes[..bytes.len() - 2].to_vec());
    let err = read_binary_frame(&mut source).unwrap_err();
    assert!(matches!(err, McError::Framing(_)));
    assert!(err.poisons_connection());
}

#[test]
fn test_oversized_body_length() {
    let mut bytes = BytesMut::from(
        &encode_response_frame(Opcode::Get, Status::NoError, b"", b"", b"hello", 0, 0).unwrap()[..],
    );
    bytes[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
    let mut source = Cursor::new(bytes.to_vec());
    assert!(matches!(read_binary_frame(&mut source), Err(McError::Framing(_))));
    assert!(matches!(decode_binary_frame(&bytes), Err(McError::Framing(_))));
}

#[test]
fn test_unknown_status_surfaces() {
    let mut bytes = BytesMut::from(
        &encode_response_frame(Opcode::Get, Status::NoError, b"", b"", b"", 0, 0).unwrap()[..],
    );
    bytes[6..8].copy_from_slice(&0x00FFu16.to_be_bytes());
    let (frame, _) = decode_binary_frame(&bytes).unwrap();
    assert!(matches!(frame.header.status(), Err(McError::UnknownStatus(0x00FF))));
}

#[test]
fn test_status_codes() {
    assert_eq!(Status::from_u16(0x20), Some(Status::AuthRequired));
    assert_eq!(Status::ItemNotStored.code(), 5);
    assert_eq!(Status::from_u16(0x86), Some(Status::TempFailure));
    assert_eq!(Status::from_u16(0x30), None);
}
