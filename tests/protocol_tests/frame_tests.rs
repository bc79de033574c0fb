//! Frame Codec Tests
//!
//! Tests for tagged frame encoding/decoding over buffers and streams.

use std::io::{Cursor, ErrorKind};

use kvmux::protocol::{
    decode_frame, encode_frame, read_frame, write_frame, Frame, HEADER_SIZE,
};
use kvmux::MuxError;

const NO_LIMIT: usize = i32::MAX as usize;

// =============================================================================
// Buffer Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_decode_frame() {
    let encoded = encode_frame(17, b"hello").unwrap();
    assert_eq!(encoded.len(), HEADER_SIZE + 5);

    let frame = decode_frame(&encoded).unwrap();
    assert_eq!(frame, Frame::new(17, b"hello".to_vec()));
}

#[test]
fn test_encode_decode_empty_payload() {
    let encoded = encode_frame(3, b"").unwrap();
    assert_eq!(encoded.len(), HEADER_SIZE);

    let frame = decode_frame(&encoded).unwrap();
    assert_eq!(frame.tag, 3);
    assert!(frame.payload.is_empty());
}

#[test]
fn test_payload_with_zero_bytes() {
    let payload: Vec<u8> = vec![0x00, 0x00, 0xFF, 0x00, 0x80, 0x00];
    let encoded = encode_frame(1, &payload).unwrap();

    let frame = decode_frame(&encoded).unwrap();
    assert_eq!(&frame.payload[..], payload.as_slice());
}

#[test]
fn test_declared_length_matches_payload() {
    let payload: Vec<u8> = (0..=255).collect();
    let encoded = encode_frame(9, &payload).unwrap();

    let declared = i32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
    assert_eq!(declared as usize, payload.len());
    assert_eq!(encoded.len() - HEADER_SIZE, payload.len());
}

#[test]
fn test_decode_incomplete_header() {
    let result = decode_frame(&[0, 0, 0, 1, 0]);
    assert!(matches!(result, Err(MuxError::Protocol(_))));
}

#[test]
fn test_decode_incomplete_payload() {
    let mut encoded = encode_frame(1, b"truncated").unwrap();
    encoded.truncate(encoded.len() - 3);

    let result = decode_frame(&encoded);
    assert!(matches!(result, Err(MuxError::Protocol(_))));
}

#[test]
fn test_decode_negative_length() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&5i32.to_be_bytes());
    bytes.extend_from_slice(&(-1i32).to_be_bytes());

    let result = decode_frame(&bytes);
    assert!(matches!(result, Err(MuxError::Protocol(_))));
}

// =============================================================================
// Stream I/O Tests
// =============================================================================

#[test]
fn test_write_read_frames_in_sequence() {
    let mut wire = Vec::new();
    write_frame(&mut wire, 1, b"first").unwrap();
    write_frame(&mut wire, 2, b"").unwrap();
    write_frame(&mut wire, -3, b"third").unwrap();

    let mut reader = Cursor::new(wire);
    let first = read_frame(&mut reader, NO_LIMIT).unwrap().unwrap();
    let second = read_frame(&mut reader, NO_LIMIT).unwrap().unwrap();
    let third = read_frame(&mut reader, NO_LIMIT).unwrap().unwrap();

    assert_eq!(first, Frame::new(1, b"first".to_vec()));
    assert_eq!(second, Frame::new(2, Vec::<u8>::new()));
    assert_eq!(third, Frame::new(-3, b"third".to_vec()));

    // Clean end of stream between frames
    assert!(read_frame(&mut reader, NO_LIMIT).unwrap().is_none());
}

#[test]
fn test_read_empty_stream_is_clean_eof() {
    let mut reader = Cursor::new(Vec::<u8>::new());
    assert!(read_frame(&mut reader, NO_LIMIT).unwrap().is_none());
}

#[test]
fn test_read_truncated_header_is_io_error() {
    let mut reader = Cursor::new(vec![0u8, 0, 0, 7, 0]);
    match read_frame(&mut reader, NO_LIMIT) {
        Err(MuxError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("Expected UnexpectedEof, got {:?}", other),
    }
}

#[test]
fn test_read_truncated_payload_is_io_error() {
    let mut wire = Vec::new();
    write_frame(&mut wire, 7, b"complete payload").unwrap();
    wire.truncate(wire.len() - 4);

    let mut reader = Cursor::new(wire);
    match read_frame(&mut reader, NO_LIMIT) {
        Err(MuxError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("Expected UnexpectedEof, got {:?}", other),
    }
}

#[test]
fn test_read_negative_length_is_protocol_error() {
    let mut wire = Vec::new();
    wire.extend_from_slice(&11i32.to_be_bytes());
    wire.extend_from_slice(&(-42i32).to_be_bytes());

    let mut reader = Cursor::new(wire);
    assert!(matches!(
        read_frame(&mut reader, NO_LIMIT),
        Err(MuxError::Protocol(_))
    ));
}

#[test]
fn test_read_oversize_payload_rejected() {
    let mut wire = Vec::new();
    write_frame(&mut wire, 1, &[0u8; 64]).unwrap();

    let mut reader = Cursor::new(wire);
    assert!(matches!(
        read_frame(&mut reader, 32),
        Err(MuxError::Protocol(_))
    ));
}
