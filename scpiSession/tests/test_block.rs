//! Tests for decoding IEEE-488.2 definite-length arbitrary blocks from an instrument.

use std::{collections::VecDeque, time::Duration};

use rstest::*;

use scpisession::{
    InstReply, InstrumentError, LoopbackTransport, Session, SessionConfig, StreamTransport,
    encode_block, read_block,
};

const QUERY: &str = ":WAV:DATA?";

/// Create a session whose instrument answers the waveform query with the given replies.
fn crt_session(replies: Vec<InstReply>) -> Session<LoopbackTransport> {
    let lbk = LoopbackTransport::new(vec![QUERY.to_string()], replies, "\n");
    let config = SessionConfig::default().with_drain_timeout(Duration::from_millis(5));
    Session::with_config(lbk, &config).unwrap()
}

/// A payload that contains line feeds and the block marker, which must not confuse the decoder.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| [b'\n', b'#', 0, 0xff, b'5'][i % 5]).collect()
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(9)]
#[case(10)]
#[case(1200)]
#[case(10000)]
#[case(99999)]
fn read_block_exact_payload(#[case] len: usize) {
    let data = payload(len);
    let mut block = encode_block(&data).unwrap();
    block.push(b'\n');
    let session = crt_session(vec![InstReply::Bytes(block)]);

    assert_eq!(session.query_binary_block(QUERY, true).unwrap(), data);
}

/// Payloads with length fields from one to five digits wide decode exactly.
#[rstest]
fn read_block_every_digit_count() {
    for len in [1, 9, 10, 99, 100, 999, 1000, 9999, 10000, 99999] {
        let data = payload(len);
        let block = encode_block(&data).unwrap();
        assert_eq!(usize::from(block[1] - b'0'), len.to_string().len());
        let mut lbk = LoopbackTransport::new(vec![], vec![InstReply::Bytes(block)], "\n");
        assert_eq!(read_block(&mut lbk, false, Duration::from_millis(5)).unwrap(), data);
    }
}

#[rstest]
#[case(b"#15hello".to_vec())]
#[case(b"#205hello".to_vec())]
#[case(b"#9000000005hello".to_vec())]
fn read_block_leading_zeros(#[case] block: Vec<u8>) {
    let session = crt_session(vec![InstReply::Bytes(block)]);
    assert_eq!(session.query_binary_block(QUERY, false).unwrap(), b"hello");
}

/// Without draining, the terminator stays in the input and the next read sees it.
#[rstest]
fn read_block_without_drain_leaves_terminator() {
    let lbk = LoopbackTransport::new(
        vec![QUERY.to_string(), "*OPC?".to_string()],
        vec![InstReply::Bytes(b"#13abc\n".to_vec())],
        "\n",
    );
    let session = Session::new(lbk).unwrap();
    assert_eq!(session.query_binary_block(QUERY, false).unwrap(), b"abc");
    // The left over terminator ends the next response line right away.
    assert_eq!(session.query_text("*OPC?").unwrap(), "");
}

/// A missing terminator is not an error when draining.
#[rstest]
fn read_block_drain_missing_terminator() {
    let session = crt_session(vec![InstReply::Bytes(b"#13abc".to_vec()), InstReply::Silence]);
    assert_eq!(session.query_binary_block(QUERY, true).unwrap(), b"abc");
    assert_eq!(session.timeout().unwrap(), Duration::from_secs(3));
}

#[rstest]
#[case(b"X13abc".to_vec())]
#[case(b"#03abc".to_vec())]
#[case(b"#A3abc".to_vec())]
#[case(b"#2x3abc".to_vec())]
fn read_block_malformed_header(#[case] block: Vec<u8>) {
    let mut lbk = LoopbackTransport::new(vec![], vec![InstReply::Bytes(block)], "\n");
    assert!(matches!(
        read_block(&mut lbk, false, Duration::from_millis(5)),
        Err(InstrumentError::Framing(_))
    ));
}

/// A payload shorter than declared is a framing error, no partial data is returned.
#[rstest]
fn read_block_truncated_payload() {
    let session = crt_session(vec![InstReply::Bytes(b"#15abc".to_vec()), InstReply::Silence]);
    assert!(matches!(
        session.query_binary_block(QUERY, true),
        Err(InstrumentError::Framing(_))
    ));
}

/// A truncated length field is a framing error, too.
#[rstest]
fn read_block_truncated_length() {
    let session = crt_session(vec![InstReply::Bytes(b"#41".to_vec()), InstReply::Silence]);
    assert!(matches!(
        session.query_binary_block(QUERY, false),
        Err(InstrumentError::Framing(_))
    ));
}

/// A block that stalls right after its marker is a framing error, not a timeout.
#[rstest]
fn read_block_stalls_after_marker() {
    let session = crt_session(vec![InstReply::Bytes(b"#".to_vec()), InstReply::Silence]);
    assert!(matches!(
        session.query_binary_block(QUERY, false),
        Err(InstrumentError::Framing(_))
    ));
}

/// A wrong first byte is rejected right away, without waiting for more input.
#[rstest]
fn read_block_wrong_marker() {
    let session = crt_session(vec![InstReply::Bytes(b"X".to_vec())]);
    assert!(matches!(
        session.query_binary_block(QUERY, false),
        Err(InstrumentError::Framing(_))
    ));
}

/// A stream that ends inside the prefix is a framing error.
#[rstest]
fn read_block_eof_in_prefix() {
    let port: VecDeque<u8> = b"#".iter().copied().collect();
    let mut transport = StreamTransport::new(port, Duration::from_millis(10)).unwrap();
    assert!(matches!(
        read_block(&mut transport, false, Duration::from_millis(5)),
        Err(InstrumentError::Framing(_))
    ));
}

/// No answer at all is a plain query timeout.
#[rstest]
fn read_block_no_response() {
    let session = crt_session(vec![InstReply::Silence]);
    match session.query_binary_block(QUERY, true) {
        Err(InstrumentError::TimeoutQuery { query, .. }) => assert_eq!(query, QUERY),
        other => panic!("Expected query timeout, got {other:?}"),
    }
}

#[rstest]
fn encode_block_header() {
    assert_eq!(encode_block(b"").unwrap(), b"#10");
    assert_eq!(encode_block(&[7u8; 12]).unwrap()[..4], *b"#212");
}
