//! Tests for the [`StreamTransport`] itself.
//!
//! Line handling on top of scripted replies is tested with the [`scpisession::LoopbackTransport`]
//! in the session tests.

use std::{collections::VecDeque, time::Duration};

use rstest::*;

use scpisession::{InstrumentError, Session, StreamTransport, Transport};

/// Set up an empty transport with default 3 second timeout.
#[fixture]
fn empt_trsp() -> StreamTransport<VecDeque<u8>> {
    StreamTransport::new(VecDeque::new(), Duration::from_secs(3)).unwrap()
}

/// Set up a transport with a pending response without terminator and no timeout duration.
#[fixture]
fn no_term_trsp() -> StreamTransport<VecDeque<u8>> {
    StreamTransport::new(VecDeque::from(b"resp".to_vec()), Duration::from_secs(0)).unwrap()
}

#[rstest]
fn test_stream_terminator(mut empt_trsp: StreamTransport<VecDeque<u8>>) {
    assert_eq!(empt_trsp.get_terminator(), "\n");

    empt_trsp.set_terminator("\r\n");
    assert_eq!(empt_trsp.get_terminator(), "\r\n");
}

#[rstest]
fn test_stream_timeout(mut empt_trsp: StreamTransport<VecDeque<u8>>) {
    assert_eq!(empt_trsp.get_timeout(), Duration::from_secs(3));

    empt_trsp.set_timeout(Duration::from_millis(250)).unwrap();
    assert_eq!(empt_trsp.get_timeout(), Duration::from_millis(250));
}

#[rstest]
fn test_stream_write_read(mut empt_trsp: StreamTransport<VecDeque<u8>>) {
    let data = b"Hello, Instrument!";
    empt_trsp.write_raw(data).unwrap();

    let mut buf = vec![0; data.len()];
    empt_trsp.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, data);
}

#[rstest]
fn test_stream_write_read_line(mut empt_trsp: StreamTransport<VecDeque<u8>>) {
    empt_trsp.set_terminator("\r\n");
    empt_trsp.write_line("*IDN?").unwrap();
    assert_eq!(empt_trsp.read_line().unwrap(), "*IDN?");
}

#[rstest]
fn test_stream_read_line_timeout(mut no_term_trsp: StreamTransport<VecDeque<u8>>) {
    match no_term_trsp.read_line() {
        Err(InstrumentError::Timeout(timeout)) => {
            assert_eq!(Duration::from_secs(0), timeout);
        }
        other => panic!("Expected timeout error, but got {other:?}"),
    }
}

#[rstest]
fn test_stream_read_past_end(mut empt_trsp: StreamTransport<VecDeque<u8>>) {
    assert!(matches!(
        empt_trsp.read_bytes(1),
        Err(InstrumentError::Io(_))
    ));
}

#[rstest]
fn test_stream_clear_discards_pending_input(mut no_term_trsp: StreamTransport<VecDeque<u8>>) {
    no_term_trsp.clear().unwrap();
    no_term_trsp.write_raw(b"new").unwrap();
    assert_eq!(no_term_trsp.read_bytes(3).unwrap(), b"new");
}

/// A query on a session reports the timeout together with the query that was sent.
#[rstest]
fn test_session_query_timeout(no_term_trsp: StreamTransport<VecDeque<u8>>) {
    let session = Session::new(no_term_trsp).unwrap();

    match session.query_text("QUERY") {
        Err(InstrumentError::TimeoutQuery { query, timeout }) => {
            assert_eq!("QUERY", query);
            assert_eq!(Duration::from_secs(0), timeout);
        }
        other => panic!("Expected timeout error, but got {other:?}"),
    }
}

/// Byte streams have no SRQ line, so arming must fail while queries keep working.
#[rstest]
fn test_session_without_service_request(empt_trsp: StreamTransport<VecDeque<u8>>) {
    let session = Session::new(empt_trsp).unwrap();
    assert!(!session.supports_service_request());
    assert!(matches!(
        session.arm(0x20),
        Err(InstrumentError::ServiceRequestNotSupported)
    ));

    // The port echoes, so the query reads back its own command.
    assert_eq!(session.query_text("*OPC?").unwrap(), "*OPC?");
}
