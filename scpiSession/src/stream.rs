//! This module provides the byte stream implementation of the [`Transport`] trait.
//!
//! It can be called with any type that implements [`Port`], i.e., [`std::io::Read`],
//! [`std::io::Write`], and a settable read timeout, such as [`std::net::TcpStream`] or
//! `serialport::SerialPort`.

use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read, Write},
    net::TcpStream,
    time::Duration,
};

use tracing::debug;

use crate::{InstrumentError, Transport};

/// The timeout used while draining stale input on a device clear.
const CLEAR_TIMEOUT: Duration = Duration::from_millis(10);

/// The shortest timeout that is handed to the port, as some ports refuse a zero timeout.
const MIN_PORT_TIMEOUT: Duration = Duration::from_millis(1);

/// A byte port that a [`StreamTransport`] can drive.
pub trait Port: Read + Write + Send {
    /// Set the read and write timeout of the port.
    fn set_port_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Port for TcpStream {
    fn set_port_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))?;
        self.set_write_timeout(Some(timeout))
    }
}

impl Port for VecDeque<u8> {
    fn set_port_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// A general transport that can be built with any [`Port`].
///
/// Byte streams carry no SRQ line, so this transport cannot deliver service requests. Sessions
/// on top of it support all command and query operations, but arming fails with
/// [`InstrumentError::ServiceRequestNotSupported`].
///
/// # Example
///
/// ```no_run
/// use std::{net::TcpStream, time::Duration};
///
/// use scpisession::StreamTransport;
///
/// let my_port = TcpStream::connect("192.168.10.1:5025").unwrap();
/// let transport = StreamTransport::new(my_port, Duration::from_secs(3)).unwrap();
/// ```
pub struct StreamTransport<P: Port> {
    port: P,
    terminator: String,
    timeout: Duration,
}

impl<P: Port> StreamTransport<P> {
    /// Create a new [`StreamTransport`] and apply the timeout to the port.
    pub fn new(mut port: P, timeout: Duration) -> Result<Self, InstrumentError> {
        port.set_port_timeout(timeout.max(MIN_PORT_TIMEOUT))?;
        Ok(Self {
            port,
            terminator: "\n".to_string(),
            timeout,
        })
    }

    /// Map port errors, turning expired reads into [`InstrumentError::Timeout`].
    fn map_io(&self, err: io::Error) -> InstrumentError {
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => InstrumentError::Timeout(self.timeout),
            _ => InstrumentError::Io(err),
        }
    }
}

impl<P: Port> Transport for StreamTransport<P> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        self.port.read_exact(buf).map_err(|err| self.map_io(err))
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.port.write_all(data).map_err(|err| self.map_io(err))?;
        self.port.flush().map_err(|err| self.map_io(err))
    }

    fn get_terminator(&self) -> &str {
        self.terminator.as_str()
    }

    fn set_terminator(&mut self, terminator: &str) {
        self.terminator = terminator.to_string();
    }

    fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        self.port.set_port_timeout(timeout.max(MIN_PORT_TIMEOUT))?;
        self.timeout = timeout;
        Ok(())
    }

    /// A byte stream has no device clear message, so clearing discards all pending input.
    fn clear(&mut self) -> Result<(), InstrumentError> {
        self.port.set_port_timeout(CLEAR_TIMEOUT)?;
        let mut buf = [0u8; 256];
        let mut discarded = 0;
        let result = loop {
            match self.port.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => discarded += n,
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => break Err(InstrumentError::Io(err)),
            }
        };
        self.port
            .set_port_timeout(self.timeout.max(MIN_PORT_TIMEOUT))?;
        debug!(discarded, "Cleared stream transport");
        result
    }
}
