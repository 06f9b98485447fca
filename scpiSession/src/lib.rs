//! scpiSession: Talk SCPI to your lab instruments and wait for them to tell you they are done
//!
//! This library provides the pieces that every GPIB/TCPIP instrument driver ends up writing
//! again: a [`Session`] that serializes command/response exchanges over one [`Transport`], a
//! [`ServiceRequestGate`] that lets a calling thread block until the instrument asserts a service
//! request (SRQ), and a decoder for IEEE-488.2 definite-length arbitrary blocks that instruments
//! use to transfer waveform and array data.
//!
//! # Currently implemented transports are:
//! - TCP/IP (blocking) using [`std::net::TcpStream`], see [`TcpIpTransport`].
//! - Serial (blocking) using the [`serialport`] crate, enable the `serial` feature.
//! - A [`LoopbackTransport`] to test your drivers without hardware.
//!
//! Any other transport, e.g., a vendor GPIB driver that can deliver SRQ notifications, can be used
//! by implementing the [`Transport`] trait for it.
//!
//! # Example
//!
//! A typical SRQ-gated measurement: arm the gate, send the trigger command, wait for the
//! instrument to signal completion, then fetch the result.
//!
//! ```no_run
//! use scpisession::{Session, TcpIpTransport};
//!
//! let transport = TcpIpTransport::try_new("192.168.1.145:5025").unwrap();
//! let session = Session::new(transport).unwrap();
//!
//! session.send("CONF:FREQ (@1)").unwrap();
//! session.arm_and_send(0x20, ":INIT;*OPC").unwrap();
//! session.wait_for_service_request().unwrap();
//! let freq = session.query_number("Fetch?").unwrap();
//! println!("Frequency: {freq} Hz");
//! ```
//!
//! Note that the example above would fail on arming, as a plain TCP socket has no SRQ line. Use a
//! transport that implements [`Transport::on_service_request`] for SRQ-gated operations.
//!
//! # License
//!
//! Licensed under either of
//!
//! - Apache License, Version 2.0 ([LICENSE-APACHE](http://www.apache.org/licenses/LICENSE-2.0))
//! - MIT license ([LICENSE-MIT](http://opensource.org/licenses/MIT))
//!
//! at your option.

#![warn(missing_docs)]

mod block;
mod config;
mod gate;
mod loopback;
mod resource;
#[cfg(feature = "serial")]
mod serial;
mod session;
mod status;
mod stream;
mod tcp_ip;

pub use block::{BLOCK_MARKER, BlockHeader, encode_block, read_block};
pub use config::SessionConfig;
pub use gate::{GatePhase, OperationId, ServiceRequestGate};
pub use loopback::{DEVICE_CLEAR, InstReply, LoopbackTransport, ServiceRequestLine};
pub use resource::{ResourceAddress, ResourceManager};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use session::{Session, SessionState};
pub use status::{StatusByte, StatusFlag};
pub use stream::{Port, StreamTransport};
pub use tcp_ip::TcpIpTransport;

use std::time::{Duration, Instant};

use thiserror::Error;

/// Callback that a [`Transport`] invokes on its own notification thread whenever the instrument
/// asserts SRQ. The argument is the status byte read from the instrument.
pub type ServiceRequestHandler = Box<dyn Fn(StatusByte) + Send + Sync + 'static>;

/// The error enum for sessions, transports, and instrument drivers.
///
/// For any command sending or querying, your driver should return either an empty result or a
/// result with the query where this Error is the alternative. [`InstrumentError`] makes it easy to
/// propagate all the sending commands, querying errors forward with the `?` operator such that
/// errors propagate nicely.
///
/// The variants fall into a few groups: timeouts (see [`InstrumentError::is_timeout`]), framing
/// errors of binary blocks, response parse errors, usage errors (defects in the calling code) and
/// transport errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstrumentError {
    /// A service request was armed while another one is still outstanding on this session.
    #[error("A service request is already armed for operation {0}. Disarm or wait first.")]
    AlreadyArmed(OperationId),
    /// The channel index requested is out of range. The error contains the index requested and
    /// the number of channels that are available.
    #[error(
        "Channel with index {idx} is out of range. Number of channels available: {nof_channels}"
    )]
    ChannelIndexOutOfRange {
        /// Index of the channel that is out of range.
        idx: usize,
        /// Total number of channels.
        nof_channels: usize,
    },
    /// A given float value is out of the specified range.
    #[error("Float value {value} is out of range. Allowed range is [{min}, {max}]")]
    FloatValueOutOfRange {
        /// The value that is out of range.
        value: f64,
        /// The minimum value that is allowed.
        min: f64,
        /// The maximum value that is allowed.
        max: f64,
    },
    /// A binary block received from the instrument is malformed or shorter than declared. The
    /// error contains a description of what was wrong.
    #[error("Malformed IEEE-488.2 binary block: {0}")]
    Framing(String),
    /// The called command is not supported by this transport.
    #[error("This command is not supported by this transport.")]
    InterfaceCommandNotSupported,
    /// A given integer value is out of the specified range.
    #[error("Integer value {value} is out of range. Allowed range is [{min}, {max}]")]
    IntValueOutOfRange {
        /// The value that is out of range.
        value: i64,
        /// The minimum value that is allowed.
        min: i64,
        /// The maximum value that is allowed.
        max: i64,
    },
    /// Error when an invalid argument is passed to a function. It is intended for the user.
    #[error("{0}")]
    InvalidArgument(String),
    /// Error when reading from/writing to a transport. See [`std::io::Error`] for more details.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A wait for a service request was attempted while no operation is armed, e.g., a second
    /// wait after the first one already consumed the signal, or the operation was disarmed.
    #[error("No service request is armed on this session.")]
    NotArmed,
    /// Instrument response could not be parsed because it was unexpected by the driver. This
    /// error contains the response that was received from the instrument.
    #[error("Response from instrument could not be parsed. Response was: {0}")]
    ResponseParseError(String),
    #[cfg(feature = "serial")]
    /// Serial port errors can occur when opening a serial transport. See the
    /// [`serialport::Error`] documentation for more information.
    #[error(transparent)]
    Serialport(#[from] serialport::Error),
    /// The session was closed and cannot be used anymore.
    #[error("The session is closed.")]
    SessionClosed,
    /// The transport of this session cannot deliver service request notifications.
    #[error("The transport of this session does not support service requests.")]
    ServiceRequestNotSupported,
    /// Timeout occurred while waiting for data from the instrument. The error contains the
    /// timeout that was exceeded.
    #[error(
        "Timeout occured while waiting for a response from the instrument. Timeout was set to {0:?}."
    )]
    Timeout(Duration),
    /// Timeout occurred while waiting for a response to a query. The error contains the query
    /// that was sent and the timeout that was exceeded.
    #[error(
        "Timeout occured while waiting for a response to query: {query}. Timeout was set to {timeout:?}."
    )]
    TimeoutQuery {
        /// The query that timed out.
        query: String,
        /// The timeout that was set.
        timeout: Duration,
    },
    /// Timeout occurred while waiting for a service request.
    #[error(
        "Timeout occured while waiting for a service request (mask {mask:#04x}). Timeout was set to {timeout:?}."
    )]
    TimeoutServiceRequest {
        /// The mask the operation was armed with.
        mask: u8,
        /// The timeout that was set.
        timeout: Duration,
    },
}

impl InstrumentError {
    /// Returns `true` if this error is any kind of timeout.
    ///
    /// Timeouts are the recoverable error class: drivers usually clear the transport and
    /// substitute a default value instead of aborting a measurement series.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            InstrumentError::Timeout(_)
                | InstrumentError::TimeoutQuery { .. }
                | InstrumentError::TimeoutServiceRequest { .. }
        )
    }

    /// Attach the query that was sent to a bare [`InstrumentError::Timeout`].
    pub(crate) fn with_query(self, query: &str) -> Self {
        match self {
            InstrumentError::Timeout(timeout) => InstrumentError::TimeoutQuery {
                query: query.to_string(),
                timeout,
            },
            other => other,
        }
    }
}

/// The `Transport` trait defines the byte-level channel to one instrument.
///
/// Only [`Transport::read_exact`] and [`Transport::write_raw`] are required. The line oriented
/// methods are built on top of them using the terminator and timeout. Transports that can reach
/// the instrument's SRQ line, e.g., a GPIB driver, implement [`Transport::on_service_request`].
pub trait Transport: Send {
    /// Read exactly `buf.len()` bytes from the instrument.
    ///
    /// Transports must report an expired read timeout as [`InstrumentError::Timeout`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError>;

    /// Write all bytes in `data` to the instrument and flush.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError>;

    /// Get the line terminator. Defaults to `"\n"`.
    fn get_terminator(&self) -> &str {
        "\n"
    }

    /// Set the line terminator.
    fn set_terminator(&mut self, _terminator: &str) {}

    /// Get the I/O timeout. Defaults to three seconds.
    fn get_timeout(&self) -> Duration {
        Duration::from_secs(3)
    }

    /// Set the I/O timeout.
    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), InstrumentError> {
        Err(InstrumentError::InterfaceCommandNotSupported)
    }

    /// Clear the I/O state of the device, discarding any pending response.
    fn clear(&mut self) -> Result<(), InstrumentError> {
        Err(InstrumentError::InterfaceCommandNotSupported)
    }

    /// Register the handler that is called whenever the instrument asserts SRQ.
    ///
    /// The handler is called on a thread owned by the transport and must return quickly.
    /// Registering a new handler replaces the previous one.
    fn on_service_request(&mut self, _handler: ServiceRequestHandler) -> Result<(), InstrumentError> {
        Err(InstrumentError::ServiceRequestNotSupported)
    }

    /// Write one command line, i.e., the command with the terminator appended.
    fn write_line(&mut self, line: &str) -> Result<(), InstrumentError> {
        let data = format!("{line}{}", self.get_terminator());
        self.write_raw(data.as_bytes())
    }

    /// Read one line from the instrument and return it without the terminator.
    ///
    /// Bytes are read one by one until the response ends with the terminator. If no terminator is
    /// encountered before the timeout elapses, [`InstrumentError::Timeout`] is returned.
    fn read_line(&mut self) -> Result<String, InstrumentError> {
        let terminator = self.get_terminator().as_bytes().to_vec();
        let timeout = self.get_timeout();
        let mut response = Vec::new();
        let mut single_buf = [0u8];

        let tic = Instant::now();
        loop {
            if tic.elapsed() >= timeout {
                return Err(InstrumentError::Timeout(timeout));
            }
            self.read_exact(&mut single_buf)?;
            response.push(single_buf[0]);
            if response.ends_with(&terminator) {
                response.truncate(response.len() - terminator.len());
                break;
            }
        }

        String::from_utf8(response).map_err(|err| {
            InstrumentError::ResponseParseError(String::from_utf8_lossy(err.as_bytes()).into_owned())
        })
    }

    /// Read exactly `len` raw bytes from the instrument.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, InstrumentError> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        (**self).read_exact(buf)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        (**self).write_raw(data)
    }

    fn get_terminator(&self) -> &str {
        (**self).get_terminator()
    }

    fn set_terminator(&mut self, terminator: &str) {
        (**self).set_terminator(terminator)
    }

    fn get_timeout(&self) -> Duration {
        (**self).get_timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        (**self).set_timeout(timeout)
    }

    fn clear(&mut self) -> Result<(), InstrumentError> {
        (**self).clear()
    }

    fn on_service_request(&mut self, handler: ServiceRequestHandler) -> Result<(), InstrumentError> {
        (**self).on_service_request(handler)
    }

    fn write_line(&mut self, line: &str) -> Result<(), InstrumentError> {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> Result<String, InstrumentError> {
        (**self).read_line()
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, InstrumentError> {
        (**self).read_bytes(len)
    }
}
