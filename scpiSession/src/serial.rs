//! This module provides the transport for an instrument controlled via a serial port.
//!
//! It includes a blocking implementation using the `serialport` crate.

use std::{io, time::Duration};

use serialport::{SerialPort, SerialPortBuilder};

use crate::{InstrumentError, Port, StreamTransport};

impl Port for Box<dyn SerialPort> {
    fn set_port_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }
}

/// A blocking serial port transport using the `serialport` crate.
#[derive(Debug)]
pub struct SerialTransport {}

impl SerialTransport {
    /// Try to create a new serial transport with a simple configuration.
    ///
    /// Only the port name and the baud rate can be set. The timeout is set to three seconds. If
    /// you need parity, stop bits, or flow control, use [`SerialTransport::full`].
    ///
    /// # Arguments
    /// * `port` - The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
    /// * `baud` - The baud rate.
    pub fn simple(
        port: &str,
        baud: u32,
    ) -> Result<StreamTransport<Box<dyn SerialPort>>, InstrumentError> {
        let timeout = Duration::from_secs(3);
        let spb = serialport::new(port, baud).timeout(timeout);
        Self::full(spb)
    }

    /// Try to create a new serial transport from a fully configured [`SerialPortBuilder`].
    ///
    /// The timeout configured in the builder becomes the transport timeout.
    pub fn full(spb: SerialPortBuilder) -> Result<StreamTransport<Box<dyn SerialPort>>, InstrumentError> {
        let port = spb.open()?;
        let timeout = port.timeout();
        StreamTransport::new(port, timeout)
    }
}
