//! This module provides the transport for an instrument controlled via a raw TCP/IP socket.
//!
//! It includes a blocking implementation using the [`std::net::TcpStream`] struct.

use std::{
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use tracing::debug;

use crate::{InstrumentError, StreamTransport};

/// A blocking TCP/IP transport using the [`std::net::TcpStream`] struct.
#[derive(Debug)]
pub struct TcpIpTransport {}

impl TcpIpTransport {
    /// Try to create a new TCP/IP transport with a three second timeout.
    ///
    /// The terminator is by default set to `"\n"`, but can be changed using the `set_terminator`
    /// function. Note that the terminator is automatically appended to commands and reading
    /// responses will read until the terminator is found.
    ///
    /// # Arguments
    /// * `sock_addr` - Socket address, e.g., `"192.168.1.145:5555"`.
    pub fn try_new<A: ToSocketAddrs>(
        sock_addr: A,
    ) -> Result<StreamTransport<TcpStream>, InstrumentError> {
        Self::with_timeout(sock_addr, Duration::from_secs(3))
    }

    /// Try to create a new TCP/IP transport with a given timeout.
    ///
    /// The socket is configured with `TCP_NODELAY`, as command lines are short and latency
    /// matters more than throughput for instrument control.
    ///
    /// # Arguments
    /// * `sock_addr` - Socket address.
    /// * `timeout` - Read and write timeout of the socket.
    pub fn with_timeout<A: ToSocketAddrs>(
        sock_addr: A,
        timeout: Duration,
    ) -> Result<StreamTransport<TcpStream>, InstrumentError> {
        let stream = TcpStream::connect(sock_addr)?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "Connected TCP/IP transport");
        StreamTransport::new(stream, timeout)
    }
}
