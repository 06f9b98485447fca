//! The command session: ordered, mutually exclusive command/response exchanges over one
//! transport, plus service request gating.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    InstrumentError, OperationId, ServiceRequestGate, SessionConfig, StatusByte, Transport,
    read_block,
};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session was created, but no exchange happened yet.
    Open,
    /// At least one exchange went through the transport.
    Active,
    /// The session was closed and the transport released.
    Closed,
}

struct SessionInner<T: Transport> {
    transport: Option<T>,
    state: SessionState,
}

/// A command session with one instrument.
///
/// All operations take the same session-wide lock for the full duration of a command/response
/// round trip, so exchanges from different threads never interleave. Cloning a session is cheap
/// and gives another handle to the same transport, e.g., for the channels of a driver or for a
/// worker thread.
///
/// Waiting for a service request does not hold the session lock, so the session stays usable
/// while one thread waits.
pub struct Session<T: Transport> {
    inner: Arc<Mutex<SessionInner<T>>>,
    gate: Arc<ServiceRequestGate>,
    srq_supported: bool,
    drain_timeout: Duration,
}

impl<T: Transport> Session<T> {
    /// Open a session on the given transport with the default [`SessionConfig`].
    pub fn new(transport: T) -> Result<Self, InstrumentError> {
        Self::with_config(transport, &SessionConfig::default())
    }

    /// Open a session on the given transport and apply the configuration to it.
    ///
    /// The session registers its [`ServiceRequestGate`] with the transport. Transports without
    /// service request support are accepted, but arming fails on them.
    pub fn with_config(mut transport: T, config: &SessionConfig) -> Result<Self, InstrumentError> {
        if let Some(terminator) = &config.terminator {
            transport.set_terminator(terminator);
        }
        if let Some(timeout) = config.timeout {
            transport.set_timeout(timeout)?;
        }

        let gate = Arc::new(ServiceRequestGate::new());
        let srq_supported = match transport.on_service_request(gate.handler()) {
            Ok(()) => true,
            Err(InstrumentError::ServiceRequestNotSupported) => {
                debug!("Transport does not support service requests");
                false
            }
            Err(err) => return Err(err),
        };

        if config.clear_on_open {
            transport.clear()?;
        }

        Ok(Session {
            inner: Arc::new(Mutex::new(SessionInner {
                transport: Some(transport),
                state: SessionState::Open,
            })),
            gate,
            srq_supported,
            drain_timeout: config.drain_timeout,
        })
    }

    /// Send a command to the instrument. No response is expected.
    pub fn send(&self, cmd: &str) -> Result<(), InstrumentError> {
        check_command(cmd)?;
        trace!(cmd, "Send");
        self.with_transport(|transport| transport.write_line(cmd))
    }

    /// Send a query and return the response line.
    ///
    /// The response is returned without its terminator but otherwise untouched, i.e., leading
    /// and trailing whitespace is kept.
    pub fn query_text(&self, cmd: &str) -> Result<String, InstrumentError> {
        check_command(cmd)?;
        let response = self.with_transport(|transport| {
            transport.write_line(cmd)?;
            transport.read_line().map_err(|err| err.with_query(cmd))
        })?;
        trace!(cmd, response = %response, "Query");
        Ok(response)
    }

    /// Read one response line without sending a command.
    ///
    /// Some instruments, e.g., older HP-IB instruments, put a reading in their output buffer
    /// whenever a measurement completes. Read it with this after the service request.
    pub fn read_text(&self) -> Result<String, InstrumentError> {
        let response = self.with_transport(|transport| transport.read_line())?;
        trace!(response = %response, "Read");
        Ok(response)
    }

    /// Read one response line without sending a command and parse it as a number.
    ///
    /// See [`Session::query_number`] for the accepted formats.
    pub fn read_number(&self) -> Result<f64, InstrumentError> {
        let response = self.read_text()?;
        parse_number(&response)
    }

    /// Send a query and parse the first token of the response as a number.
    ///
    /// Decimal and scientific notation are accepted, e.g., `"1.000000E+08"`. A response that is
    /// not numeric fails with [`InstrumentError::ResponseParseError`], no response before the
    /// transport timeout fails with [`InstrumentError::TimeoutQuery`].
    pub fn query_number(&self, cmd: &str) -> Result<f64, InstrumentError> {
        let response = self.query_text(cmd)?;
        parse_number(&response)
    }

    /// Like [`Session::query_number`], but a timeout clears the transport and returns `0.0`.
    ///
    /// Noisy or misconfigured instruments may fail to answer now and then. Use this in
    /// measurement series where one missing reading must not stop the whole run. All other
    /// errors are returned as usual.
    pub fn query_number_or_default(&self, cmd: &str) -> Result<f64, InstrumentError> {
        match self.query_number(cmd) {
            Err(err) if err.is_timeout() => {
                warn!(cmd, %err, "Query timed out, substituting 0");
                if let Err(clear_err) = self.clear() {
                    warn!(%clear_err, "Could not clear transport after timeout");
                }
                Ok(0.0)
            }
            other => other,
        }
    }

    /// Send a query and read the response as an IEEE-488.2 definite-length arbitrary block.
    ///
    /// Returns exactly the payload. Malformed or truncated blocks fail with
    /// [`InstrumentError::Framing`]. If `drain_terminator` is set, a trailing terminator byte
    /// is read and discarded if one arrives within the drain timeout.
    pub fn query_binary_block(
        &self,
        cmd: &str,
        drain_terminator: bool,
    ) -> Result<Vec<u8>, InstrumentError> {
        check_command(cmd)?;
        let drain_timeout = self.drain_timeout;
        let payload = self.with_transport(|transport| {
            transport.write_line(cmd)?;
            read_block(transport, drain_terminator, drain_timeout).map_err(|err| err.with_query(cmd))
        })?;
        trace!(cmd, length = payload.len(), "Binary block query");
        Ok(payload)
    }

    /// Clear the I/O state of the device.
    pub fn clear(&self) -> Result<(), InstrumentError> {
        debug!("Clear");
        self.with_transport(|transport| transport.clear())
    }

    /// Get the I/O timeout of the transport.
    pub fn timeout(&self) -> Result<Duration, InstrumentError> {
        self.with_transport(|transport| Ok(transport.get_timeout()))
    }

    /// Set the I/O timeout of the transport. This is also the default service request timeout.
    pub fn set_timeout(&self, timeout: Duration) -> Result<(), InstrumentError> {
        self.with_transport(|transport| transport.set_timeout(timeout))
    }

    /// Set the line terminator of the transport.
    pub fn set_terminator(&self, terminator: &str) -> Result<(), InstrumentError> {
        self.with_transport(|transport| {
            transport.set_terminator(terminator);
            Ok(())
        })
    }

    /// Arm the service request gate. See [`ServiceRequestGate::arm`].
    ///
    /// Enable the matching condition on the instrument before triggering the operation.
    pub fn arm(&self, mask: u8) -> Result<OperationId, InstrumentError> {
        if self.state() == SessionState::Closed {
            return Err(InstrumentError::SessionClosed);
        }
        if !self.srq_supported {
            return Err(InstrumentError::ServiceRequestNotSupported);
        }
        self.gate.arm(mask)
    }

    /// Arm the service request gate and send the command that triggers the operation.
    ///
    /// If sending fails, the gate is disarmed again before the error is returned.
    pub fn arm_and_send(&self, mask: u8, cmd: &str) -> Result<OperationId, InstrumentError> {
        let id = self.arm(mask)?;
        if let Err(err) = self.send(cmd) {
            self.gate.disarm();
            return Err(err);
        }
        Ok(id)
    }

    /// Block until the armed operation is signaled, using the session timeout.
    pub fn wait_for_service_request(&self) -> Result<StatusByte, InstrumentError> {
        let timeout = self.timeout()?;
        self.gate.wait(timeout)
    }

    /// Block until the armed operation is signaled, using the given timeout.
    pub fn wait_for_service_request_timeout(
        &self,
        timeout: Duration,
    ) -> Result<StatusByte, InstrumentError> {
        self.gate.wait(timeout)
    }

    /// Disarm the service request gate without waiting. Returns `true` if an operation was armed.
    pub fn disarm(&self) -> bool {
        self.gate.disarm()
    }

    /// The service request gate of this session.
    pub fn gate(&self) -> &ServiceRequestGate {
        &self.gate
    }

    /// Returns `true` if the transport delivers service requests.
    pub fn supports_service_request(&self) -> bool {
        self.srq_supported
    }

    /// The lifecycle state of this session.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Close the session and release the transport.
    ///
    /// All handles of this session are affected. Later operations fail with
    /// [`InstrumentError::SessionClosed`]. Closing a closed session does nothing.
    pub fn close(&self) {
        let transport = {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Closed;
            inner.transport.take()
        };
        self.gate.disarm();
        if transport.is_some() {
            debug!("Session closed");
        }
    }

    /// Run `f` on the transport while holding the session lock.
    fn with_transport<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, InstrumentError>,
    ) -> Result<R, InstrumentError> {
        let mut inner = self.inner.lock();
        let SessionInner { transport, state } = &mut *inner;
        let transport = transport.as_mut().ok_or(InstrumentError::SessionClosed)?;
        if *state == SessionState::Open {
            *state = SessionState::Active;
        }
        f(transport)
    }
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            gate: Arc::clone(&self.gate),
            srq_supported: self.srq_supported,
            drain_timeout: self.drain_timeout,
        }
    }
}

/// Reject empty commands before they reach the transport.
fn check_command(cmd: &str) -> Result<(), InstrumentError> {
    if cmd.trim().is_empty() {
        return Err(InstrumentError::InvalidArgument(
            "Command must not be empty.".to_string(),
        ));
    }
    Ok(())
}

/// Parse the first token of a response as a number.
fn parse_number(response: &str) -> Result<f64, InstrumentError> {
    let token = response
        .split(|c: char| c == ',' || c.is_whitespace())
        .find(|token| !token.is_empty())
        .unwrap_or_default();
    token
        .parse::<f64>()
        .map_err(|_| InstrumentError::ResponseParseError(response.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_scientific() {
        assert_eq!(parse_number("1.000000E+08").unwrap(), 100_000_000.0);
        assert_eq!(parse_number("+2.5e-3\r").unwrap(), 0.0025);
    }

    #[test]
    fn test_parse_number_first_token() {
        assert_eq!(parse_number(" 42.0,1,2").unwrap(), 42.0);
    }

    #[test]
    fn test_parse_number_error() {
        assert!(matches!(
            parse_number("OVLD"),
            Err(InstrumentError::ResponseParseError(resp)) if resp == "OVLD"
        ));
        assert!(parse_number("").is_err());
    }

    #[test]
    fn test_check_command() {
        assert!(check_command("*RST").is_ok());
        assert!(check_command("  ").is_err());
    }
}
