//! Loopback transport for testing drivers that talk to their instrument in lines, raw bytes, and
//! service requests.

use std::{
    collections::VecDeque,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    InstrumentError, ServiceRequestHandler, StatusByte, Transport,
    loopback::{IncrIndex, ServiceRequestLine},
};

/// The host command entry that stands for a device clear in a loopback script.
pub const DEVICE_CLEAR: &str = "<device clear>";

/// One reply of the simulated instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum InstReply {
    /// A response line. The expected terminator is appended when it is sent.
    Line(String),
    /// Raw bytes that are sent as they are, e.g., a binary block.
    Bytes(Vec<u8>),
    /// The instrument stays silent: the read that needs the next byte times out.
    Silence,
}

impl From<&str> for InstReply {
    fn from(value: &str) -> Self {
        InstReply::Line(value.to_string())
    }
}

impl From<String> for InstReply {
    fn from(value: String) -> Self {
        InstReply::Line(value)
    }
}

impl From<Vec<u8>> for InstReply {
    fn from(value: Vec<u8>) -> Self {
        InstReply::Bytes(value)
    }
}

/// A service request that is raised after a given host command.
struct ScriptedSrq {
    after: String,
    status: StatusByte,
    delay: Duration,
}

/// A transport that allows you to simply write tests for your instrument driver.
///
/// # Example
///
/// Let us build a simple instrument that triggers a measurement, waits for the instrument to
/// signal completion with a service request, and fetches the result. Then we write a test for it
/// using the [`LoopbackTransport`].
///
/// ```
/// use std::time::Duration;
///
/// use scpisession::{InstrumentError, LoopbackTransport, Session, StatusByte, Transport};
///
/// struct MyCounter<T: Transport> {
///     session: Session<T>,
/// }
///
/// impl<T: Transport> MyCounter<T> {
///     fn measure(&mut self) -> Result<f64, InstrumentError> {
///         self.session.arm_and_send(0x20, ":INIT;*OPC")?;
///         self.session.wait_for_service_request()?;
///         self.session.query_number("Fetch?")
///     }
/// }
///
/// let loopback = LoopbackTransport::lines(&[":INIT;*OPC", "Fetch?"], &["1.000000E+08"])
///     .with_service_request(":INIT;*OPC", StatusByte::new(0x60), Duration::from_millis(10));
/// let mut counter = MyCounter { session: Session::new(loopback).unwrap() };
/// assert_eq!(counter.measure().unwrap(), 1e8);
/// ```
///
/// When the transport is dropped, it panics if any scripted command, reply, or service request
/// was not used. Sending an unexpected command panics right away.
pub struct LoopbackTransport {
    from_host: Vec<String>,
    from_inst: Vec<InstReply>,
    terminator_exp: String,
    from_host_index: IncrIndex,
    from_inst_index: IncrIndex,
    curr_bytes: VecDeque<u8>,
    terminator: String,
    timeout: Duration,
    srq_line: ServiceRequestLine,
    srq_script: VecDeque<ScriptedSrq>,
    notifiers: Vec<JoinHandle<bool>>,
}

impl LoopbackTransport {
    /// Create a new loopback transport with given commands to and replies from the instrument.
    ///
    /// The commands and replies are used in order. Use [`DEVICE_CLEAR`] in `from_host` where the
    /// driver is expected to clear the device.
    ///
    /// # Arguments:
    /// * `from_host` - Commands from host to instrument, without terminator.
    /// * `from_inst` - Replies from instrument to host.
    /// * `terminator_exp` - The terminator that the driver is expected to use.
    pub fn new(from_host: Vec<String>, from_inst: Vec<InstReply>, terminator_exp: &str) -> Self {
        LoopbackTransport {
            from_host,
            from_inst,
            terminator_exp: terminator_exp.to_string(),
            from_host_index: IncrIndex::default(),
            from_inst_index: IncrIndex::default(),
            curr_bytes: VecDeque::new(),
            terminator: "\n".to_string(), // default terminator, as transports
            timeout: Duration::from_secs(3),
            srq_line: ServiceRequestLine::default(),
            srq_script: VecDeque::new(),
            notifiers: Vec::new(),
        }
    }

    /// Create a loopback transport from string slices with `"\n"` as the expected terminator.
    pub fn lines(from_host: &[&str], from_inst: &[&str]) -> Self {
        Self::new(
            from_host.iter().map(|s| s.to_string()).collect(),
            from_inst.iter().map(|&s| InstReply::from(s)).collect(),
            "\n",
        )
    }

    /// Raise a service request after the host sent the command `after`.
    ///
    /// The request is raised from a separate thread after `delay`, like a real transport does
    /// from its notification thread. Scripted requests are matched in the order they are added.
    pub fn with_service_request(mut self, after: &str, status: StatusByte, delay: Duration) -> Self {
        self.srq_script.push_back(ScriptedSrq {
            after: after.to_string(),
            status,
            delay,
        });
        self
    }

    /// Get the simulated SRQ line, e.g., to raise requests at arbitrary times from a test.
    pub fn service_request_line(&self) -> ServiceRequestLine {
        self.srq_line.clone()
    }

    /// This command panics if not all commands in the [`LoopbackTransport`] have been used.
    ///
    /// It is automatically called when the [`LoopbackTransport`] is dropped, but you can also call
    /// it manually to ensure that all commands have been used. Threads raising scripted service
    /// requests are joined first.
    pub fn finalize(&mut self) {
        for notifier in self.notifiers.drain(..) {
            let _ = notifier.join();
        }
        let from_host_leftover = self.from_host.get(self.from_host_index.next());
        let from_inst_leftover = self.from_inst.get(self.from_inst_index.next());
        if let Some(fhl) = from_host_leftover {
            panic!("Leftover expected commands found from host to instrument: {fhl}");
        }
        if let Some(fil) = from_inst_leftover {
            panic!("Leftover expected replies found from instrument to host: {fil:?}");
        }
        if let Some(srq) = self.srq_script.front() {
            panic!(
                "Leftover service request expected after command: {}",
                srq.after
            );
        }
    }

    /// Test the transport's terminator and ensure the right one is set.
    pub fn test_terminator(&self, expected_terminator: &str) {
        assert_eq!(
            expected_terminator, self.terminator,
            "Expected terminator '{expected_terminator}', got '{}'",
            self.terminator
        );
    }

    /// Get the next command from host to instrument, or panic.
    fn get_next_from_host(&mut self) -> &str {
        self.from_host
            .get(self.from_host_index.next())
            .expect("No more commands were expected from host to instrument.")
    }

    /// Get the next reply from instrument to host, or panic.
    fn get_next_from_inst(&mut self) -> InstReply {
        self.from_inst
            .get(self.from_inst_index.next())
            .cloned()
            .expect("No more replies were expected from instrument to host.")
    }

    /// Read exactly one byte from the current reply, pulling in the next reply if required.
    ///
    /// This panics if there are no more replies. If there are no more replies but one is
    /// required, the panic is justified as this is a test transport.
    fn read_one_byte(&mut self) -> Result<u8, InstrumentError> {
        loop {
            if let Some(byte) = self.curr_bytes.pop_front() {
                return Ok(byte);
            }
            match self.get_next_from_inst() {
                InstReply::Line(line) => {
                    let line = format!("{line}{}", self.terminator_exp);
                    self.curr_bytes = line.into_bytes().into();
                }
                InstReply::Bytes(bytes) => self.curr_bytes = bytes.into(),
                InstReply::Silence => return Err(InstrumentError::Timeout(self.timeout)),
            }
        }
    }

    /// Start the scripted service request if `cmd` is the one it waits for.
    fn trigger_scripted_srq(&mut self, cmd: &str) {
        if self.srq_script.front().is_some_and(|srq| srq.after == cmd) {
            if let Some(srq) = self.srq_script.pop_front() {
                let line = self.srq_line.clone();
                self.notifiers.push(thread::spawn(move || {
                    thread::sleep(srq.delay);
                    line.fire(srq.status)
                }));
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), InstrumentError> {
        for byte in buf.iter_mut() {
            *byte = self.read_one_byte()?;
        }
        Ok(())
    }

    fn write_raw(&mut self, cmd: &[u8]) -> Result<(), InstrumentError> {
        let exp = self.get_next_from_host().to_string();
        let exp_with_term = format!("{exp}{}", self.terminator_exp);
        assert_eq!(
            exp_with_term.as_bytes(),
            cmd,
            "Expected sendcmd '{0}', got '{1:?}'",
            exp_with_term,
            std::str::from_utf8(cmd)
        );
        self.trigger_scripted_srq(&exp);
        Ok(())
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
        self.timeout = timeout;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), InstrumentError> {
        let exp = self.get_next_from_host();
        assert_eq!(exp, DEVICE_CLEAR, "Expected sendcmd '{exp}', got a device clear");
        self.curr_bytes.clear();
        Ok(())
    }

    fn on_service_request(&mut self, handler: ServiceRequestHandler) -> Result<(), InstrumentError> {
        self.srq_line.register(handler);
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if !thread::panicking() {
            self.finalize();
        }
    }
}
