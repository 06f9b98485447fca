//! An explicit factory that opens sessions from resource addresses.
//!
//! Applications create one [`ResourceManager`] and pass it to whoever needs to connect to an
//! instrument. There is no global instance.

use std::{
    fmt::{self, Display},
    str::FromStr,
    time::Duration,
};

use tracing::info;

use crate::{InstrumentError, Session, SessionConfig, TcpIpTransport, Transport};

/// Timeout used when the configuration does not set one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Address of an instrument resource.
///
/// Parses the VISA style resource strings of the transports that this crate provides:
///
/// - `TCPIP0::192.168.1.145::5555::SOCKET` or simply `192.168.1.145:5555` for a raw socket.
/// - `ASRL/dev/ttyUSB0::INSTR` or `ASRL3::INSTR` (i.e., `COM3`) for a serial port.
///
/// GPIB and VXI-11 resources need a vendor transport. Open those yourself and hand the transport
/// to [`Session::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAddress {
    /// A raw TCP/IP socket.
    TcpSocket {
        /// Host name or IP address.
        host: String,
        /// Port number.
        port: u16,
    },
    /// A serial port.
    Serial {
        /// The name of the serial port, e.g., `"/dev/ttyUSB0"` or `"COM3"`.
        port: String,
    },
}

impl FromStr for ResourceAddress {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split("::").collect();
        let interface = parts[0].to_ascii_uppercase();

        if interface.starts_with("TCPIP") {
            return match parts.as_slice() {
                [_, host, port, suffix] if suffix.eq_ignore_ascii_case("SOCKET") => {
                    Ok(ResourceAddress::TcpSocket {
                        host: host.to_string(),
                        port: parse_port(port, s)?,
                    })
                }
                _ => Err(unsupported(s, "only raw TCP/IP sockets (::SOCKET) are supported")),
            };
        }

        if interface.starts_with("ASRL") {
            return match parts.as_slice() {
                [asrl, suffix] if suffix.eq_ignore_ascii_case("INSTR") => {
                    let port = &asrl[4..];
                    if port.is_empty() {
                        return Err(unsupported(s, "serial port is missing"));
                    }
                    let port = if port.chars().all(|c| c.is_ascii_digit()) {
                        format!("COM{port}")
                    } else {
                        port.to_string()
                    };
                    Ok(ResourceAddress::Serial { port })
                }
                _ => Err(unsupported(s, "expected ASRL<port>::INSTR")),
            };
        }

        if interface.starts_with("GPIB") || interface.starts_with("USB") {
            return Err(unsupported(s, "this interface needs a vendor transport"));
        }

        match s.rsplit_once(':') {
            Some((host, port)) if parts.len() == 1 && !host.is_empty() => {
                Ok(ResourceAddress::TcpSocket {
                    host: host.to_string(),
                    port: parse_port(port, s)?,
                })
            }
            _ => Err(unsupported(s, "unknown resource format")),
        }
    }
}

impl Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceAddress::TcpSocket { host, port } => write!(f, "TCPIP0::{host}::{port}::SOCKET"),
            ResourceAddress::Serial { port } => write!(f, "ASRL{port}::INSTR"),
        }
    }
}

fn parse_port(port: &str, resource: &str) -> Result<u16, InstrumentError> {
    port.parse()
        .map_err(|_| unsupported(resource, "port must be a number from 0 to 65535"))
}

fn unsupported(resource: &str, reason: &str) -> InstrumentError {
    InstrumentError::InvalidArgument(format!("Cannot open resource '{resource}': {reason}"))
}

/// Opens sessions for resource addresses with a shared [`SessionConfig`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use scpisession::{ResourceManager, SessionConfig};
///
/// let rm = ResourceManager::new(SessionConfig::default().with_timeout(Duration::from_secs(20)));
/// let scope = rm.open("TCPIP0::192.168.1.145::5555::SOCKET").unwrap();
/// println!("{}", scope.query_text("*IDN?").unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct ResourceManager {
    config: SessionConfig,
    #[cfg_attr(not(feature = "serial"), allow(dead_code))]
    baud_rate: u32,
}

impl ResourceManager {
    /// Create a resource manager that opens all sessions with `config`.
    pub fn new(config: SessionConfig) -> Self {
        ResourceManager {
            config,
            baud_rate: 9600,
        }
    }

    /// Set the baud rate used for serial resources. Defaults to 9600.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// The configuration applied to every opened session.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Parse the resource address and open a session on it.
    pub fn open(&self, resource: &str) -> Result<Session<Box<dyn Transport>>, InstrumentError> {
        let address: ResourceAddress = resource.parse()?;
        self.open_address(&address)
    }

    /// Open a session on the given address.
    pub fn open_address(
        &self,
        address: &ResourceAddress,
    ) -> Result<Session<Box<dyn Transport>>, InstrumentError> {
        let timeout = self.config.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let transport: Box<dyn Transport> = match address {
            ResourceAddress::TcpSocket { host, port } => Box::new(TcpIpTransport::with_timeout(
                (host.as_str(), *port),
                timeout,
            )?),
            ResourceAddress::Serial { port } => self.open_serial(port, timeout)?,
        };
        info!(%address, "Opened instrument resource");
        Session::with_config(transport, &self.config)
    }

    #[cfg(feature = "serial")]
    fn open_serial(&self, port: &str, timeout: Duration) -> Result<Box<dyn Transport>, InstrumentError> {
        let spb = serialport::new(port, self.baud_rate).timeout(timeout);
        Ok(Box::new(crate::SerialTransport::full(spb)?))
    }

    #[cfg(not(feature = "serial"))]
    fn open_serial(&self, port: &str, _timeout: Duration) -> Result<Box<dyn Transport>, InstrumentError> {
        Err(unsupported(port, "serial resources need the `serial` feature"))
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
