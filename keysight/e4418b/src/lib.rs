//! A rust driver for the Keysight (formerly Agilent) E4418B single channel power meter.
//!
//! Zeroing, calibration, and measurements are started with `*OPC` set, and the driver waits for
//! the meter to request service on operation complete. This needs a transport that delivers
//! service requests, e.g., a GPIB transport.
//!
//! # Example
//!
//! ```no_run
//! use measurements::Frequency;
//! use scpisession::{InstrumentError, Transport};
//!
//! use keysight_e4418b::E4418b;
//!
//! fn run<T: Transport>(transport: T) -> Result<(), InstrumentError> {
//!     let mut meter = E4418b::try_new(transport)?;
//!     meter.zero_and_calibrate()?;
//!     let dbm = meter.measure_power(Frequency::from_megahertz(50.0))?;
//!     println!("Power: {dbm} dBm");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod status;

pub use status::StatusBit;

use std::time::Duration;

use measurements::{Frequency, Power};
use tracing::{debug, info, warn};

use scpisession::{InstrumentError, Session, SessionConfig, StatusFlag, Transport};

const TIMEOUT: Duration = Duration::from_secs(20);

/// A rust driver for the E4418B.
pub struct E4418b<T: Transport> {
    session: Session<T>,
}

impl<T: Transport> E4418b<T> {
    /// Create a new E4418B instance with the given transport.
    ///
    /// The session is opened with a 20 s timeout and a device clear, then the meter is reset.
    pub fn try_new(transport: T) -> Result<Self, InstrumentError> {
        let config = SessionConfig::default()
            .with_timeout(TIMEOUT)
            .with_clear_on_open(true);
        Self::from_session(Session::with_config(transport, &config)?)
    }

    /// Create a new E4418B instance on an already opened session and reset the meter.
    pub fn from_session(session: Session<T>) -> Result<Self, InstrumentError> {
        let instrument = E4418b { session };
        for cmd in ["*RST", "*CLS", "*SRE 0", "*ESE 0"] {
            instrument.session.send(cmd)?;
        }
        Ok(instrument)
    }

    /// Zero and calibrate the sensor.
    ///
    /// The sensor must be connected to the meter's power reference. Calibration errors, including
    /// a timeout, are returned.
    pub fn zero_and_calibrate(&mut self) -> Result<(), InstrumentError> {
        self.enable_opc_request()?;
        self.session.send(":CAL1:ALL")?;
        let done = self
            .session
            .arm_and_send(StatusBit::EventStatus.mask(), "*OPC")
            .and_then(|_| self.session.wait_for_service_request());
        let disable = self
            .session
            .send("*SRE 0")
            .and_then(|_| self.session.send("*ESE 0"));
        let status = done?;
        disable?;
        info!(flags = ?StatusBit::decode(status), "Sensor zeroed and calibrated");
        Ok(())
    }

    /// Measure the power in dBm at the given signal frequency.
    ///
    /// The frequency is used by the meter to apply the sensor's calibration factor. If the meter
    /// does not complete the measurement before the timeout, the bus is cleared and 0 dBm is
    /// returned.
    pub fn measure_power(&mut self, frequency: Frequency) -> Result<f64, InstrumentError> {
        self.session
            .send(&format!(":FREQ {}MHZ", frequency.as_megahertz()))?;
        self.enable_opc_request()?;

        let result = self.trigger_and_fetch();
        let disable = self
            .session
            .send("*ESE 0")
            .and_then(|_| self.session.send("*SRE 0"));
        let dbm = result?;
        disable?;
        Ok(dbm)
    }

    /// Like [`E4418b::measure_power`], but returns the power as a [`Power`].
    pub fn measure_power_watts(&mut self, frequency: Frequency) -> Result<Power, InstrumentError> {
        Ok(dbm_to_power(self.measure_power(frequency)?))
    }

    /// The session this driver talks through.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Request service when an operation completes.
    fn enable_opc_request(&self) -> Result<(), InstrumentError> {
        self.session.send("*ESE 1")?;
        self.session
            .send(&format!("*SRE {}", StatusBit::EventStatus.mask()))
    }

    fn trigger_and_fetch(&self) -> Result<f64, InstrumentError> {
        self.session
            .arm_and_send(StatusBit::EventStatus.mask(), ":CONF1;:INIT;*OPC")?;
        match self.session.wait_for_service_request() {
            Ok(status) => debug!(flags = ?StatusBit::decode(status), "Measurement complete"),
            Err(err) if err.is_timeout() => {
                warn!(%err, "No measurement, returning 0 dBm");
                self.session.clear()?;
                return Ok(0.0);
            }
            Err(err) => return Err(err),
        }
        self.session.query_number_or_default("Fetch?")
    }
}

/// Convert a power level in dBm to a [`Power`].
pub fn dbm_to_power(dbm: f64) -> Power {
    Power::from_watts(10f64.powf(dbm / 10.0) * 1e-3)
}
