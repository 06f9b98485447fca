//! A rust driver for the HP 8673B synthesized signal generator.
//!
//! The generator speaks the HP-IB codes of its time, not SCPI. Setting a CW frequency waits for
//! the source to settle, which the generator signals with a service request, and then reads back
//! the frequency the source is actually locked to.
//!
//! # Example
//!
//! ```no_run
//! use measurements::Frequency;
//! use scpisession::{InstrumentError, Transport};
//!
//! use hp_8673b::Hp8673b;
//!
//! fn run<T: Transport>(transport: T) -> Result<(), InstrumentError> {
//!     let mut synth = Hp8673b::try_new(transport)?;
//!     synth.set_power_level(-10.0)?;
//!     let locked = synth.set_cw_frequency(Frequency::from_gigahertz(6.8))?;
//!     println!("Locked to {locked}");
//!     synth.enable_rf_output(true)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod srq_mask;

pub use srq_mask::SrqMask;

use std::time::Duration;

use measurements::Frequency;
use tracing::debug;

use scpisession::{InstrumentError, Session, SessionConfig, StatusFlag, Transport};

const TIMEOUT: Duration = Duration::from_secs(20);

/// A rust driver for the HP 8673B.
pub struct Hp8673b<T: Transport> {
    session: Session<T>,
}

impl<T: Transport> Hp8673b<T> {
    /// Create a new HP 8673B instance with the given transport.
    ///
    /// The session is opened with a 20 s timeout and a device clear, then the service request
    /// mask is cleared and the instrument preset.
    pub fn try_new(transport: T) -> Result<Self, InstrumentError> {
        let config = SessionConfig::default()
            .with_timeout(TIMEOUT)
            .with_clear_on_open(true);
        Self::from_session(Session::with_config(transport, &config)?)
    }

    /// Create a new HP 8673B instance on an already opened session.
    pub fn from_session(session: Session<T>) -> Result<Self, InstrumentError> {
        let mut instrument = Hp8673b { session };
        instrument.set_srq_mask(&[])?;
        instrument.session.send("IP")?;
        Ok(instrument)
    }

    /// Set the conditions that make the instrument request service. An empty slice disables all.
    pub fn set_srq_mask(&mut self, flags: &[SrqMask]) -> Result<(), InstrumentError> {
        self.session.send(&format!("RM{}", SrqMask::combine(flags)))
    }

    /// Set the CW frequency and wait for the source to settle.
    ///
    /// Above 6.6 GHz, the frequency is generated by multiplication and may differ slightly from
    /// the requested one. The frequency the source locked to is read back and returned, e.g., to
    /// use the generator as a local oscillator. The frequency is set with 1 Hz resolution.
    ///
    /// A frequency the instrument cannot set never settles: this fails with a service request
    /// timeout.
    pub fn set_cw_frequency(&mut self, frequency: Frequency) -> Result<Frequency, InstrumentError> {
        let hertz = frequency.as_hertz();
        if !hertz.is_finite() || hertz <= 0.0 {
            return Err(InstrumentError::FloatValueOutOfRange {
                value: hertz,
                min: 0.0,
                max: f64::MAX,
            });
        }

        self.set_srq_mask(&[SrqMask::SourceSettled])?;
        let settled = self
            .session
            .arm_and_send(SrqMask::SourceSettled.mask(), &format!("FR{hertz:.0}HZ"))
            .and_then(|_| self.session.wait_for_service_request());
        let disable = self.set_srq_mask(&[]);
        let status = settled?;
        disable?;
        debug!(flags = ?SrqMask::decode(status), "Source settled");

        let response = self.session.query_text("OK")?;
        let locked = first_digit_run(&response)
            .ok_or_else(|| InstrumentError::ResponseParseError(response.clone()))?;
        Ok(Frequency::from_hertz(locked))
    }

    /// Set the output power level in dBm.
    pub fn set_power_level(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        self.session.send(&format!("LE{dbm}DM"))
    }

    /// Enable or disable the RF output.
    pub fn enable_rf_output(&mut self, enable: bool) -> Result<(), InstrumentError> {
        if enable {
            self.session.send("RF1")
        } else {
            self.session.send("RF0")
        }
    }

    /// The session this driver talks through.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }
}

/// Parse the first run of ASCII digits in a response, e.g., `"FR6800000000HZ"`.
fn first_digit_run(response: &str) -> Option<f64> {
    let start = response.find(|c: char| c.is_ascii_digit())?;
    let rest = &response[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}
