//! A rust driver for the HP 53131A universal counter.
//!
//! The counter has three input channels. Frequency measurements are triggered and the driver
//! waits for the counter to signal operation complete via a service request before fetching the
//! result. This needs a transport that delivers service requests, e.g., a GPIB transport.
//!
//! # Example
//!
//! ```no_run
//! use scpisession::{InstrumentError, Transport};
//!
//! use hp_53131a::Hp53131a;
//!
//! fn measure<T: Transport>(transport: T) -> Result<(), InstrumentError> {
//!     let mut counter = Hp53131a::try_new(transport)?;
//!     counter.set_50_ohm_impedance(true)?;
//!
//!     let mut ch1 = counter.get_channel(0)?;
//!     println!("Frequency: {}", ch1.measure_frequency()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod status;

pub use status::StatusBit;

use std::time::Duration;

use measurements::Frequency;
use tracing::{debug, warn};

use scpisession::{InstrumentError, Session, SessionConfig, StatusFlag, Transport};

/// Timeout that allows measurements with 1 Hz resolution.
const TIMEOUT: Duration = Duration::from_secs(20);

/// Number of input channels of the counter.
const NUM_CHANNELS: usize = 3;

/// A rust driver for the HP 53131A.
pub struct Hp53131a<T: Transport> {
    session: Session<T>,
}

impl<T: Transport> Hp53131a<T> {
    /// Create a new HP 53131A instance with the given transport.
    ///
    /// The session is opened with a 20 s timeout and a device clear, then the counter is reset.
    pub fn try_new(transport: T) -> Result<Self, InstrumentError> {
        let config = SessionConfig::default()
            .with_timeout(TIMEOUT)
            .with_clear_on_open(true);
        Self::from_session(Session::with_config(transport, &config)?)
    }

    /// Create a new HP 53131A instance on an already opened session and reset the counter.
    pub fn from_session(session: Session<T>) -> Result<Self, InstrumentError> {
        let instrument = Hp53131a { session };
        instrument.reset()?;
        Ok(instrument)
    }

    /// Reset the counter and clear all status registers and service request masks.
    pub fn reset(&self) -> Result<(), InstrumentError> {
        for cmd in ["*RST", "*CLS", "*SRE 0", "*ESE 0", ":STAT:PRES"] {
            self.session.send(cmd)?;
        }
        Ok(())
    }

    /// Get a new channel with a given index.
    ///
    /// Please note that channels are zero-indexed, i.e., index 0 is input channel 1.
    pub fn get_channel(&mut self, idx: usize) -> Result<Channel<T>, InstrumentError> {
        if idx >= NUM_CHANNELS {
            return Err(InstrumentError::ChannelIndexOutOfRange {
                idx,
                nof_channels: NUM_CHANNELS,
            });
        }
        Ok(Channel::new(idx, self.session.clone()))
    }

    /// Query the name of the instrument.
    pub fn get_name(&mut self) -> Result<String, InstrumentError> {
        Ok(self.session.query_text("*IDN?")?.trim().to_string())
    }

    /// Set the input impedance to 50 Ohm (`true`) or 1 MOhm (`false`).
    pub fn set_50_ohm_impedance(&mut self, set_50_ohm: bool) -> Result<(), InstrumentError> {
        if set_50_ohm {
            self.session.send("INP:IMP 50")
        } else {
            self.session.send("INP:IMP 1E+6")
        }
    }

    /// The session this driver talks through.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }
}

/// Channel structure representing a single input channel of the HP 53131A.
///
/// Channels can only be created through [`Hp53131a::get_channel`].
pub struct Channel<T: Transport> {
    idx: usize,
    session: Session<T>,
}

impl<T: Transport> Channel<T> {
    /// Measure the frequency on this channel.
    ///
    /// With a missing or too weak input signal the counter may not finish the measurement before
    /// the timeout. In this case, the bus is cleared and a frequency of 0 Hz is returned, such that
    /// a measurement series can continue.
    pub fn measure_frequency(&mut self) -> Result<Frequency, InstrumentError> {
        // Request service on operation complete.
        self.session.send("*ESE 1")?;
        self.session
            .send(&format!("*SRE {}", StatusBit::EventStatus.mask()))?;
        self.session
            .send(&format!("CONF:FREQ (@{})", self.idx + 1))?;

        let result = self.trigger_and_fetch();
        let disable = self
            .session
            .send("*ESE 0")
            .and_then(|_| self.session.send("*SRE 0"));
        let hertz = result?;
        disable?;
        Ok(Frequency::from_hertz(hertz))
    }

    fn trigger_and_fetch(&self) -> Result<f64, InstrumentError> {
        self.session
            .arm_and_send(StatusBit::EventStatus.mask(), ":INIT;*OPC")?;
        match self.session.wait_for_service_request() {
            Ok(status) => {
                debug!(channel = self.idx + 1, flags = ?StatusBit::decode(status), "Measurement complete");
            }
            Err(err) if err.is_timeout() => {
                warn!(channel = self.idx + 1, %err, "No measurement, returning 0 Hz");
                self.session.clear()?;
                return Ok(0.0);
            }
            Err(err) => return Err(err),
        }
        self.session.query_number_or_default("Fetch?")
    }

    fn new(idx: usize, session: Session<T>) -> Self {
        Channel { idx, session }
    }
}

impl<T: Transport> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            idx: self.idx,
            session: self.session.clone(),
        }
    }
}
