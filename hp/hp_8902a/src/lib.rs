//! A rust driver for the HP 8902A measuring receiver.
//!
//! Like the other HP-IB instruments of its generation, the receiver does not speak SCPI. A
//! measurement is set up, triggered with settling, and the receiver requests service when the
//! reading is ready. The reading then sits in the output buffer and is read without a query.
//!
//! # Example
//!
//! ```no_run
//! use measurements::Frequency;
//! use scpisession::{InstrumentError, Transport};
//!
//! use hp_8902a::{CalibrationFactor, CalibrationTable, Hp8902a};
//!
//! fn run<T: Transport>(transport: T) -> Result<(), InstrumentError> {
//!     let mut receiver = Hp8902a::try_new(transport)?;
//!     receiver.zero_power_sensor()?;
//!     receiver.calibrate_power_sensor()?;
//!
//!     let factors = CalibrationFactor::from_json_file("cal_factors.json")?;
//!     receiver.load_calibration_factors(&factors, CalibrationTable::Normal)?;
//!
//!     let carrier = receiver.measure_frequency()?;
//!     let depth = receiver.measure_am_depth()?;
//!     println!("Carrier at {carrier}, AM depth {depth} %");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod calibration;
mod srq_mask;

pub use calibration::{CalibrationFactor, CalibrationTable};
pub use srq_mask::SrqMask;

use std::time::Duration;

use measurements::Frequency;
use tracing::{debug, warn};

use scpisession::{InstrumentError, Session, SessionConfig, StatusFlag, Transport};

const TIMEOUT: Duration = Duration::from_secs(20);

// Special functions
const RESOLUTION_1HZ: &str = "7.4SP";
const SRQ_DATA_READY: &str = "22.3SP";
const SRQ_DISABLE: &str = "22.0SP";
const CLEAR_CAL_TABLE: &str = "37.9SP";

/// Unit of a phase modulation reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseUnit {
    /// Radians, the receiver's own unit.
    Radians,
    /// Degrees.
    Degrees,
}

/// A measurement the receiver can make.
#[derive(Debug, Clone, Copy)]
pub enum Measurement {
    /// AM depth in percent.
    AmDepth,
    /// FM peak deviation in Hz.
    FmDeviation,
    /// Phase modulation peak deviation.
    PhaseModulation(PhaseUnit),
    /// Frequency of the modulation in Hz.
    ModulationFrequency,
    /// Carrier frequency in Hz.
    Frequency,
    /// Carrier frequency error in Hz, relative to the given target frequency.
    FrequencyError(Frequency),
}

impl Measurement {
    fn setup_cmd(self) -> Result<String, InstrumentError> {
        let cmd = match self {
            Measurement::AmDepth => "M1ATT1".to_string(),
            Measurement::FmDeviation => "M2ATT1".to_string(),
            Measurement::PhaseModulation(_) => "M3ATT1".to_string(),
            Measurement::ModulationFrequency => "S1ATT1".to_string(),
            Measurement::Frequency => "M5ATT1".to_string(),
            Measurement::FrequencyError(target) => {
                let hertz = target.as_hertz();
                if !hertz.is_finite() || hertz <= 0.0 {
                    return Err(InstrumentError::FloatValueOutOfRange {
                        value: hertz,
                        min: 0.0,
                        max: f64::MAX,
                    });
                }
                format!("{hertz:.0}HZS5T1")
            }
        };
        Ok(cmd)
    }
}

/// A rust driver for the HP 8902A.
pub struct Hp8902a<T: Transport> {
    session: Session<T>,
}

impl<T: Transport> Hp8902a<T> {
    /// Create a new HP 8902A instance with the given transport.
    ///
    /// The session is opened with a 20 s timeout and a device clear, then the instrument is
    /// preset.
    pub fn try_new(transport: T) -> Result<Self, InstrumentError> {
        let config = SessionConfig::default()
            .with_timeout(TIMEOUT)
            .with_clear_on_open(true);
        Self::from_session(Session::with_config(transport, &config)?)
    }

    /// Create a new HP 8902A instance on an already opened session.
    pub fn from_session(session: Session<T>) -> Result<Self, InstrumentError> {
        session.send("IP")?;
        Ok(Hp8902a { session })
    }

    /// Make a measurement and return the reading in the receiver's unit.
    ///
    /// The reading is taken with 1 Hz resolution where it applies, triggered with settling. A
    /// receiver that does not signal a reading or does not deliver it before the timeout is
    /// cleared, and the reading is reported as `0.0`, so that one missing reading does not stop a
    /// measurement series. All other errors are returned.
    pub fn measure(&mut self, measurement: Measurement) -> Result<f64, InstrumentError> {
        self.session.send(&measurement.setup_cmd()?)?;
        self.session.send(RESOLUTION_1HZ)?;
        self.session.send(SRQ_DATA_READY)?;
        if let Measurement::PhaseModulation(PhaseUnit::Degrees) = measurement {
            self.session.send("1.745R1")?;
        }

        let ready = self.wait_gated("T3");
        let disable = self.session.send(SRQ_DISABLE);
        match ready {
            Ok(()) => disable?,
            Err(err) if err.is_timeout() => {
                warn!(?measurement, %err, "No reading, substituting 0");
                self.clear_after_timeout();
                return Ok(0.0);
            }
            Err(err) => return Err(err),
        }

        match self.session.read_number() {
            Err(err) if err.is_timeout() => {
                warn!(?measurement, %err, "Reading not delivered, substituting 0");
                self.clear_after_timeout();
                Ok(0.0)
            }
            other => other,
        }
    }

    /// Measure the carrier frequency.
    pub fn measure_frequency(&mut self) -> Result<Frequency, InstrumentError> {
        self.measure(Measurement::Frequency).map(Frequency::from_hertz)
    }

    /// Measure the carrier frequency error relative to the target frequency.
    ///
    /// The error is negative if the carrier is below the target.
    pub fn measure_frequency_error(
        &mut self,
        target: Frequency,
    ) -> Result<Frequency, InstrumentError> {
        self.measure(Measurement::FrequencyError(target)).map(Frequency::from_hertz)
    }

    /// Measure the AM depth in percent.
    pub fn measure_am_depth(&mut self) -> Result<f64, InstrumentError> {
        self.measure(Measurement::AmDepth)
    }

    /// Measure the FM peak deviation.
    pub fn measure_fm_deviation(&mut self) -> Result<Frequency, InstrumentError> {
        self.measure(Measurement::FmDeviation).map(Frequency::from_hertz)
    }

    /// Measure the phase modulation peak deviation in the given unit.
    pub fn measure_phase_modulation(&mut self, unit: PhaseUnit) -> Result<f64, InstrumentError> {
        self.measure(Measurement::PhaseModulation(unit))
    }

    /// Measure the frequency of the modulation.
    pub fn measure_modulation_frequency(&mut self) -> Result<Frequency, InstrumentError> {
        self.measure(Measurement::ModulationFrequency)
            .map(Frequency::from_hertz)
    }

    /// Zero the power sensor. The sensor must not see any RF power while zeroing.
    ///
    /// A zeroing that does not finish before the timeout fails with a service request timeout.
    pub fn zero_power_sensor(&mut self) -> Result<(), InstrumentError> {
        self.session.send("M4T0")?;
        self.session.send("ZR")?;
        let zeroed = self.wait_gated(SRQ_DATA_READY);
        let disable = self.session.send(SRQ_DISABLE);
        zeroed?;
        disable?;
        debug!("Power sensor zeroed");
        Ok(())
    }

    /// Calibrate the power sensor against the receiver's calibrator output.
    ///
    /// The calibration is saved only if it finished. The calibrator is switched off in any case.
    pub fn calibrate_power_sensor(&mut self) -> Result<(), InstrumentError> {
        self.session.send("M4T0")?;
        self.session.send("C1")?;
        let calibrated = self.wait_gated(SRQ_DATA_READY);
        let disable = self.session.send(SRQ_DISABLE);
        let saved = calibrated
            .and(disable)
            .and_then(|()| self.session.send("SC"));
        let calibrator_off = self.session.send("C0");
        saved?;
        calibrator_off?;
        debug!("Power sensor calibrated");
        Ok(())
    }

    /// Replace the selected calibration factor table with the given factors.
    ///
    /// All factors are checked before the table is cleared.
    pub fn load_calibration_factors(
        &mut self,
        factors: &[CalibrationFactor],
        table: CalibrationTable,
    ) -> Result<(), InstrumentError> {
        let cmds = factors
            .iter()
            .map(|factor| factor.to_cmd())
            .collect::<Result<Vec<_>, _>>()?;

        self.session.send("M4T0")?;
        self.session.send(table.to_cmd_str())?;
        self.session.send(CLEAR_CAL_TABLE)?;
        for cmd in &cmds {
            self.session.send(cmd)?;
        }
        debug!(?table, count = cmds.len(), "Calibration factors loaded");
        Ok(())
    }

    /// The session this driver talks through.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Arm for data ready, send `cmd`, and wait for the service request.
    fn wait_gated(&self, cmd: &str) -> Result<(), InstrumentError> {
        self.session.arm_and_send(SrqMask::DataReady.mask(), cmd)?;
        let status = self.session.wait_for_service_request()?;
        debug!(flags = ?SrqMask::decode(status), "Data ready");
        Ok(())
    }

    fn clear_after_timeout(&self) {
        if let Err(clear_err) = self.session.clear() {
            warn!(%clear_err, "Could not clear receiver after timeout");
        }
    }
}
