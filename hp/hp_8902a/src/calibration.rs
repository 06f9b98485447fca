//! Calibration factor tables for RF power measurements.

use std::{fs, path::Path};

use measurements::Frequency;
use serde::{Deserialize, Serialize};

use scpisession::InstrumentError;

/// The calibration factor of a power sensor at one frequency.
///
/// Tables are usually kept in a JSON file, e.g.:
///
/// ```json
/// [
///     { "frequency_mhz": 50.0, "cal_factor_db": 0.0 },
///     { "frequency_mhz": 1000.0, "cal_factor_db": 0.12 }
/// ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFactor {
    /// Frequency in MHz.
    pub frequency_mhz: f64,
    /// Calibration factor in dB.
    pub cal_factor_db: f64,
}

impl CalibrationFactor {
    /// Create a calibration factor for the given frequency.
    pub fn new(frequency: Frequency, cal_factor_db: f64) -> Self {
        CalibrationFactor {
            frequency_mhz: frequency.as_megahertz(),
            cal_factor_db,
        }
    }

    /// The frequency this factor applies to.
    pub fn frequency(&self) -> Frequency {
        Frequency::from_megahertz(self.frequency_mhz)
    }

    /// Parse a table of calibration factors from JSON.
    pub fn from_json(json: &str) -> Result<Vec<Self>, InstrumentError> {
        serde_json::from_str(json).map_err(|err| {
            InstrumentError::InvalidArgument(format!("Invalid calibration factor table: {err}"))
        })
    }

    /// Read a table of calibration factors from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Vec<Self>, InstrumentError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// The command that stores this factor in the selected table.
    pub(crate) fn to_cmd(self) -> Result<String, InstrumentError> {
        if !self.frequency_mhz.is_finite() || self.frequency_mhz <= 0.0 {
            return Err(InstrumentError::FloatValueOutOfRange {
                value: self.frequency_mhz,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if !self.cal_factor_db.is_finite() {
            return Err(InstrumentError::InvalidArgument(format!(
                "Calibration factor must be finite, got {}",
                self.cal_factor_db
            )));
        }
        Ok(format!(
            "37.3SP{:.2}MZ{:.2}CF",
            self.frequency_mhz, self.cal_factor_db
        ))
    }
}

/// The calibration factor table to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationTable {
    /// The normal table, used without frequency offset.
    Normal,
    /// The table used in frequency offset mode.
    FrequencyOffset,
}

impl CalibrationTable {
    /// The special function that selects this table.
    pub(crate) fn to_cmd_str(self) -> &'static str {
        match self {
            CalibrationTable::Normal => "27.0SP",
            CalibrationTable::FrequencyOffset => "27.1SP",
        }
    }
}
