//! The waveform preamble and the formats it names.

use std::{fmt::Display, str::FromStr};

use scpisession::InstrumentError;

/// The data format of the waveform data that the oscilloscope sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveformFormat {
    /// One byte per sample.
    #[default]
    Byte,
    /// Two bytes per sample, little endian. Only the lower byte is used by the DS1054Z.
    Word,
    /// Comma separated voltages in scientific notation.
    Ascii,
}

impl WaveformFormat {
    /// Get the format from the code in the preamble.
    pub fn from_code(code: i64) -> Result<Self, InstrumentError> {
        match code {
            0 => Ok(WaveformFormat::Byte),
            1 => Ok(WaveformFormat::Word),
            2 => Ok(WaveformFormat::Ascii),
            _ => Err(InstrumentError::ResponseParseError(format!(
                "Unknown waveform format code {code}"
            ))),
        }
    }

    /// Number of bytes per sample, `None` for ASCII data.
    pub fn sample_width(&self) -> Option<usize> {
        match self {
            WaveformFormat::Byte => Some(1),
            WaveformFormat::Word => Some(2),
            WaveformFormat::Ascii => None,
        }
    }

    /// The string to send with `:WAVeform:FORMat`.
    pub fn to_cmd_str(&self) -> &'static str {
        match self {
            WaveformFormat::Byte => "BYTE",
            WaveformFormat::Word => "WORD",
            WaveformFormat::Ascii => "ASCii",
        }
    }
}

impl Display for WaveformFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_cmd_str())
    }
}

/// The waveform reading mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveformMode {
    /// Read the waveform on screen.
    #[default]
    Normal,
    /// Read the waveform on screen when running, the internal memory when stopped.
    Maximum,
    /// Read the internal memory, the oscilloscope must be stopped.
    Raw,
}

impl WaveformMode {
    /// Get the mode from the code in the preamble.
    pub fn from_code(code: i64) -> Result<Self, InstrumentError> {
        match code {
            0 => Ok(WaveformMode::Normal),
            1 => Ok(WaveformMode::Maximum),
            2 => Ok(WaveformMode::Raw),
            _ => Err(InstrumentError::ResponseParseError(format!(
                "Unknown waveform mode code {code}"
            ))),
        }
    }

    /// The string to send with `:WAVeform:MODE`.
    pub fn to_cmd_str(&self) -> &'static str {
        match self {
            WaveformMode::Normal => "NORMal",
            WaveformMode::Maximum => "MAXimum",
            WaveformMode::Raw => "RAW",
        }
    }
}

/// The waveform preamble as returned by `:WAVeform:PREamble?`.
///
/// It describes how to turn the raw samples of the waveform data into voltages and times.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformPreamble {
    /// Data format.
    pub format: WaveformFormat,
    /// Reading mode.
    pub mode: WaveformMode,
    /// Number of points.
    pub points: usize,
    /// Number of averages, 1 if not averaging.
    pub count: u32,
    /// Time between two points in s.
    pub x_increment: f64,
    /// Time of the first point relative to the trigger in s.
    pub x_origin: f64,
    /// Reference point index in x direction.
    pub x_reference: f64,
    /// Voltage step per raw sample value in V.
    pub y_increment: f64,
    /// Vertical offset in raw sample values.
    pub y_origin: f64,
    /// Vertical reference in raw sample values.
    pub y_reference: f64,
}

impl WaveformPreamble {
    /// Convert a raw sample value into a voltage in V.
    pub fn voltage(&self, raw: f64) -> f64 {
        (raw - self.y_origin - self.y_reference) * self.y_increment
    }

    /// The time in s of the sample with the given index.
    pub fn time(&self, index: usize) -> f64 {
        (index as f64 - self.x_reference) * self.x_increment + self.x_origin
    }
}

impl FromStr for WaveformPreamble {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InstrumentError::ResponseParseError(s.to_string());
        let parts = s.trim().split(',').map(str::trim).collect::<Vec<&str>>();
        if parts.len() != 10 {
            return Err(err());
        }

        let int = |idx: usize| parts[idx].parse::<i64>().map_err(|_| err());
        let float = |idx: usize| parts[idx].parse::<f64>().map_err(|_| err());

        Ok(WaveformPreamble {
            format: WaveformFormat::from_code(int(0)?)?,
            mode: WaveformMode::from_code(int(1)?)?,
            points: parts[2].parse().map_err(|_| err())?,
            count: parts[3].parse().map_err(|_| err())?,
            x_increment: float(4)?,
            x_origin: float(5)?,
            x_reference: float(6)?,
            y_increment: float(7)?,
            y_origin: float(8)?,
            y_reference: float(9)?,
        })
    }
}
