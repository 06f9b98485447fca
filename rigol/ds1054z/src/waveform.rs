//! Waveforms read from the oscilloscope.

use scpisession::InstrumentError;

use crate::{WaveformFormat, WaveformPreamble};

/// A waveform of one channel, converted to voltages.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// The preamble that was valid when the waveform was read.
    pub preamble: WaveformPreamble,
    /// The voltage of each point in V.
    pub voltages: Vec<f64>,
}

impl Waveform {
    /// Decode the payload of a `:WAVeform:DATA?` binary block using its preamble.
    ///
    /// The sample width is taken from the preamble's format. A payload that does not split into
    /// whole samples is a framing error.
    pub fn from_block(preamble: WaveformPreamble, payload: &[u8]) -> Result<Self, InstrumentError> {
        let voltages = match preamble.format {
            WaveformFormat::Byte => payload
                .iter()
                .map(|&raw| preamble.voltage(f64::from(raw)))
                .collect(),
            WaveformFormat::Word => {
                if payload.len() % 2 != 0 {
                    return Err(InstrumentError::Framing(format!(
                        "WORD waveform data has an odd length of {} bytes",
                        payload.len()
                    )));
                }
                payload
                    .chunks_exact(2)
                    .map(|word| preamble.voltage(f64::from(u16::from_le_bytes([word[0], word[1]]))))
                    .collect()
            }
            WaveformFormat::Ascii => parse_ascii(payload)?,
        };
        Ok(Waveform { preamble, voltages })
    }

    /// The time in s of each point relative to the trigger.
    pub fn times(&self) -> Vec<f64> {
        (0..self.voltages.len())
            .map(|idx| self.preamble.time(idx))
            .collect()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.voltages.len()
    }

    /// Returns `true` if the waveform has no points.
    pub fn is_empty(&self) -> bool {
        self.voltages.is_empty()
    }
}

/// ASCII data is a comma separated list of voltages.
fn parse_ascii(payload: &[u8]) -> Result<Vec<f64>, InstrumentError> {
    let text = String::from_utf8_lossy(payload);
    text.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<f64>()
                .map_err(|_| InstrumentError::ResponseParseError(value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preamble(format: &str) -> WaveformPreamble {
        format!("{format},0,4,1,1e-3,0,0,0.5,-100,127").parse().unwrap()
    }

    #[test]
    fn test_byte_samples() {
        let wf = Waveform::from_block(preamble("0"), &[27, 29, 25]).unwrap();
        assert_eq!(wf.voltages, vec![0.0, 1.0, -1.0]);
        assert_eq!(wf.times(), vec![0.0, 1e-3, 2e-3]);
    }

    #[test]
    fn test_word_samples() {
        let wf = Waveform::from_block(preamble("1"), &[27, 0, 31, 0]).unwrap();
        assert_eq!(wf.voltages, vec![0.0, 2.0]);
        assert!(Waveform::from_block(preamble("1"), &[27, 0, 31]).is_err());
    }

    #[test]
    fn test_ascii_samples() {
        let wf = Waveform::from_block(preamble("2"), b"1.2e-01,-4.0e-02,\n").unwrap();
        assert_eq!(wf.voltages, vec![0.12, -0.04]);
        assert!(Waveform::from_block(preamble("2"), b"1.2e-01,abc").is_err());
    }
}
