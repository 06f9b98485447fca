//! Service request mask of the HP 8902A.

use std::fmt::Display;

use scpisession::StatusFlag;

/// Conditions that make the HP 8902A request service, as reported in its status byte.
///
/// Bit 7 is always zero. The HP-IB code error bit is always part of the instrument's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrqMask {
    /// A reading is ready to be read.
    DataReady,
    /// The instrument received an invalid HP-IB code.
    HpIbCodeError,
    /// An instrument error occurred.
    InstrumentError,
    /// A measurement limit was exceeded.
    LimitExceeded,
    /// The frequency offset mode changed.
    FrequencyOffsetModeChanged,
    /// The instrument became uncalibrated or was recalibrated.
    Recalibrated,
    /// Asserted whenever the instrument requests service.
    RequestService,
}

impl StatusFlag for SrqMask {
    const ALL: &'static [Self] = &[
        SrqMask::DataReady,
        SrqMask::HpIbCodeError,
        SrqMask::InstrumentError,
        SrqMask::LimitExceeded,
        SrqMask::FrequencyOffsetModeChanged,
        SrqMask::Recalibrated,
        SrqMask::RequestService,
    ];

    fn mask(self) -> u8 {
        match self {
            SrqMask::DataReady => 0x01,
            SrqMask::HpIbCodeError => 0x02,
            SrqMask::InstrumentError => 0x04,
            SrqMask::LimitExceeded => 0x08,
            SrqMask::FrequencyOffsetModeChanged => 0x10,
            SrqMask::Recalibrated => 0x20,
            SrqMask::RequestService => 0x40,
        }
    }
}

impl Display for SrqMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            SrqMask::DataReady => "Data Ready",
            SrqMask::HpIbCodeError => "HP-IB Code Error",
            SrqMask::InstrumentError => "Instrument Error",
            SrqMask::LimitExceeded => "Limit Exceeded",
            SrqMask::FrequencyOffsetModeChanged => "Frequency Offset Mode Changed",
            SrqMask::Recalibrated => "Re/Uncalibrated",
            SrqMask::RequestService => "Request Service",
        };
        write!(f, "{description}")
    }
}
