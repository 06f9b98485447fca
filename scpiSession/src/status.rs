//! Status byte read from an instrument after a service request.

use std::fmt::{self, Display};

/// The 8-bit status byte an instrument reports after asserting SRQ.
///
/// The meaning of the individual bits is instrument specific. The session and the gate never
/// interpret them; drivers decode them with their own [`StatusFlag`] enumeration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusByte(u8);

impl StatusByte {
    /// Create a status byte from its raw value.
    pub const fn new(bits: u8) -> Self {
        StatusByte(bits)
    }

    /// Get the raw value.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if any bit of `mask` is set.
    pub const fn intersects(self, mask: u8) -> bool {
        self.0 & mask != 0
    }
}

impl From<u8> for StatusByte {
    fn from(value: u8) -> Self {
        StatusByte(value)
    }
}

impl From<StatusByte> for u8 {
    fn from(value: StatusByte) -> Self {
        value.0
    }
}

impl Display for StatusByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A tagged status bit of one instrument.
///
/// Implement this for a small enum per instrument to turn a [`StatusByte`] into the conditions
/// that are set, instead of passing bare integer masks around.
pub trait StatusFlag: Sized + Copy + 'static {
    /// All flags of the instrument.
    const ALL: &'static [Self];

    /// The bit mask of this flag within the status byte.
    fn mask(self) -> u8;

    /// Returns `true` if this flag is set in the status byte.
    fn is_set(self, status: StatusByte) -> bool {
        status.intersects(self.mask())
    }

    /// Decode all flags that are set in the status byte.
    fn decode(status: StatusByte) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|flag| flag.is_set(status))
            .collect()
    }

    /// Combine flags into a mask, e.g., to arm the gate or to enable the instrument's SRQ mask.
    fn combine(flags: &[Self]) -> u8 {
        flags.iter().fold(0, |acc, flag| acc | flag.mask())
    }
}
