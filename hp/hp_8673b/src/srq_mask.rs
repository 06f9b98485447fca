//! Service request mask of the HP 8673B.

use std::fmt::Display;

use scpisession::StatusFlag;

/// Conditions that make the HP 8673B request service.
///
/// The same bits are reported in the status byte after a service request. Combine them with
/// [`StatusFlag::combine`] to set the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrqMask {
    /// A front panel key was pressed.
    FrontPanelKeyPressed,
    /// A front panel entry is complete.
    FrontPanelEntryComplete,
    /// A bit in the extended status byte changed.
    ChangeInExtendedStatus,
    /// The source settled to the commanded frequency.
    SourceSettled,
    /// A sweep completed.
    EndOfSweep,
    /// An entry error occurred.
    EntryError,
    /// Asserted whenever the instrument requests service.
    RequestService,
    /// Sweep parameters changed.
    ChangedSweepParameters,
}

impl StatusFlag for SrqMask {
    const ALL: &'static [Self] = &[
        SrqMask::FrontPanelKeyPressed,
        SrqMask::FrontPanelEntryComplete,
        SrqMask::ChangeInExtendedStatus,
        SrqMask::SourceSettled,
        SrqMask::EndOfSweep,
        SrqMask::EntryError,
        SrqMask::RequestService,
        SrqMask::ChangedSweepParameters,
    ];

    fn mask(self) -> u8 {
        match self {
            SrqMask::FrontPanelKeyPressed => 0x01,
            SrqMask::FrontPanelEntryComplete => 0x02,
            SrqMask::ChangeInExtendedStatus => 0x04,
            SrqMask::SourceSettled => 0x08,
            SrqMask::EndOfSweep => 0x10,
            SrqMask::EntryError => 0x20,
            SrqMask::RequestService => 0x40,
            SrqMask::ChangedSweepParameters => 0x80,
        }
    }
}

impl Display for SrqMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            SrqMask::FrontPanelKeyPressed => "Front Panel Key Pressed",
            SrqMask::FrontPanelEntryComplete => "Front Panel Entry Complete",
            SrqMask::ChangeInExtendedStatus => "Change in Extended Status Byte",
            SrqMask::SourceSettled => "Source Settled",
            SrqMask::EndOfSweep => "End of Sweep",
            SrqMask::EntryError => "Entry Error",
            SrqMask::RequestService => "Request Service",
            SrqMask::ChangedSweepParameters => "Changed Sweep Parameters",
        };
        write!(f, "{description}")
    }
}
