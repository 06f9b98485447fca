//! Status byte bits of the HP 53131A.

use std::fmt::Display;

use scpisession::StatusFlag;

/// The bits of the IEEE-488.2 status byte as used by the HP 53131A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBit {
    /// A questionable data summary bit is set.
    QuestionableData,
    /// A response is waiting in the output queue.
    MessageAvailable,
    /// An enabled bit of the standard event status register is set, e.g., operation complete.
    EventStatus,
    /// The counter requests service.
    RequestService,
    /// An operation status summary bit is set.
    OperationStatus,
}

impl StatusFlag for StatusBit {
    const ALL: &'static [Self] = &[
        StatusBit::QuestionableData,
        StatusBit::MessageAvailable,
        StatusBit::EventStatus,
        StatusBit::RequestService,
        StatusBit::OperationStatus,
    ];

    fn mask(self) -> u8 {
        match self {
            StatusBit::QuestionableData => 0x08,
            StatusBit::MessageAvailable => 0x10,
            StatusBit::EventStatus => 0x20,
            StatusBit::RequestService => 0x40,
            StatusBit::OperationStatus => 0x80,
        }
    }
}

impl Display for StatusBit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            StatusBit::QuestionableData => "Questionable Data",
            StatusBit::MessageAvailable => "Message Available",
            StatusBit::EventStatus => "Event Status",
            StatusBit::RequestService => "Request Service",
            StatusBit::OperationStatus => "Operation Status",
        };
        write!(f, "{description}")
    }
}
