//! Status byte bits of the E4418B.

use std::fmt::Display;

use scpisession::StatusFlag;

/// The bits of the IEEE-488.2 status byte as used by the E4418B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBit {
    /// A device status summary bit is set, e.g., a sensor was connected.
    DeviceStatus,
    /// The error queue is not empty.
    ErrorQueue,
    /// A questionable status summary bit is set, e.g., the sensor needs zeroing.
    QuestionableStatus,
    /// A response is waiting in the output queue.
    MessageAvailable,
    /// An enabled bit of the standard event status register is set.
    EventStatus,
    /// The meter requests service.
    RequestService,
    /// An operation status summary bit is set.
    OperationStatus,
}

impl StatusFlag for StatusBit {
    const ALL: &'static [Self] = &[
        StatusBit::DeviceStatus,
        StatusBit::ErrorQueue,
        StatusBit::QuestionableStatus,
        StatusBit::MessageAvailable,
        StatusBit::EventStatus,
        StatusBit::RequestService,
        StatusBit::OperationStatus,
    ];

    fn mask(self) -> u8 {
        match self {
            StatusBit::DeviceStatus => 0x02,
            StatusBit::ErrorQueue => 0x04,
            StatusBit::QuestionableStatus => 0x08,
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
            StatusBit::DeviceStatus => "Device Status",
            StatusBit::ErrorQueue => "Error Queue",
            StatusBit::QuestionableStatus => "Questionable Status",
            StatusBit::MessageAvailable => "Message Available",
            StatusBit::EventStatus => "Event Status",
            StatusBit::RequestService => "Request Service",
            StatusBit::OperationStatus => "Operation Status",
        };
        write!(f, "{description}")
    }
}
