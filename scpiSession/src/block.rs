//! Decoder and encoder for IEEE-488.2 definite-length arbitrary blocks.
//!
//! On the wire, a block looks like `#<d><length><payload>[terminator]`, where `d` is a single
//! ASCII digit from 1 to 9 that gives the number of digits of `length`, and `length` is the
//! number of payload bytes in ASCII decimal. Many instruments send a line terminator after the
//! payload, some do not.

use std::time::Duration;

use tracing::{debug, trace};

use crate::{InstrumentError, Transport};

/// The character that starts every definite-length arbitrary block.
pub const BLOCK_MARKER: u8 = b'#';

/// The header of a definite-length arbitrary block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    digits: usize,
    length: usize,
}

impl BlockHeader {
    /// Create the header for a payload of `length` bytes.
    ///
    /// Fails if the length needs more than nine digits.
    pub fn for_length(length: usize) -> Result<Self, InstrumentError> {
        let digits = length.to_string().len();
        if digits > 9 {
            return Err(InstrumentError::InvalidArgument(format!(
                "A binary block can carry at most 999999999 bytes, got {length}"
            )));
        }
        Ok(BlockHeader { digits, length })
    }

    /// Parse the two byte prefix of a block, i.e., the marker and the digit count.
    ///
    /// Returns the number of length digits that follow.
    pub fn parse_prefix(prefix: &[u8]) -> Result<usize, InstrumentError> {
        match prefix {
            [BLOCK_MARKER, d @ b'1'..=b'9'] => Ok(usize::from(d - b'0')),
            [BLOCK_MARKER, other] => Err(InstrumentError::Framing(format!(
                "length digit count must be an ASCII digit from 1 to 9, got {other:#04x}"
            ))),
            [other, _] => Err(InstrumentError::Framing(format!(
                "expected block marker '#', got {other:#04x}"
            ))),
            _ => Err(InstrumentError::Framing(format!(
                "block prefix must be two bytes, got {}",
                prefix.len()
            ))),
        }
    }

    /// Parse the ASCII decimal length digits that follow the prefix.
    pub fn parse_length(length_digits: &[u8]) -> Result<Self, InstrumentError> {
        if length_digits.is_empty() || !length_digits.iter().all(u8::is_ascii_digit) {
            return Err(InstrumentError::Framing(format!(
                "payload length must be ASCII digits, got {:?}",
                String::from_utf8_lossy(length_digits)
            )));
        }
        // At most nine digits, so this cannot overflow.
        let length = length_digits
            .iter()
            .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));
        Ok(BlockHeader {
            digits: length_digits.len(),
            length,
        })
    }

    /// Number of digits of the length field.
    pub fn digits(&self) -> usize {
        self.digits
    }

    /// Payload length in bytes.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The header as it is sent on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "#{}{:0width$}",
            self.digits,
            self.length,
            width = self.digits
        )
        .into_bytes()
    }
}

/// Frame a payload as a definite-length arbitrary block, without a trailing terminator.
pub fn encode_block(payload: &[u8]) -> Result<Vec<u8>, InstrumentError> {
    let mut block = BlockHeader::for_length(payload.len())?.to_bytes();
    block.extend_from_slice(payload);
    Ok(block)
}

/// Read one definite-length arbitrary block from the transport and return its payload.
///
/// A timeout before the first byte arrives is reported as a timeout, as the instrument simply did
/// not answer. Once a byte has arrived, a first byte other than `#`, any malformed header, or a
/// block that ends before its declared length is reported as [`InstrumentError::Framing`] and no
/// partial payload is returned.
///
/// If `drain_terminator` is set, one more byte is read with `drain_timeout` and discarded. Its
/// absence is not an error. The previous transport timeout is restored afterwards.
pub fn read_block<T: Transport + ?Sized>(
    transport: &mut T,
    drain_terminator: bool,
    drain_timeout: Duration,
) -> Result<Vec<u8>, InstrumentError> {
    let mut prefix = [0u8; 2];
    transport.read_exact(&mut prefix[..1])?;
    if prefix[0] != BLOCK_MARKER {
        return Err(InstrumentError::Framing(format!(
            "expected block marker '#', got {:#04x}",
            prefix[0]
        )));
    }
    transport
        .read_exact(&mut prefix[1..])
        .map_err(|err| short_read(err, "prefix", 2))?;
    let digits = BlockHeader::parse_prefix(&prefix)?;

    let mut length_digits = vec![0u8; digits];
    transport
        .read_exact(&mut length_digits)
        .map_err(|err| short_read(err, "length field", digits))?;
    let header = BlockHeader::parse_length(&length_digits)?;

    let mut payload = vec![0u8; header.length()];
    transport
        .read_exact(&mut payload)
        .map_err(|err| short_read(err, "payload", header.length()))?;
    trace!(length = header.length(), "Read binary block");

    if drain_terminator {
        drain_one(transport, drain_timeout)?;
    }
    Ok(payload)
}

/// Turn a timeout or an early end of stream inside a block into a framing error.
fn short_read(err: InstrumentError, part: &str, expected: usize) -> InstrumentError {
    let truncated = match &err {
        InstrumentError::Io(io_err) => io_err.kind() == std::io::ErrorKind::UnexpectedEof,
        other => other.is_timeout(),
    };
    if truncated {
        InstrumentError::Framing(format!(
            "block {part} ended before {expected} bytes were received ({err})"
        ))
    } else {
        err
    }
}

/// Read and discard a single trailing byte using a short timeout.
fn drain_one<T: Transport + ?Sized>(
    transport: &mut T,
    drain_timeout: Duration,
) -> Result<(), InstrumentError> {
    let previous = transport.get_timeout();
    match transport.set_timeout(drain_timeout) {
        Ok(()) => {}
        Err(InstrumentError::InterfaceCommandNotSupported) => {
            debug!("Transport timeout cannot be shortened, not draining block terminator");
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    let mut byte = [0u8];
    let result = transport.read_exact(&mut byte);
    transport.set_timeout(previous)?;

    match result {
        Ok(()) => {
            trace!(terminator = byte[0], "Drained block terminator");
            Ok(())
        }
        Err(err) if err.is_timeout() => {
            trace!("No block terminator present");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_for_length() {
        let header = BlockHeader::for_length(1200).unwrap();
        assert_eq!(header.digits(), 4);
        assert_eq!(header.to_bytes(), b"#41200");
    }

    #[test]
    fn test_header_for_length_too_long() {
        assert!(BlockHeader::for_length(1_000_000_000).is_err());
    }

    #[test]
    fn test_parse_prefix() {
        assert_eq!(BlockHeader::parse_prefix(b"#9").unwrap(), 9);
        assert!(matches!(
            BlockHeader::parse_prefix(b"#0"),
            Err(InstrumentError::Framing(_))
        ));
        assert!(matches!(
            BlockHeader::parse_prefix(b"12"),
            Err(InstrumentError::Framing(_))
        ));
    }

    #[test]
    fn test_parse_length_leading_zeros() {
        let header = BlockHeader::parse_length(b"000012").unwrap();
        assert_eq!(header.length(), 12);
        assert_eq!(header.digits(), 6);
        assert_eq!(header.to_bytes(), b"#6000012");
    }

    #[test]
    fn test_parse_length_not_digits() {
        assert!(matches!(
            BlockHeader::parse_length(b"1a"),
            Err(InstrumentError::Framing(_))
        ));
    }
}
