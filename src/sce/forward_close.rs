use super::{ConnectionTriad, SceError};
use crate::wire::WireReader;

/// Fixed part of a Forward_Close request.
pub const FORWARD_CLOSE_HEADER_SIZE: usize = 12;

/// A SafetyClose request. Only the Connection Triad matters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ForwardCloseRequest {
    pub priority_tick: u8,
    pub timeout_ticks: u8,
    pub triad: ConnectionTriad,
    pub path_words: u8,
}

/// Parse a SafetyClose request.
///
/// A connection path following the header is ignored, even if it does not
/// match the path the connection was opened with.
///
/// # Errors
/// - [`SceError::NotEnoughData`] if the fixed header is incomplete
pub fn parse_forward_close(bytes: &[u8]) -> Result<ForwardCloseRequest, SceError> {
    let short = || SceError::NotEnoughData {
        expected: FORWARD_CLOSE_HEADER_SIZE,
        actual: bytes.len(),
    };
    let mut reader = WireReader::new(bytes);
    let priority_tick = reader.read_u8().ok_or_else(short)?;
    let timeout_ticks = reader.read_u8().ok_or_else(short)?;
    let triad = ConnectionTriad {
        connection_serial: reader.read_u16().ok_or_else(short)?,
        vendor_id: reader.read_u16().ok_or_else(short)?,
        originator_serial: reader.read_u32().ok_or_else(short)?,
    };
    let path_words = reader.read_u8().ok_or_else(short)?;
    reader.skip(1).ok_or_else(short)?;
    Ok(ForwardCloseRequest {
        priority_tick,
        timeout_ticks,
        triad,
        path_words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 12] = [
        0x0A, 0xF0, 0x02, 0x01, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 0x03, 0x00,
    ];

    #[test]
    fn test_mismatching_path_is_ignored() {
        let mut bytes = HEADER.to_vec();
        // declared 3 words, carries a different path of 2 words
        bytes.extend_from_slice(&[0x20, 0x05, 0x24, 0x09]);
        let close = parse_forward_close(&bytes).unwrap();
        assert_eq!(close.triad.connection_serial, 0x0102);
        assert_eq!(close.path_words, 3);
    }

    #[test]
    fn test_short_header() {
        assert_eq!(
            parse_forward_close(&HEADER[..11]),
            Err(SceError::NotEnoughData {
                expected: 12,
                actual: 11
            })
        );
    }
}
