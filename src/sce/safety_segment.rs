use super::{SceError, Scts, Unid};
use crate::cip::NetConnParams;
use crate::sfa::SafetyFormat;
use crate::wire::WireReader;

/// Size in words of a Base format network safety segment.
pub const BASE_SEGMENT_WORDS: u8 = 27;
/// Size in words of an Extended format network safety segment.
pub const EXTENDED_SEGMENT_WORDS: u8 = 30;

const FORMAT_BASE_TARGET: u8 = 0x00;
const FORMAT_EXTENDED_TARGET: u8 = 0x02;

/// Format specific end of the segment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SafetyTail {
    Base {
        cpcrc: u32,
        tcorr_connection_id: u32,
    },
    Extended {
        max_fault_number: u16,
        cpcrc: u32,
        tcorr_connection_id: u32,
        initial_time_stamp: u16,
        initial_rollover: u16,
    },
}

/// Contents of a network safety segment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NetworkSegmentSafety {
    pub sccrc: u32,
    pub scts: Scts,
    /// EPI of the time correction connection, 0 when there is none.
    pub tcorr_epi: u32,
    pub tcorr_params: NetConnParams,
    pub tunid: Unid,
    pub ounid: Unid,
    pub ping_interval_multiplier: u16,
    pub tcoo_min_multiplier: u16,
    pub net_time_expectation_multiplier: u16,
    pub timeout_multiplier: u8,
    pub max_consumer_number: u8,
    pub tail: SafetyTail,
}

impl NetworkSegmentSafety {
    pub const fn format(&self) -> SafetyFormat {
        match self.tail {
            SafetyTail::Base { .. } => SafetyFormat::Base,
            SafetyTail::Extended { .. } => SafetyFormat::Extended,
        }
    }

    pub const fn cpcrc(&self) -> u32 {
        match self.tail {
            SafetyTail::Base { cpcrc, .. } | SafetyTail::Extended { cpcrc, .. } => cpcrc,
        }
    }

    pub const fn tcorr_connection_id(&self) -> u32 {
        match self.tail {
            SafetyTail::Base {
                tcorr_connection_id,
                ..
            }
            | SafetyTail::Extended {
                tcorr_connection_id,
                ..
            } => tcorr_connection_id,
        }
    }

    /// Faults tolerated before a consumer is faulted. `None` for Base, which
    /// faults on the first failed check.
    pub const fn max_fault_number(&self) -> Option<u16> {
        match self.tail {
            SafetyTail::Base { .. } => None,
            SafetyTail::Extended {
                max_fault_number, ..
            } => Some(max_fault_number),
        }
    }
}

/// Parse a network safety segment, starting at its segment type byte.
///
/// The declared size and the format code must agree before any format
/// specific field is read.
///
/// # Errors
/// - [`SceError::SafetySegmentFormat`] if size and format code do not form a legal pair
/// - [`SceError::NotEnoughData`] if the segment is shorter than its format requires
pub fn parse_network_segment_safety(segment: &[u8]) -> Result<NetworkSegmentSafety, SceError> {
    let (Some(&words), Some(&format)) = (segment.get(1), segment.get(2)) else {
        return Err(SceError::NotEnoughData {
            expected: 3,
            actual: segment.len(),
        });
    };
    let safety_format = match (words, format) {
        (BASE_SEGMENT_WORDS, FORMAT_BASE_TARGET) => SafetyFormat::Base,
        (EXTENDED_SEGMENT_WORDS, FORMAT_EXTENDED_TARGET) => SafetyFormat::Extended,
        _ => return Err(SceError::SafetySegmentFormat { words, format }),
    };
    let expected = 2 + 2 * usize::from(words);
    let short = || SceError::NotEnoughData {
        expected,
        actual: segment.len(),
    };
    if segment.len() < expected {
        return Err(short());
    }

    // type, size, format, reserved
    let mut reader = WireReader::new(&segment[4..expected]);
    let sccrc = reader.read_u32().ok_or_else(short)?;
    let scts = Scts {
        time: reader.read_u32().ok_or_else(short)?,
        date: reader.read_u16().ok_or_else(short)?,
    };
    let tcorr_epi = reader.read_u32().ok_or_else(short)?;
    let tcorr_params = NetConnParams::from(reader.read_u16().ok_or_else(short)?);
    let tunid = Unid::from_bytes(reader.read_array().ok_or_else(short)?);
    let ounid = Unid::from_bytes(reader.read_array().ok_or_else(short)?);
    let ping_interval_multiplier = reader.read_u16().ok_or_else(short)?;
    let tcoo_min_multiplier = reader.read_u16().ok_or_else(short)?;
    let net_time_expectation_multiplier = reader.read_u16().ok_or_else(short)?;
    let timeout_multiplier = reader.read_u8().ok_or_else(short)?;
    let max_consumer_number = reader.read_u8().ok_or_else(short)?;

    let tail = match safety_format {
        SafetyFormat::Base => SafetyTail::Base {
            cpcrc: reader.read_u32().ok_or_else(short)?,
            tcorr_connection_id: reader.read_u32().ok_or_else(short)?,
        },
        SafetyFormat::Extended => SafetyTail::Extended {
            max_fault_number: reader.read_u16().ok_or_else(short)?,
            cpcrc: reader.read_u32().ok_or_else(short)?,
            tcorr_connection_id: reader.read_u32().ok_or_else(short)?,
            initial_time_stamp: reader.read_u16().ok_or_else(short)?,
            initial_rollover: reader.read_u16().ok_or_else(short)?,
        },
    };

    Ok(NetworkSegmentSafety {
        sccrc,
        scts,
        tcorr_epi,
        tcorr_params,
        tunid,
        ounid,
        ping_interval_multiplier,
        tcoo_min_multiplier,
        net_time_expectation_multiplier,
        timeout_multiplier,
        max_consumer_number,
        tail,
    })
}
