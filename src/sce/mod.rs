//! Safety connection establishment: SafetyOpen (Forward_Open) and SafetyClose
//! (Forward_Close) parsing, validation and replies.
//!
//! # Example
//!
//! ```
//! use cip_safety::sce::{parse_forward_close, ConnectionTriad};
//!
//! let request = [0x0A, 0xF0, 0x02, 0x01, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00];
//! let close = parse_forward_close(&request).unwrap();
//! assert_eq!(
//!     close.triad,
//!     ConnectionTriad { connection_serial: 0x0102, vendor_id: 0x1234, originator_serial: 0xDEAD_BEEF }
//! );
//! ```

mod app_path;
mod error;
mod forward_close;
mod forward_open;
mod reply;
mod safety_segment;
mod validate;

pub use app_path::{AppPath, AppPathFormat, classify_app_path};
pub use error::SceError;
pub use forward_close::{FORWARD_CLOSE_HEADER_SIZE, ForwardCloseRequest, parse_forward_close};
pub use forward_open::{FORWARD_OPEN_HEADER_SIZE, SafetyOpenParameters, parse_forward_open};
pub use reply::{
    ForwardCloseReply, ForwardOpenFailure, ForwardOpenSuccess, MAX_REPLY_SIZE, ReplyHeader,
    SafetyAppReply,
};
pub use safety_segment::{
    BASE_SEGMENT_WORDS, EXTENDED_SEGMENT_WORDS, NetworkSegmentSafety, SafetyTail,
    parse_network_segment_safety,
};
pub use validate::{OpenPlan, ValidatorKind, check_electronic_key, validate_forward_open};

#[cfg(test)]
pub(crate) use forward_open::tests as test_requests;

use crate::cip::ExtendedStatus;

/// Vendor ID, originator serial number and connection serial number. Unique
/// per connection and the key every SafetyClose is matched by.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ConnectionTriad {
    pub connection_serial: u16,
    pub vendor_id: u16,
    pub originator_serial: u32,
}

impl ConnectionTriad {
    /// Vendor ID, originator serial, connection serial; little-endian. This is
    /// the byte string the CRC seeds are computed from.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..2].copy_from_slice(&self.vendor_id.to_le_bytes());
        bytes[2..6].copy_from_slice(&self.originator_serial.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.connection_serial.to_le_bytes());
        bytes
    }
}

/// Unique network identifier: safety network number plus node ID.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Unid {
    pub snn: [u8; 6],
    pub node_id: u32,
}

impl Unid {
    pub const SIZE: usize = 10;

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        let mut snn = [0u8; 6];
        snn.copy_from_slice(&bytes[..6]);
        Self {
            snn,
            node_id: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..6].copy_from_slice(&self.snn);
        bytes[6..].copy_from_slice(&self.node_id.to_le_bytes());
        bytes
    }
}

/// Safety configuration time stamp.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Scts {
    pub time: u32,
    pub date: u16,
}

/// Direction of one half of a connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    OriginatorToTarget,
    TargetToOriginator,
}

/// Position of an entry in the application path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathPosition {
    Config,
    Consuming,
    Producing,
}

impl PathPosition {
    pub const ALL: [PathPosition; 3] = [
        PathPosition::Config,
        PathPosition::Consuming,
        PathPosition::Producing,
    ];

    pub(crate) const fn extended_status(self) -> ExtendedStatus {
        match self {
            PathPosition::Config => ExtendedStatus::InvalidConfigPath,
            PathPosition::Consuming => ExtendedStatus::InvalidConsumingPath,
            PathPosition::Producing => ExtendedStatus::InvalidProducingPath,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triad_bytes() {
        let triad = ConnectionTriad {
            connection_serial: 0x0102,
            vendor_id: 0x1234,
            originator_serial: 0xDEAD_BEEF,
        };
        assert_eq!(
            triad.to_bytes(),
            [0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE, 0x02, 0x01]
        );
    }

    #[test]
    fn test_unid_bytes() {
        let bytes = [1, 2, 3, 4, 5, 6, 0x78, 0x56, 0x34, 0x12];
        let unid = Unid::from_bytes(bytes);
        assert_eq!(unid.snn, [1, 2, 3, 4, 5, 6]);
        assert_eq!(unid.node_id, 0x1234_5678);
        assert_eq!(unid.to_bytes(), bytes);
    }
}
