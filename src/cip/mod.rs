//! CIP object model constants shared by the safety units.

mod status;

pub use status::{CipStatus, ExtendedStatus, GeneralStatus};

/// Class code of the Assembly object. Every safety application path points at assemblies.
pub const ASSEMBLY_CLASS: u32 = 0x04;

/// Forward_Open service code of the Connection Manager.
pub const SERVICE_FORWARD_OPEN: u8 = 0x54;
/// Forward_Close service code of the Connection Manager.
pub const SERVICE_FORWARD_CLOSE: u8 = 0x4E;
/// Bit set in the service code of a reply.
pub const SERVICE_REPLY_FLAG: u8 = 0x80;

/// Transport class/trigger byte of a safety I/O connection: class 0, cyclic trigger.
/// The direction bit (bit 7) is not evaluated.
pub const SAFETY_TRANSPORT_CLASS_TRIGGER: u8 = 0x00;
pub const TRANSPORT_DIRECTION_BIT: u8 = 0x80;

/// Decoded 16-bit network connection parameters word.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NetConnParams(u16);

/// Connection type field of [`NetConnParams`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionType {
    Null,
    Multicast,
    PointToPoint,
    Reserved,
}

impl From<u16> for NetConnParams {
    fn from(value: u16) -> Self {
        NetConnParams(value)
    }
}

impl From<NetConnParams> for u16 {
    fn from(params: NetConnParams) -> u16 {
        params.0
    }
}

impl NetConnParams {
    const REDUNDANT_OWNER: u16 = 0x8000;
    const VARIABLE_SIZE: u16 = 0x0200;
    const SIZE_MASK: u16 = 0x01FF;

    pub const fn new(connection_type: ConnectionType, size: u16) -> Self {
        let type_bits = match connection_type {
            ConnectionType::Null => 0,
            ConnectionType::Multicast => 1,
            ConnectionType::PointToPoint => 2,
            ConnectionType::Reserved => 3,
        };
        NetConnParams((type_bits << 13) | (size & Self::SIZE_MASK))
    }

    #[inline]
    pub const fn redundant_owner(&self) -> bool {
        self.0 & Self::REDUNDANT_OWNER != 0
    }

    #[inline]
    pub const fn connection_type(&self) -> ConnectionType {
        match (self.0 >> 13) & 0x03 {
            0 => ConnectionType::Null,
            1 => ConnectionType::Multicast,
            2 => ConnectionType::PointToPoint,
            _ => ConnectionType::Reserved,
        }
    }

    #[inline]
    pub const fn priority(&self) -> u8 {
        ((self.0 >> 10) & 0x03) as u8
    }

    /// `true` when the variable-size bit is set. Safety connections are always fixed size.
    #[inline]
    pub const fn is_variable(&self) -> bool {
        self.0 & Self::VARIABLE_SIZE != 0
    }

    /// Connection size in bytes.
    #[inline]
    pub const fn size(&self) -> u16 {
        self.0 & Self::SIZE_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_conn_params_fields() {
        let params = NetConnParams::from(0x4808);
        assert!(!params.redundant_owner());
        assert_eq!(params.connection_type(), ConnectionType::PointToPoint);
        assert_eq!(params.priority(), 2);
        assert!(!params.is_variable());
        assert_eq!(params.size(), 8);

        let multicast = NetConnParams::new(ConnectionType::Multicast, 14);
        assert_eq!(u16::from(multicast), 0x200E);
        assert_eq!(multicast.connection_type(), ConnectionType::Multicast);
    }

    #[test]
    fn test_net_conn_params_flags() {
        let params = NetConnParams::from(0x8000 | 0x0200 | 0x0006);
        assert!(params.redundant_owner());
        assert!(params.is_variable());
        assert_eq!(params.connection_type(), ConnectionType::Null);
    }
}
