//! EPATH decoding.
//!
//! A connection path is a sequence of segments. [`parse`] walks the segments of a
//! declared path length and collects them into an [`EPathFields`]. Every field
//! kind has a fixed number of slots; a path that repeats a kind more often than
//! that is rejected with the matching `Rep*` error instead of being truncated.
//!
//! ```
//! use cip_safety::epath::{self, FieldMask, PathEncoding};
//!
//! // class 0x04, instance 0x64, connection points 0x96 and 0x65
//! let path = [0x20, 0x04, 0x24, 0x64, 0x2C, 0x96, 0x2C, 0x65];
//! let fields = epath::parse(&path, PathEncoding::Padded, path.len()).unwrap();
//! assert_eq!(
//!     fields.mask(),
//!     FieldMask::CLASS1 | FieldMask::INST1 | FieldMask::CP1 | FieldMask::CP2
//! );
//! ```

mod error;
mod segment;

pub use error::EpathError;

use tracing::trace;

/// Number of class slots of a long format path.
pub const MAX_CLASSES: usize = 3;
/// Number of instance slots of a long format path.
pub const MAX_INSTANCES: usize = 3;
/// Number of connection point slots of a compressed path.
pub const MAX_CONN_POINTS: usize = 2;

/// Whether 16/32-bit logical values are preceded by a pad byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathEncoding {
    Packed,
    Padded,
}

impl PathEncoding {
    pub(crate) const fn pad_bytes(self) -> usize {
        match self {
            PathEncoding::Packed => 0,
            PathEncoding::Padded => 1,
        }
    }
}

/// Validity bitmask of an [`EPathFields`], one bit per slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct FieldMask(u16);

impl FieldMask {
    pub const EMPTY: FieldMask = FieldMask(0);
    pub const CLASS1: FieldMask = FieldMask(0x0001);
    pub const CLASS2: FieldMask = FieldMask(0x0002);
    pub const CLASS3: FieldMask = FieldMask(0x0004);
    pub const INST1: FieldMask = FieldMask(0x0008);
    pub const INST2: FieldMask = FieldMask(0x0010);
    pub const INST3: FieldMask = FieldMask(0x0020);
    pub const CP1: FieldMask = FieldMask(0x0040);
    pub const CP2: FieldMask = FieldMask(0x0080);
    pub const ATTRIBUTE: FieldMask = FieldMask(0x0100);
    pub const MEMBER: FieldMask = FieldMask(0x0200);
    pub const ELECTRONIC_KEY: FieldMask = FieldMask(0x0400);
    pub const DATA_SEGMENT: FieldMask = FieldMask(0x0800);
    pub const NET_SEGMENT: FieldMask = FieldMask(0x1000);

    const CLASSES: [FieldMask; MAX_CLASSES] = [Self::CLASS1, Self::CLASS2, Self::CLASS3];
    const INSTANCES: [FieldMask; MAX_INSTANCES] = [Self::INST1, Self::INST2, Self::INST3];
    const CONN_POINTS: [FieldMask; MAX_CONN_POINTS] = [Self::CP1, Self::CP2];

    #[inline]
    pub const fn bits(&self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u16) -> Self {
        FieldMask(bits)
    }

    #[inline]
    pub const fn union(self, other: FieldMask) -> Self {
        FieldMask(self.0 | other.0)
    }

    /// All bits of `other` are set in `self`.
    #[inline]
    pub const fn contains(&self, other: FieldMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bits of `self` that are not part of `allowed`.
    #[inline]
    pub const fn outside(&self, allowed: FieldMask) -> FieldMask {
        FieldMask(self.0 & !allowed.0)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl core::ops::BitOr for FieldMask {
    type Output = FieldMask;
    fn bitor(self, rhs: FieldMask) -> FieldMask {
        self.union(rhs)
    }
}

impl core::ops::BitOrAssign for FieldMask {
    fn bitor_assign(&mut self, rhs: FieldMask) {
        self.0 |= rhs.0;
    }
}

/// Electronic key segment contents (key format table).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ElectronicKey {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    /// Major revision, without the compatibility bit.
    pub major_revision: u8,
    pub compatibility: bool,
    pub minor_revision: u8,
}

/// Fields collected from a path. Data and network safety segments borrow from the
/// parsed buffer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EPathFields<'a> {
    pub classes: heapless::Vec<u32, MAX_CLASSES>,
    pub instances: heapless::Vec<u32, MAX_INSTANCES>,
    pub connection_points: heapless::Vec<u32, MAX_CONN_POINTS>,
    pub attribute: Option<u32>,
    pub member: Option<u32>,
    pub electronic_key: Option<ElectronicKey>,
    /// Payload of a simple data segment.
    pub data_segment: Option<&'a [u8]>,
    /// Complete network safety segment, starting at its segment type byte.
    pub network_segment: Option<&'a [u8]>,
    /// Bytes of the path consumed by the parser.
    pub consumed: usize,
}

impl EPathFields<'_> {
    /// Validity bitmask of the collected fields.
    pub fn mask(&self) -> FieldMask {
        let mut mask = FieldMask::EMPTY;
        for bit in FieldMask::CLASSES.iter().take(self.classes.len()) {
            mask |= *bit;
        }
        for bit in FieldMask::INSTANCES.iter().take(self.instances.len()) {
            mask |= *bit;
        }
        for bit in FieldMask::CONN_POINTS.iter().take(self.connection_points.len()) {
            mask |= *bit;
        }
        if self.attribute.is_some() {
            mask |= FieldMask::ATTRIBUTE;
        }
        if self.member.is_some() {
            mask |= FieldMask::MEMBER;
        }
        if self.electronic_key.is_some() {
            mask |= FieldMask::ELECTRONIC_KEY;
        }
        if self.data_segment.is_some() {
            mask |= FieldMask::DATA_SEGMENT;
        }
        if self.network_segment.is_some() {
            mask |= FieldMask::NET_SEGMENT;
        }
        mask
    }
}

/// Parse the first `path_len` bytes of `bytes` as a sequence of segments.
///
/// # Errors
/// - if a segment is malformed, unsupported or repeats a field kind too often
/// - if a segment runs past the declared path length or the buffer
/// - [`EpathError::NoProgress`] (fail-safe) if a segment parser consumed nothing
pub fn parse(
    bytes: &[u8],
    encoding: PathEncoding,
    path_len: usize,
) -> Result<EPathFields<'_>, EpathError> {
    if path_len > bytes.len() {
        return Err(EpathError::PathBeyondBuffer {
            declared: path_len,
            available: bytes.len(),
        });
    }

    let mut fields = EPathFields::default();
    let mut offset = 0;
    while offset < path_len {
        let remaining = path_len - offset;
        let consumed = segment::parse_segment(bytes, offset, encoding, &mut fields)?;
        if consumed == 0 {
            return Err(EpathError::NoProgress { offset });
        }
        if consumed > remaining {
            return Err(EpathError::PathTooSmall {
                offset,
                consumed,
                remaining,
            });
        }
        trace!(
            "EPATH segment 0x{:02X} at offset {} consumed {} bytes",
            bytes[offset],
            offset,
            consumed
        );
        offset += consumed;
    }
    fields.consumed = offset;
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EKEY: [u8; 10] = [0x34, 0x04, 0x01, 0x00, 0x23, 0x00, 0x45, 0x00, 0x82, 0x03];

    #[test]
    fn test_long_path_mask() {
        let path = [
            0x20, 0x04, 0x24, 0x01, 0x20, 0x04, 0x24, 0x96, 0x20, 0x04, 0x24, 0x64,
        ];
        let fields = parse(&path, PathEncoding::Padded, path.len()).unwrap();
        assert_eq!(
            fields.mask(),
            FieldMask::CLASS1
                | FieldMask::CLASS2
                | FieldMask::CLASS3
                | FieldMask::INST1
                | FieldMask::INST2
                | FieldMask::INST3
        );
        assert_eq!(fields.classes.as_slice(), &[4, 4, 4]);
        assert_eq!(fields.instances.as_slice(), &[1, 0x96, 0x64]);
        assert_eq!(fields.consumed, path.len());
    }

    #[test]
    fn test_compressed_with_instances_mask() {
        let path = [0x20, 0x04, 0x24, 0x01, 0x24, 0x96, 0x24, 0x64];
        let fields = parse(&path, PathEncoding::Padded, path.len()).unwrap();
        assert_eq!(
            fields.mask(),
            FieldMask::CLASS1 | FieldMask::INST1 | FieldMask::INST2 | FieldMask::INST3
        );
    }

    #[test]
    fn test_padded_16_and_32_bit_values() {
        // 16-bit class with pad, 32-bit instance with pad
        let path = [
            0x21, 0x00, 0x34, 0x12, 0x26, 0x00, 0x78, 0x56, 0x34, 0x12,
        ];
        let fields = parse(&path, PathEncoding::Padded, path.len()).unwrap();
        assert_eq!(fields.classes.as_slice(), &[0x1234]);
        assert_eq!(fields.instances.as_slice(), &[0x1234_5678]);
    }

    #[test]
    fn test_packed_16_bit_value() {
        let path = [0x21, 0x34, 0x12, 0x25, 0x01, 0x00];
        let fields = parse(&path, PathEncoding::Packed, path.len()).unwrap();
        assert_eq!(fields.classes.as_slice(), &[0x1234]);
        assert_eq!(fields.instances.as_slice(), &[0x0001]);
    }

    #[test]
    fn test_electronic_key_data_and_safety_segments() {
        let mut path = Vec::new();
        path.extend_from_slice(&EKEY);
        path.extend_from_slice(&[0x80, 0x02, 0xAA, 0xBB, 0xCC, 0xDD]);
        path.extend_from_slice(&[0x50, 0x01, 0x00, 0x00]);
        path.extend_from_slice(&[0x20, 0x04, 0x24, 0x01]);
        let fields = parse(&path, PathEncoding::Padded, path.len()).unwrap();

        let key = fields.electronic_key.unwrap();
        assert_eq!(key.vendor_id, 1);
        assert_eq!(key.device_type, 0x23);
        assert_eq!(key.product_code, 0x45);
        assert_eq!(key.major_revision, 2);
        assert!(key.compatibility);
        assert_eq!(key.minor_revision, 3);
        assert_eq!(fields.data_segment, Some(&[0xAA, 0xBB, 0xCC, 0xDD][..]));
        assert_eq!(fields.network_segment, Some(&[0x50, 0x01, 0x00, 0x00][..]));
        assert_eq!(
            fields.mask(),
            FieldMask::ELECTRONIC_KEY
                | FieldMask::DATA_SEGMENT
                | FieldMask::NET_SEGMENT
                | FieldMask::CLASS1
                | FieldMask::INST1
        );
    }

    #[test]
    fn test_attribute_and_member() {
        let path = [0x20, 0x04, 0x24, 0x01, 0x30, 0x03, 0x28, 0x02];
        let fields = parse(&path, PathEncoding::Padded, path.len()).unwrap();
        assert_eq!(fields.attribute, Some(3));
        assert_eq!(fields.member, Some(2));
    }

    #[test]
    fn test_repetition_limits() {
        let cases: [(&[u8], EpathError); 8] = [
            (
                &[0x20, 1, 0x20, 2, 0x20, 3, 0x20, 4],
                EpathError::RepClass,
            ),
            (
                &[0x24, 1, 0x24, 2, 0x24, 3, 0x24, 4],
                EpathError::RepInstance,
            ),
            (&[0x2C, 1, 0x2C, 2, 0x2C, 3], EpathError::RepConnPoint),
            (&[0x30, 1, 0x30, 2], EpathError::RepAttribute),
            (&[0x28, 1, 0x28, 2], EpathError::RepMember),
            (
                &[
                    0x34, 0x04, 0, 0, 0, 0, 0, 0, 0, 0, 0x34, 0x04, 0, 0, 0, 0, 0, 0, 0, 0,
                ],
                EpathError::RepElectronicKey,
            ),
            (&[0x80, 0x00, 0x80, 0x00], EpathError::RepDataSegment),
            (&[0x50, 0x00, 0x50, 0x00], EpathError::RepNetSegment),
        ];
        for (path, expected) in cases {
            assert_eq!(
                parse(path, PathEncoding::Padded, path.len()),
                Err(expected),
                "path {:02X?}",
                path
            );
        }
    }

    #[test]
    fn test_segment_past_declared_length() {
        // declared length cuts the 16-bit instance segment in half
        let path = [0x20, 0x04, 0x25, 0x00, 0x01, 0x00];
        assert_eq!(
            parse(&path, PathEncoding::Padded, 4),
            Err(EpathError::PathTooSmall {
                offset: 2,
                consumed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_segment_past_buffer() {
        let path = [0x20, 0x04, 0x25, 0x00, 0x01];
        assert_eq!(
            parse(&path, PathEncoding::Padded, path.len()),
            Err(EpathError::Truncated {
                offset: 2,
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_declared_length_beyond_buffer() {
        let path = [0x20, 0x04];
        assert_eq!(
            parse(&path, PathEncoding::Padded, 4),
            Err(EpathError::PathBeyondBuffer {
                declared: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_unsupported_segments() {
        assert_eq!(
            parse(&[0x01, 0x01], PathEncoding::Padded, 2),
            Err(EpathError::SegmentType(0x01))
        );
        assert_eq!(
            parse(&[0x23, 0x00], PathEncoding::Padded, 2),
            Err(EpathError::LogicalFormat(0x23))
        );
        assert_eq!(
            parse(&[0x38, 0x00], PathEncoding::Padded, 2),
            Err(EpathError::LogicalType(0x38))
        );
        assert_eq!(
            parse(&[0x43, 0x00], PathEncoding::Padded, 2),
            Err(EpathError::NetworkSegmentType(0x43))
        );
        assert_eq!(
            parse(&[0x91, 0x00], PathEncoding::Padded, 2),
            Err(EpathError::DataSegmentType(0x91))
        );
        let mut key = EKEY;
        key[1] = 0x05;
        assert_eq!(
            parse(&key, PathEncoding::Padded, key.len()),
            Err(EpathError::KeyFormat(0x05))
        );
    }

    #[test]
    fn test_empty_path() {
        let fields = parse(&[], PathEncoding::Padded, 0).unwrap();
        assert!(fields.mask().is_empty());
        assert_eq!(fields.consumed, 0);
    }
}
