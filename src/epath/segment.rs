use super::{EPathFields, ElectronicKey, EpathError, PathEncoding};
use crate::wire::WireReader;

const SEGMENT_TYPE_MASK: u8 = 0xE0;
const SEGMENT_LOGICAL: u8 = 0x20;
const SEGMENT_NETWORK: u8 = 0x40;
const SEGMENT_DATA: u8 = 0x80;

const LOGICAL_TYPE_MASK: u8 = 0x1C;
const LOGICAL_CLASS: u8 = 0x00;
const LOGICAL_INSTANCE: u8 = 0x04;
const LOGICAL_MEMBER: u8 = 0x08;
const LOGICAL_CONN_POINT: u8 = 0x0C;
const LOGICAL_ATTRIBUTE: u8 = 0x10;
const LOGICAL_SPECIAL: u8 = 0x14;

const LOGICAL_FORMAT_MASK: u8 = 0x03;
const LOGICAL_FORMAT_8: u8 = 0x00;
const LOGICAL_FORMAT_16: u8 = 0x01;
const LOGICAL_FORMAT_32: u8 = 0x02;

/// The only key format understood: the key format table.
const KEY_FORMAT_TABLE: u8 = 0x04;
const ELECTRONIC_KEY_SIZE: usize = 10;
const MAJOR_REVISION_MASK: u8 = 0x7F;
const COMPATIBILITY_BIT: u8 = 0x80;

const NETWORK_SAFETY_SEGMENT: u8 = 0x50;
const SIMPLE_DATA_SEGMENT: u8 = 0x80;

/// Parse the segment starting at `offset` and return the number of bytes it
/// occupies. The caller compares that against the declared path length.
pub(super) fn parse_segment<'a>(
    bytes: &'a [u8],
    offset: usize,
    encoding: PathEncoding,
    fields: &mut EPathFields<'a>,
) -> Result<usize, EpathError> {
    let segment = &bytes[offset..];
    let Some(&segment_type) = segment.first() else {
        return Err(truncated(offset, 1, 0));
    };
    match segment_type & SEGMENT_TYPE_MASK {
        SEGMENT_LOGICAL => parse_logical(segment, offset, encoding, fields),
        SEGMENT_NETWORK => parse_network(segment, offset, fields),
        SEGMENT_DATA => parse_data(segment, offset, fields),
        _ => Err(EpathError::SegmentType(segment_type)),
    }
}

fn truncated(offset: usize, needed: usize, available: usize) -> EpathError {
    EpathError::Truncated {
        offset,
        needed,
        available,
    }
}

fn parse_logical<'a>(
    segment: &'a [u8],
    offset: usize,
    encoding: PathEncoding,
    fields: &mut EPathFields<'a>,
) -> Result<usize, EpathError> {
    let segment_type = segment[0];
    let logical_type = segment_type & LOGICAL_TYPE_MASK;
    let format = segment_type & LOGICAL_FORMAT_MASK;

    if logical_type == LOGICAL_SPECIAL {
        if format != LOGICAL_FORMAT_8 {
            return Err(EpathError::LogicalFormat(segment_type));
        }
        return parse_electronic_key(segment, offset, fields);
    }

    let (size, value) = match format {
        LOGICAL_FORMAT_8 => (2, read_value(segment, offset, 1, 2, |r| r.read_u8().map(u32::from))?),
        LOGICAL_FORMAT_16 => {
            let pad = encoding.pad_bytes();
            let size = 3 + pad;
            (size, read_value(segment, offset, 1 + pad, size, |r| r.read_u16().map(u32::from))?)
        }
        LOGICAL_FORMAT_32 => {
            let pad = encoding.pad_bytes();
            let size = 5 + pad;
            (size, read_value(segment, offset, 1 + pad, size, |r| r.read_u32())?)
        }
        _ => return Err(EpathError::LogicalFormat(segment_type)),
    };

    match logical_type {
        LOGICAL_CLASS => fields
            .classes
            .push(value)
            .map_err(|_| EpathError::RepClass)?,
        LOGICAL_INSTANCE => fields
            .instances
            .push(value)
            .map_err(|_| EpathError::RepInstance)?,
        LOGICAL_CONN_POINT => fields
            .connection_points
            .push(value)
            .map_err(|_| EpathError::RepConnPoint)?,
        LOGICAL_ATTRIBUTE => set_once(&mut fields.attribute, value, EpathError::RepAttribute)?,
        LOGICAL_MEMBER => set_once(&mut fields.member, value, EpathError::RepMember)?,
        _ => return Err(EpathError::LogicalType(segment_type)),
    }
    Ok(size)
}

fn read_value(
    segment: &[u8],
    offset: usize,
    value_offset: usize,
    size: usize,
    read: impl FnOnce(&mut WireReader<'_>) -> Option<u32>,
) -> Result<u32, EpathError> {
    if segment.len() < size {
        return Err(truncated(offset, size, segment.len()));
    }
    let mut reader = WireReader::new(&segment[value_offset..size]);
    read(&mut reader).ok_or(truncated(offset, size, segment.len()))
}

fn set_once<T>(slot: &mut Option<T>, value: T, repeated: EpathError) -> Result<(), EpathError> {
    if slot.is_some() {
        return Err(repeated);
    }
    *slot = Some(value);
    Ok(())
}

fn parse_electronic_key(
    segment: &[u8],
    offset: usize,
    fields: &mut EPathFields<'_>,
) -> Result<usize, EpathError> {
    let Some(key_bytes) = segment.get(..ELECTRONIC_KEY_SIZE) else {
        // key format byte is checked first so an unsupported format is reported as such
        if let Some(&key_format) = segment.get(1) {
            if key_format != KEY_FORMAT_TABLE {
                return Err(EpathError::KeyFormat(key_format));
            }
        }
        return Err(truncated(offset, ELECTRONIC_KEY_SIZE, segment.len()));
    };
    if key_bytes[1] != KEY_FORMAT_TABLE {
        return Err(EpathError::KeyFormat(key_bytes[1]));
    }

    let mut reader = WireReader::new(&key_bytes[2..]);
    let (Some(vendor_id), Some(device_type), Some(product_code), Some(major), Some(minor)) = (
        reader.read_u16(),
        reader.read_u16(),
        reader.read_u16(),
        reader.read_u8(),
        reader.read_u8(),
    ) else {
        return Err(truncated(offset, ELECTRONIC_KEY_SIZE, segment.len()));
    };

    let key = ElectronicKey {
        vendor_id,
        device_type,
        product_code,
        major_revision: major & MAJOR_REVISION_MASK,
        compatibility: major & COMPATIBILITY_BIT != 0,
        minor_revision: minor,
    };
    set_once(&mut fields.electronic_key, key, EpathError::RepElectronicKey)?;
    Ok(ELECTRONIC_KEY_SIZE)
}

/// Word-counted segment: type byte, size in words, payload.
fn word_counted<'a>(segment: &'a [u8], offset: usize) -> Result<(&'a [u8], usize), EpathError> {
    let Some(&words) = segment.get(1) else {
        return Err(truncated(offset, 2, segment.len()));
    };
    let size = 2 + 2 * usize::from(words);
    let whole = segment
        .get(..size)
        .ok_or(truncated(offset, size, segment.len()))?;
    Ok((whole, size))
}

fn parse_network<'a>(
    segment: &'a [u8],
    offset: usize,
    fields: &mut EPathFields<'a>,
) -> Result<usize, EpathError> {
    if segment[0] != NETWORK_SAFETY_SEGMENT {
        return Err(EpathError::NetworkSegmentType(segment[0]));
    }
    let (whole, size) = word_counted(segment, offset)?;
    set_once(&mut fields.network_segment, whole, EpathError::RepNetSegment)?;
    Ok(size)
}

fn parse_data<'a>(
    segment: &'a [u8],
    offset: usize,
    fields: &mut EPathFields<'a>,
) -> Result<usize, EpathError> {
    if segment[0] != SIMPLE_DATA_SEGMENT {
        return Err(EpathError::DataSegmentType(segment[0]));
    }
    let (whole, size) = word_counted(segment, offset)?;
    set_once(&mut fields.data_segment, &whole[2..], EpathError::RepDataSegment)?;
    Ok(size)
}
