use tracing::debug;

use super::{
    AppPath, ConnectionTriad, NetworkSegmentSafety, SceError, classify_app_path,
    parse_network_segment_safety,
};
use crate::cip::NetConnParams;
use crate::config::Role;
use crate::epath::{self, ElectronicKey, PathEncoding};
use crate::wire::WireReader;

/// Fixed part of a Forward_Open request, up to and including the path size.
pub const FORWARD_OPEN_HEADER_SIZE: usize = 36;

/// Everything a SafetyOpen request carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SafetyOpenParameters<'a> {
    pub priority_tick: u8,
    pub timeout_ticks: u8,
    pub ot_connection_id: u32,
    pub to_connection_id: u32,
    pub triad: ConnectionTriad,
    /// Connection timeout multiplier of the request header, not the safety one.
    pub connection_timeout_multiplier: u8,
    pub ot_rpi: u32,
    pub ot_params: NetConnParams,
    pub to_rpi: u32,
    pub to_params: NetConnParams,
    pub transport_class_trigger: u8,
    /// Connection path size in words.
    pub path_words: u8,
    pub app_path: AppPath,
    pub electronic_key: Option<ElectronicKey>,
    /// Payload of the simple data segment (configuration data), if any.
    pub config_data: Option<&'a [u8]>,
    pub safety: NetworkSegmentSafety,
}

/// Parse a SafetyOpen request body (everything after the message router
/// request path).
///
/// # Errors
/// - [`SceError::TooMuchData`] / [`SceError::NotEnoughData`] if the length
///   disagrees with the declared path size
/// - path, application path or safety segment errors
pub fn parse_forward_open(bytes: &[u8], role: Role) -> Result<SafetyOpenParameters<'_>, SceError> {
    let short = || SceError::NotEnoughData {
        expected: FORWARD_OPEN_HEADER_SIZE,
        actual: bytes.len(),
    };
    let mut reader = WireReader::new(bytes);
    let priority_tick = reader.read_u8().ok_or_else(short)?;
    let timeout_ticks = reader.read_u8().ok_or_else(short)?;
    let ot_connection_id = reader.read_u32().ok_or_else(short)?;
    let to_connection_id = reader.read_u32().ok_or_else(short)?;
    let triad = ConnectionTriad {
        connection_serial: reader.read_u16().ok_or_else(short)?,
        vendor_id: reader.read_u16().ok_or_else(short)?,
        originator_serial: reader.read_u32().ok_or_else(short)?,
    };
    let connection_timeout_multiplier = reader.read_u8().ok_or_else(short)?;
    reader.skip(3).ok_or_else(short)?;
    let ot_rpi = reader.read_u32().ok_or_else(short)?;
    let ot_params = NetConnParams::from(reader.read_u16().ok_or_else(short)?);
    let to_rpi = reader.read_u32().ok_or_else(short)?;
    let to_params = NetConnParams::from(reader.read_u16().ok_or_else(short)?);
    let transport_class_trigger = reader.read_u8().ok_or_else(short)?;
    let path_words = reader.read_u8().ok_or_else(short)?;

    let path_len = 2 * usize::from(path_words);
    let expected = FORWARD_OPEN_HEADER_SIZE + path_len;
    if bytes.len() > expected {
        return Err(SceError::TooMuchData {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() < expected {
        return Err(SceError::NotEnoughData {
            expected,
            actual: bytes.len(),
        });
    }

    let fields = epath::parse(&bytes[FORWARD_OPEN_HEADER_SIZE..], PathEncoding::Padded, path_len)?;
    let format = classify_app_path(fields.mask(), role)?;
    let app_path = AppPath::from_fields(format, &fields)?;
    app_path.check()?;
    let segment = fields.network_segment.ok_or(SceError::MissingSafetySegment)?;
    let safety = parse_network_segment_safety(segment)?;

    debug!(
        "SafetyOpen {:?}: {:?} path, {:?} format, O->T 0x{:04X} T->O 0x{:04X}",
        triad,
        format,
        safety.format(),
        u16::from(ot_params),
        u16::from(to_params)
    );

    Ok(SafetyOpenParameters {
        priority_tick,
        timeout_ticks,
        ot_connection_id,
        to_connection_id,
        triad,
        connection_timeout_multiplier,
        ot_rpi,
        ot_params,
        to_rpi,
        to_params,
        transport_class_trigger,
        path_words,
        app_path,
        electronic_key: fields.electronic_key,
        config_data: fields.data_segment,
        safety,
    })
}
