use thiserror::Error;

use super::{Direction, PathPosition};
use crate::cip::{CipStatus, ExtendedStatus, GeneralStatus};
use crate::epath::{EpathError, FieldMask};
use crate::error::{Classify, Severity, Unit};

/// Rejection of a SafetyOpen or SafetyClose request.
///
/// Every variant maps to the general/extended status pair returned in the
/// Unsuccessful reply, see [`SceError::status`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceError {
    #[error("Request carries {actual} bytes, expected {expected}")]
    TooMuchData { expected: usize, actual: usize },
    #[error("Request carries {actual} bytes, expected {expected}")]
    NotEnoughData { expected: usize, actual: usize },
    #[error("Connection path: {0}")]
    Path(#[from] EpathError),
    #[error("No application path shape matches segment mask 0x{mask:04X}", mask = .0.bits())]
    AppPathShape(FieldMask),
    #[error("Unexpected segments 0x{mask:04X} in application path", mask = .0.bits())]
    UnexpectedSegments(FieldMask),
    #[error("Connection path carries no network safety segment")]
    MissingSafetySegment,
    #[error("{0:?} path points at class 0x{1:X}, expected the Assembly class")]
    WrongClass(PathPosition, u32),
    #[error("{0:?} instance 0x{1:X} does not fit 16 bits")]
    InstanceRange(PathPosition, u32),
    #[error("Safety segment of {words} words with format code {format}")]
    SafetySegmentFormat { words: u8, format: u8 },
    #[error("Unsupported transport class/trigger 0x{0:02X}")]
    TransportClassTrigger(u8),
    #[error("Redundant owner requested on O->T")]
    RedundantOwner,
    #[error("Variable size requested on {0:?}")]
    VariableSize(Direction),
    #[error("Unsupported connection type on {0:?}")]
    ConnectionType(Direction),
    #[error("Both connections are null")]
    NullConnection,
    #[error("Invalid connection size {size} on {direction:?}")]
    ConnectionSize { direction: Direction, size: u16 },
    #[error("Neither connection carries time coordination")]
    NoTimeCoordination,
    #[error("Time coordination RPI {rpi} us, expected {expected} us")]
    RpiMismatch { rpi: u32, expected: u64 },
    #[error("EPI of {0} us not supported")]
    EpiRange(u32),
    #[error("Invalid time correction parameters")]
    TcorrParameters,
    #[error("Ping interval EPI multiplier {0} out of range")]
    PingIntervalMultiplier(u16),
    #[error("Time coordination min multiplier {0} out of range")]
    TcooMinMultiplier(u16),
    #[error("Network time expectation multiplier {0} out of range")]
    NetTimeExpectation(u16),
    #[error("Timeout multiplier {0} out of range")]
    TimeoutMultiplier(u8),
    #[error("Max consumer number {0} not acceptable")]
    MaxConsumerNumber(u8),
    #[error("Max fault number {0} out of range")]
    MaxFaultNumber(u16),
    #[error("Electronic key vendor ID or product code mismatch")]
    VendorOrProductCode,
    #[error("Electronic key device type mismatch")]
    DeviceType,
    #[error("Electronic key revision mismatch")]
    Revision,
    #[error("TUNID does not match this device")]
    TunidMismatch,
    #[error("Connection triad already in use")]
    DuplicateConnection,
    #[error("No free safety validator instance")]
    OutOfConnections,
    #[error("No consumer number available")]
    ConsumerNumberUnavailable,
    #[error("No connection with this triad")]
    ConnectionNotFound,
}

impl SceError {
    pub const CODE_TOO_MUCH_DATA: u8 = 0x01;
    pub const CODE_NOT_ENOUGH_DATA: u8 = 0x02;
    pub const CODE_APP_PATH_SHAPE: u8 = 0x04;
    pub const CODE_UNEXPECTED_SEGMENTS: u8 = 0x05;
    pub const CODE_MISSING_SAFETY_SEGMENT: u8 = 0x06;
    pub const CODE_WRONG_CLASS: u8 = 0x07;
    pub const CODE_INSTANCE_RANGE: u8 = 0x08;
    pub const CODE_SAFETY_SEGMENT_FORMAT: u8 = 0x09;
    pub const CODE_TRANSPORT_CLASS_TRIGGER: u8 = 0x0A;
    pub const CODE_REDUNDANT_OWNER: u8 = 0x0B;
    pub const CODE_VARIABLE_SIZE: u8 = 0x0C;
    pub const CODE_CONNECTION_TYPE: u8 = 0x0D;
    pub const CODE_NULL_CONNECTION: u8 = 0x0E;
    pub const CODE_CONNECTION_SIZE: u8 = 0x0F;
    pub const CODE_NO_TIME_COORDINATION: u8 = 0x10;
    pub const CODE_RPI_MISMATCH: u8 = 0x11;
    pub const CODE_EPI_RANGE: u8 = 0x12;
    pub const CODE_TCORR_PARAMETERS: u8 = 0x13;
    pub const CODE_PING_INTERVAL_MULTIPLIER: u8 = 0x14;
    pub const CODE_TCOO_MIN_MULTIPLIER: u8 = 0x15;
    pub const CODE_NET_TIME_EXPECTATION: u8 = 0x16;
    pub const CODE_TIMEOUT_MULTIPLIER: u8 = 0x17;
    pub const CODE_MAX_CONSUMER_NUMBER: u8 = 0x18;
    pub const CODE_MAX_FAULT_NUMBER: u8 = 0x19;
    pub const CODE_VENDOR_OR_PRODUCT_CODE: u8 = 0x1A;
    pub const CODE_DEVICE_TYPE: u8 = 0x1B;
    pub const CODE_REVISION: u8 = 0x1C;
    pub const CODE_TUNID_MISMATCH: u8 = 0x1D;
    pub const CODE_DUPLICATE_CONNECTION: u8 = 0x1E;
    pub const CODE_OUT_OF_CONNECTIONS: u8 = 0x1F;
    pub const CODE_CONSUMER_NUMBER_UNAVAILABLE: u8 = 0x20;
    pub const CODE_CONNECTION_NOT_FOUND: u8 = 0x21;

    pub(crate) const DESCRIPTIONS: &'static [(u8, &'static str)] = &[
        (Self::CODE_TOO_MUCH_DATA, "too much data"),
        (Self::CODE_NOT_ENOUGH_DATA, "not enough data"),
        (Self::CODE_APP_PATH_SHAPE, "unsupported application path"),
        (Self::CODE_UNEXPECTED_SEGMENTS, "unexpected path segments"),
        (Self::CODE_MISSING_SAFETY_SEGMENT, "missing safety segment"),
        (Self::CODE_WRONG_CLASS, "application path class not Assembly"),
        (Self::CODE_INSTANCE_RANGE, "instance out of range"),
        (Self::CODE_SAFETY_SEGMENT_FORMAT, "safety segment format"),
        (Self::CODE_TRANSPORT_CLASS_TRIGGER, "transport class/trigger"),
        (Self::CODE_REDUNDANT_OWNER, "redundant owner"),
        (Self::CODE_VARIABLE_SIZE, "variable size connection"),
        (Self::CODE_CONNECTION_TYPE, "connection type"),
        (Self::CODE_NULL_CONNECTION, "null connection"),
        (Self::CODE_CONNECTION_SIZE, "connection size"),
        (Self::CODE_NO_TIME_COORDINATION, "no time coordination connection"),
        (Self::CODE_RPI_MISMATCH, "RPI not acceptable"),
        (Self::CODE_EPI_RANGE, "EPI not supported"),
        (Self::CODE_TCORR_PARAMETERS, "time correction parameters"),
        (Self::CODE_PING_INTERVAL_MULTIPLIER, "ping interval multiplier"),
        (Self::CODE_TCOO_MIN_MULTIPLIER, "time coordination min multiplier"),
        (Self::CODE_NET_TIME_EXPECTATION, "network time expectation multiplier"),
        (Self::CODE_TIMEOUT_MULTIPLIER, "timeout multiplier"),
        (Self::CODE_MAX_CONSUMER_NUMBER, "max consumer number"),
        (Self::CODE_MAX_FAULT_NUMBER, "max fault number"),
        (Self::CODE_VENDOR_OR_PRODUCT_CODE, "vendor ID or product code mismatch"),
        (Self::CODE_DEVICE_TYPE, "device type mismatch"),
        (Self::CODE_REVISION, "revision mismatch"),
        (Self::CODE_TUNID_MISMATCH, "TUNID mismatch"),
        (Self::CODE_DUPLICATE_CONNECTION, "duplicate connection"),
        (Self::CODE_OUT_OF_CONNECTIONS, "out of connections"),
        (Self::CODE_CONSUMER_NUMBER_UNAVAILABLE, "consumer number unavailable"),
        (Self::CODE_CONNECTION_NOT_FOUND, "connection not found"),
    ];

    /// Status pair returned to the requester.
    pub fn status(&self) -> CipStatus {
        use ExtendedStatus as Ext;
        let ext = match self {
            SceError::TooMuchData { .. } => {
                return CipStatus::general_only(GeneralStatus::TooMuchData);
            }
            SceError::NotEnoughData { .. } => {
                return CipStatus::general_only(GeneralStatus::NotEnoughData);
            }
            SceError::Path(err) => return CipStatus::general_only(err.general_status()),
            SceError::AppPathShape(_)
            | SceError::UnexpectedSegments(_)
            | SceError::MissingSafetySegment => {
                return CipStatus::general_only(GeneralStatus::PathSegmentError);
            }
            SceError::WrongClass(position, _) | SceError::InstanceRange(position, _) => {
                position.extended_status()
            }
            SceError::SafetySegmentFormat { .. } => Ext::SafetySegmentFormat,
            SceError::TransportClassTrigger(_) => Ext::TransportClassTrigger,
            SceError::RedundantOwner => Ext::InvalidOtRedundantOwner,
            SceError::VariableSize(Direction::OriginatorToTarget) => Ext::InvalidOtFixVar,
            SceError::VariableSize(Direction::TargetToOriginator) => Ext::InvalidToFixVar,
            SceError::ConnectionType(Direction::OriginatorToTarget) => Ext::InvalidOtConnectionType,
            SceError::ConnectionType(Direction::TargetToOriginator) => Ext::InvalidToConnectionType,
            SceError::NullConnection => Ext::NullForwardOpenNotSupported,
            SceError::ConnectionSize {
                direction: Direction::OriginatorToTarget,
                ..
            } => Ext::InvalidOtSize,
            SceError::ConnectionSize {
                direction: Direction::TargetToOriginator,
                ..
            } => Ext::InvalidToSize,
            SceError::NoTimeCoordination => Ext::InvalidConnectionSize,
            SceError::RpiMismatch { .. } => Ext::RpiNotAcceptable,
            SceError::EpiRange(_) => Ext::SafetyRpiNotSupported,
            SceError::TcorrParameters => Ext::TcorrParameters,
            SceError::PingIntervalMultiplier(_) => Ext::PingIntervalMultiplier,
            SceError::TcooMinMultiplier(_) => Ext::TcooMinMultiplier,
            SceError::NetTimeExpectation(_) => Ext::NetTimeExpectationMultiplier,
            SceError::TimeoutMultiplier(_) => Ext::TimeoutMultiplier,
            SceError::MaxConsumerNumber(_) => Ext::MaxConsumerNumber,
            SceError::MaxFaultNumber(_) => Ext::MaxFaultNumber,
            SceError::VendorOrProductCode => Ext::VendorIdOrProductCode,
            SceError::DeviceType => Ext::DeviceType,
            SceError::Revision => Ext::Revision,
            SceError::TunidMismatch => Ext::TunidMismatch,
            SceError::DuplicateConnection => Ext::DuplicateForwardOpen,
            SceError::OutOfConnections => Ext::OutOfConnections,
            SceError::ConsumerNumberUnavailable => Ext::ConsumerNumberUnavailable,
            SceError::ConnectionNotFound => Ext::ConnectionNotFound,
        };
        CipStatus::connection_failure(ext)
    }
}

impl Classify for SceError {
    fn unit(&self) -> Unit {
        match self {
            SceError::Path(err) => err.unit(),
            _ => Unit::Sce,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            SceError::Path(err) => err.severity(),
            _ => Severity::NotFailSafe,
        }
    }

    fn local_code(&self) -> u8 {
        match self {
            SceError::TooMuchData { .. } => Self::CODE_TOO_MUCH_DATA,
            SceError::NotEnoughData { .. } => Self::CODE_NOT_ENOUGH_DATA,
            SceError::Path(err) => err.local_code(),
            SceError::AppPathShape(_) => Self::CODE_APP_PATH_SHAPE,
            SceError::UnexpectedSegments(_) => Self::CODE_UNEXPECTED_SEGMENTS,
            SceError::MissingSafetySegment => Self::CODE_MISSING_SAFETY_SEGMENT,
            SceError::WrongClass(..) => Self::CODE_WRONG_CLASS,
            SceError::InstanceRange(..) => Self::CODE_INSTANCE_RANGE,
            SceError::SafetySegmentFormat { .. } => Self::CODE_SAFETY_SEGMENT_FORMAT,
            SceError::TransportClassTrigger(_) => Self::CODE_TRANSPORT_CLASS_TRIGGER,
            SceError::RedundantOwner => Self::CODE_REDUNDANT_OWNER,
            SceError::VariableSize(_) => Self::CODE_VARIABLE_SIZE,
            SceError::ConnectionType(_) => Self::CODE_CONNECTION_TYPE,
            SceError::NullConnection => Self::CODE_NULL_CONNECTION,
            SceError::ConnectionSize { .. } => Self::CODE_CONNECTION_SIZE,
            SceError::NoTimeCoordination => Self::CODE_NO_TIME_COORDINATION,
            SceError::RpiMismatch { .. } => Self::CODE_RPI_MISMATCH,
            SceError::EpiRange(_) => Self::CODE_EPI_RANGE,
            SceError::TcorrParameters => Self::CODE_TCORR_PARAMETERS,
            SceError::PingIntervalMultiplier(_) => Self::CODE_PING_INTERVAL_MULTIPLIER,
            SceError::TcooMinMultiplier(_) => Self::CODE_TCOO_MIN_MULTIPLIER,
            SceError::NetTimeExpectation(_) => Self::CODE_NET_TIME_EXPECTATION,
            SceError::TimeoutMultiplier(_) => Self::CODE_TIMEOUT_MULTIPLIER,
            SceError::MaxConsumerNumber(_) => Self::CODE_MAX_CONSUMER_NUMBER,
            SceError::MaxFaultNumber(_) => Self::CODE_MAX_FAULT_NUMBER,
            SceError::VendorOrProductCode => Self::CODE_VENDOR_OR_PRODUCT_CODE,
            SceError::DeviceType => Self::CODE_DEVICE_TYPE,
            SceError::Revision => Self::CODE_REVISION,
            SceError::TunidMismatch => Self::CODE_TUNID_MISMATCH,
            SceError::DuplicateConnection => Self::CODE_DUPLICATE_CONNECTION,
            SceError::OutOfConnections => Self::CODE_OUT_OF_CONNECTIONS,
            SceError::ConsumerNumberUnavailable => Self::CODE_CONSUMER_NUMBER_UNAVAILABLE,
            SceError::ConnectionNotFound => Self::CODE_CONNECTION_NOT_FOUND,
        }
    }
}
