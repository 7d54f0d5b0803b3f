use thiserror::Error;

use crate::cip::GeneralStatus;
use crate::error::{Classify, Severity, Unit};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpathError {
    #[error("Declared path length {declared} exceeds buffer length {available}")]
    PathBeyondBuffer { declared: usize, available: usize },
    #[error("Segment at offset {offset} needs {needed} bytes, only {available} in buffer")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Segment at offset {offset} consumes {consumed} bytes, only {remaining} left in path")]
    PathTooSmall {
        offset: usize,
        consumed: usize,
        remaining: usize,
    },
    #[error("Segment at offset {offset} consumed no bytes")]
    NoProgress { offset: usize },
    #[error("Unsupported segment type 0x{0:02X}")]
    SegmentType(u8),
    #[error("Reserved logical format in segment 0x{0:02X}")]
    LogicalFormat(u8),
    #[error("Unsupported logical type in segment 0x{0:02X}")]
    LogicalType(u8),
    #[error("Unsupported electronic key format 0x{0:02X}")]
    KeyFormat(u8),
    #[error("Unsupported data segment 0x{0:02X}")]
    DataSegmentType(u8),
    #[error("Unsupported network segment 0x{0:02X}")]
    NetworkSegmentType(u8),
    #[error("Too many class segments")]
    RepClass,
    #[error("Too many instance segments")]
    RepInstance,
    #[error("Too many connection point segments")]
    RepConnPoint,
    #[error("Repeated attribute segment")]
    RepAttribute,
    #[error("Repeated member segment")]
    RepMember,
    #[error("Repeated electronic key segment")]
    RepElectronicKey,
    #[error("Repeated data segment")]
    RepDataSegment,
    #[error("Repeated network safety segment")]
    RepNetSegment,
}

impl EpathError {
    pub const CODE_PATH_BEYOND_BUFFER: u8 = 0x01;
    pub const CODE_TRUNCATED: u8 = 0x02;
    pub const CODE_PATH_TOO_SMALL: u8 = 0x03;
    pub const CODE_NO_PROGRESS: u8 = 0x04;
    pub const CODE_SEGMENT_TYPE: u8 = 0x05;
    pub const CODE_LOGICAL_FORMAT: u8 = 0x06;
    pub const CODE_LOGICAL_TYPE: u8 = 0x07;
    pub const CODE_KEY_FORMAT: u8 = 0x08;
    pub const CODE_DATA_SEGMENT_TYPE: u8 = 0x09;
    pub const CODE_NETWORK_SEGMENT_TYPE: u8 = 0x0A;
    pub const CODE_REP_CLASS: u8 = 0x10;
    pub const CODE_REP_INSTANCE: u8 = 0x11;
    pub const CODE_REP_CONN_POINT: u8 = 0x12;
    pub const CODE_REP_ATTRIBUTE: u8 = 0x13;
    pub const CODE_REP_MEMBER: u8 = 0x14;
    pub const CODE_REP_ELECTRONIC_KEY: u8 = 0x15;
    pub const CODE_REP_DATA_SEGMENT: u8 = 0x16;
    pub const CODE_REP_NET_SEGMENT: u8 = 0x17;

    pub(crate) const DESCRIPTIONS: &'static [(u8, &'static str)] = &[
        (Self::CODE_PATH_BEYOND_BUFFER, "path length beyond buffer"),
        (Self::CODE_TRUNCATED, "segment truncated"),
        (Self::CODE_PATH_TOO_SMALL, "path too small for segment"),
        (Self::CODE_NO_PROGRESS, "segment parser made no progress"),
        (Self::CODE_SEGMENT_TYPE, "unsupported segment type"),
        (Self::CODE_LOGICAL_FORMAT, "reserved logical format"),
        (Self::CODE_LOGICAL_TYPE, "unsupported logical type"),
        (Self::CODE_KEY_FORMAT, "unsupported electronic key format"),
        (Self::CODE_DATA_SEGMENT_TYPE, "unsupported data segment"),
        (Self::CODE_NETWORK_SEGMENT_TYPE, "unsupported network segment"),
        (Self::CODE_REP_CLASS, "too many class segments"),
        (Self::CODE_REP_INSTANCE, "too many instance segments"),
        (Self::CODE_REP_CONN_POINT, "too many connection points"),
        (Self::CODE_REP_ATTRIBUTE, "repeated attribute"),
        (Self::CODE_REP_MEMBER, "repeated member"),
        (Self::CODE_REP_ELECTRONIC_KEY, "repeated electronic key"),
        (Self::CODE_REP_DATA_SEGMENT, "repeated data segment"),
        (Self::CODE_REP_NET_SEGMENT, "repeated network safety segment"),
    ];

    /// General status to put into the unsuccessful reply.
    pub fn general_status(&self) -> GeneralStatus {
        match self {
            EpathError::PathBeyondBuffer { .. } | EpathError::Truncated { .. } => {
                GeneralStatus::NotEnoughData
            }
            EpathError::PathTooSmall { .. } => GeneralStatus::PathSizeInvalid,
            _ => GeneralStatus::PathSegmentError,
        }
    }
}

impl Classify for EpathError {
    fn unit(&self) -> Unit {
        Unit::Epath
    }

    fn severity(&self) -> Severity {
        match self {
            EpathError::NoProgress { .. } => Severity::FailSafe,
            _ => Severity::NotFailSafe,
        }
    }

    fn local_code(&self) -> u8 {
        match self {
            EpathError::PathBeyondBuffer { .. } => Self::CODE_PATH_BEYOND_BUFFER,
            EpathError::Truncated { .. } => Self::CODE_TRUNCATED,
            EpathError::PathTooSmall { .. } => Self::CODE_PATH_TOO_SMALL,
            EpathError::NoProgress { .. } => Self::CODE_NO_PROGRESS,
            EpathError::SegmentType(_) => Self::CODE_SEGMENT_TYPE,
            EpathError::LogicalFormat(_) => Self::CODE_LOGICAL_FORMAT,
            EpathError::LogicalType(_) => Self::CODE_LOGICAL_TYPE,
            EpathError::KeyFormat(_) => Self::CODE_KEY_FORMAT,
            EpathError::DataSegmentType(_) => Self::CODE_DATA_SEGMENT_TYPE,
            EpathError::NetworkSegmentType(_) => Self::CODE_NETWORK_SEGMENT_TYPE,
            EpathError::RepClass => Self::CODE_REP_CLASS,
            EpathError::RepInstance => Self::CODE_REP_INSTANCE,
            EpathError::RepConnPoint => Self::CODE_REP_CONN_POINT,
            EpathError::RepAttribute => Self::CODE_REP_ATTRIBUTE,
            EpathError::RepMember => Self::CODE_REP_MEMBER,
            EpathError::RepElectronicKey => Self::CODE_REP_ELECTRONIC_KEY,
            EpathError::RepDataSegment => Self::CODE_REP_DATA_SEGMENT,
            EpathError::RepNetSegment => Self::CODE_REP_NET_SEGMENT,
        }
    }
}
