use thiserror::Error;

use crate::error::{Classify, Severity, Unit};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfaError {
    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Safety data length {0} outside 1..=250")]
    DataLength(usize),
    #[error("Frame size {0} is not a valid safety data frame")]
    FrameSize(usize),
    #[error("Transmit buffer of {available} bytes cannot hold {needed}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("Mixed write of {len} bytes at index {index} overruns telegram of {total} bytes")]
    MixOutOfRange {
        index: usize,
        len: usize,
        total: usize,
    },
    #[error("Telegram incomplete: wrote {written} of {expected} bytes")]
    IncompleteWrite { written: usize, expected: usize },
}

impl SfaError {
    pub const CODE_LENGTH_MISMATCH: u8 = 0x01;
    pub const CODE_DATA_LENGTH: u8 = 0x02;
    pub const CODE_FRAME_SIZE: u8 = 0x03;
    pub const CODE_BUFFER_TOO_SMALL: u8 = 0x04;
    pub const CODE_MIX_OUT_OF_RANGE: u8 = 0x05;
    pub const CODE_INCOMPLETE_WRITE: u8 = 0x06;

    pub(crate) const DESCRIPTIONS: &'static [(u8, &'static str)] = &[
        (Self::CODE_LENGTH_MISMATCH, "frame length mismatch"),
        (Self::CODE_DATA_LENGTH, "invalid safety data length"),
        (Self::CODE_FRAME_SIZE, "invalid safety frame size"),
        (Self::CODE_BUFFER_TOO_SMALL, "transmit buffer too small"),
        (Self::CODE_MIX_OUT_OF_RANGE, "mixed write out of range"),
        (Self::CODE_INCOMPLETE_WRITE, "telegram incomplete"),
    ];
}

impl Classify for SfaError {
    fn unit(&self) -> Unit {
        Unit::Sfa
    }

    fn severity(&self) -> Severity {
        match self {
            SfaError::FrameSize(_) => Severity::NotFailSafe,
            _ => Severity::FailSafe,
        }
    }

    fn local_code(&self) -> u8 {
        match self {
            SfaError::LengthMismatch { .. } => Self::CODE_LENGTH_MISMATCH,
            SfaError::DataLength(_) => Self::CODE_DATA_LENGTH,
            SfaError::FrameSize(_) => Self::CODE_FRAME_SIZE,
            SfaError::BufferTooSmall { .. } => Self::CODE_BUFFER_TOO_SMALL,
            SfaError::MixOutOfRange { .. } => Self::CODE_MIX_OUT_OF_RANGE,
            SfaError::IncompleteWrite { .. } => Self::CODE_INCOMPLETE_WRITE,
        }
    }
}
