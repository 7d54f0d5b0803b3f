use thiserror::Error;

use super::crc::DataCrcFailure;
use crate::error::{Classify, Severity, Unit};
use crate::sfa::SfaError;

/// Errors of the safety validator instances.
///
/// Producer side errors (time coordination checks) belong to the SVC unit,
/// consumer side errors (data and time correction checks) to the SVS unit.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorError {
    #[error("Frame: {0}")]
    Frame(#[from] SfaError),
    #[error("Time coordination response limit for EPI {epi_us} us outside 5..=1000")]
    ResponseLimitRange { epi_us: u32 },
    #[error("Ack byte 0x{0:02X} fails its parity check")]
    AckParity(u8),
    #[error("Ack byte 2 is not the complement of ack byte 0x{0:02X}")]
    AckRedundancy(u8),
    #[error("Time coordination after {elapsed} EPIs, limit {limit}")]
    ResponseTimeout { elapsed: u32, limit: u32 },
    #[error("Ping count reply {reply} for ping count {ping_count}")]
    PingCountReply { reply: u8, ping_count: u8 },
    #[error("Time coordination CRC mismatch")]
    TcooCrc,
    #[error("Duplicate consumer time value 0x{0:04X}")]
    DuplicateConsumerTime(u16),
    #[error("Consumer {0} faulted")]
    ConsumerFaulted(u8),
    #[error("All consumers faulted")]
    AllConsumersFaulted,
    #[error("No open consumer {0}")]
    UnknownConsumer(u8),
    #[error("Validator instance is faulted")]
    InstanceFaulted,
    #[error("Data message {0:?} CRC mismatch")]
    DataCrc(DataCrcFailure),
    #[error("Mode byte 0x{0:02X} redundancy broken")]
    ModeRedundancy(u8),
    #[error("Data aged {age} ticks, limit {limit}")]
    DataAge { age: u16, limit: u16 },
    #[error("Multicast byte 0x{0:02X} fails its parity check")]
    TcorrParity(u8),
    #[error("Multicast byte 2 is not the complement of 0x{0:02X}")]
    TcorrRedundancy(u8),
    #[error("Time correction for consumer {actual}, expected {expected}")]
    TcorrConsumer { expected: u8, actual: u8 },
    #[error("Time correction CRC mismatch")]
    TcorrCrc,
}

impl ValidatorError {
    pub const CODE_RESPONSE_LIMIT_RANGE: u8 = 0x01;
    pub const CODE_ACK_PARITY: u8 = 0x02;
    pub const CODE_ACK_REDUNDANCY: u8 = 0x03;
    pub const CODE_RESPONSE_TIMEOUT: u8 = 0x04;
    pub const CODE_PING_COUNT_REPLY: u8 = 0x05;
    pub const CODE_TCOO_CRC: u8 = 0x06;
    pub const CODE_DUPLICATE_CONSUMER_TIME: u8 = 0x07;
    pub const CODE_CONSUMER_FAULTED: u8 = 0x08;
    pub const CODE_ALL_CONSUMERS_FAULTED: u8 = 0x09;
    pub const CODE_UNKNOWN_CONSUMER: u8 = 0x0A;
    pub const CODE_INSTANCE_FAULTED: u8 = 0x0B;

    pub const CODE_DATA_CRC: u8 = 0x01;
    pub const CODE_MODE_REDUNDANCY: u8 = 0x02;
    pub const CODE_DATA_AGE: u8 = 0x03;
    pub const CODE_TCORR_PARITY: u8 = 0x04;
    pub const CODE_TCORR_REDUNDANCY: u8 = 0x05;
    pub const CODE_TCORR_CONSUMER: u8 = 0x06;
    pub const CODE_TCORR_CRC: u8 = 0x07;

    pub(crate) const SVC_DESCRIPTIONS: &'static [(u8, &'static str)] = &[
        (Self::CODE_RESPONSE_LIMIT_RANGE, "time coordination response limit out of range"),
        (Self::CODE_ACK_PARITY, "ack byte parity"),
        (Self::CODE_ACK_REDUNDANCY, "ack byte 2 mismatch"),
        (Self::CODE_RESPONSE_TIMEOUT, "time coordination too late"),
        (Self::CODE_PING_COUNT_REPLY, "ping count reply mismatch"),
        (Self::CODE_TCOO_CRC, "time coordination CRC"),
        (Self::CODE_DUPLICATE_CONSUMER_TIME, "duplicate consumer time value"),
        (Self::CODE_CONSUMER_FAULTED, "consumer faulted"),
        (Self::CODE_ALL_CONSUMERS_FAULTED, "all consumers faulted"),
        (Self::CODE_UNKNOWN_CONSUMER, "unknown consumer"),
        (Self::CODE_INSTANCE_FAULTED, "instance faulted"),
    ];

    pub(crate) const SVS_DESCRIPTIONS: &'static [(u8, &'static str)] = &[
        (Self::CODE_DATA_CRC, "data CRC"),
        (Self::CODE_MODE_REDUNDANCY, "mode byte redundancy"),
        (Self::CODE_DATA_AGE, "data too old"),
        (Self::CODE_TCORR_PARITY, "multicast byte parity"),
        (Self::CODE_TCORR_REDUNDANCY, "multicast byte 2 mismatch"),
        (Self::CODE_TCORR_CONSUMER, "time correction consumer mismatch"),
        (Self::CODE_TCORR_CRC, "time correction CRC"),
    ];

    /// Additional information passed to the safety application with the code.
    pub fn add_info(&self) -> u32 {
        match *self {
            ValidatorError::ResponseLimitRange { epi_us } => epi_us,
            ValidatorError::ResponseTimeout { elapsed, .. } => elapsed,
            ValidatorError::PingCountReply { reply, ping_count } => {
                (u32::from(reply) << 8) | u32::from(ping_count)
            }
            ValidatorError::DuplicateConsumerTime(value) => value.into(),
            ValidatorError::ConsumerFaulted(consumer) | ValidatorError::UnknownConsumer(consumer) => {
                consumer.into()
            }
            ValidatorError::AckParity(raw)
            | ValidatorError::AckRedundancy(raw)
            | ValidatorError::ModeRedundancy(raw)
            | ValidatorError::TcorrParity(raw)
            | ValidatorError::TcorrRedundancy(raw) => raw.into(),
            ValidatorError::DataAge { age, .. } => age.into(),
            ValidatorError::TcorrConsumer { actual, .. } => actual.into(),
            ValidatorError::DataCrc(failure) => failure as u32,
            _ => 0,
        }
    }
}

impl Classify for ValidatorError {
    fn unit(&self) -> Unit {
        match self {
            ValidatorError::Frame(err) => err.unit(),
            ValidatorError::ResponseLimitRange { .. }
            | ValidatorError::AckParity(_)
            | ValidatorError::AckRedundancy(_)
            | ValidatorError::ResponseTimeout { .. }
            | ValidatorError::PingCountReply { .. }
            | ValidatorError::TcooCrc
            | ValidatorError::DuplicateConsumerTime(_)
            | ValidatorError::ConsumerFaulted(_)
            | ValidatorError::AllConsumersFaulted
            | ValidatorError::UnknownConsumer(_)
            | ValidatorError::InstanceFaulted => Unit::Svc,
            ValidatorError::DataCrc(_)
            | ValidatorError::ModeRedundancy(_)
            | ValidatorError::DataAge { .. }
            | ValidatorError::TcorrParity(_)
            | ValidatorError::TcorrRedundancy(_)
            | ValidatorError::TcorrConsumer { .. }
            | ValidatorError::TcorrCrc => Unit::Svs,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            ValidatorError::Frame(err) => err.severity(),
            ValidatorError::ResponseLimitRange { .. } => Severity::FailSafe,
            _ => Severity::NotFailSafe,
        }
    }

    fn local_code(&self) -> u8 {
        match self {
            ValidatorError::Frame(err) => err.local_code(),
            ValidatorError::ResponseLimitRange { .. } => Self::CODE_RESPONSE_LIMIT_RANGE,
            ValidatorError::AckParity(_) => Self::CODE_ACK_PARITY,
            ValidatorError::AckRedundancy(_) => Self::CODE_ACK_REDUNDANCY,
            ValidatorError::ResponseTimeout { .. } => Self::CODE_RESPONSE_TIMEOUT,
            ValidatorError::PingCountReply { .. } => Self::CODE_PING_COUNT_REPLY,
            ValidatorError::TcooCrc => Self::CODE_TCOO_CRC,
            ValidatorError::DuplicateConsumerTime(_) => Self::CODE_DUPLICATE_CONSUMER_TIME,
            ValidatorError::ConsumerFaulted(_) => Self::CODE_CONSUMER_FAULTED,
            ValidatorError::AllConsumersFaulted => Self::CODE_ALL_CONSUMERS_FAULTED,
            ValidatorError::UnknownConsumer(_) => Self::CODE_UNKNOWN_CONSUMER,
            ValidatorError::InstanceFaulted => Self::CODE_INSTANCE_FAULTED,
            ValidatorError::DataCrc(_) => Self::CODE_DATA_CRC,
            ValidatorError::ModeRedundancy(_) => Self::CODE_MODE_REDUNDANCY,
            ValidatorError::DataAge { .. } => Self::CODE_DATA_AGE,
            ValidatorError::TcorrParity(_) => Self::CODE_TCORR_PARITY,
            ValidatorError::TcorrRedundancy(_) => Self::CODE_TCORR_REDUNDANCY,
            ValidatorError::TcorrConsumer { .. } => Self::CODE_TCORR_CONSUMER,
            ValidatorError::TcorrCrc => Self::CODE_TCORR_CRC,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_follow_the_side() {
        assert_eq!(ValidatorError::TcooCrc.unit(), Unit::Svc);
        assert_eq!(ValidatorError::TcorrCrc.unit(), Unit::Svs);
        assert_eq!(
            ValidatorError::from(SfaError::FrameSize(3)).unit(),
            Unit::Sfa
        );
    }

    #[test]
    fn test_only_response_limit_is_fail_safe() {
        assert!(ValidatorError::ResponseLimitRange { epi_us: 1 }.is_fail_safe());
        assert!(!ValidatorError::DuplicateConsumerTime(7).is_fail_safe());
        assert!(!ValidatorError::AllConsumersFaulted.is_fail_safe());
        assert_eq!(
            ValidatorError::DuplicateConsumerTime(0x1234).add_info(),
            0x1234
        );
    }
}
