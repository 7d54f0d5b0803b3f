/// CIP general status code of an explicit message reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum GeneralStatus {
    Success,
    ConnectionFailure,
    ResourceUnavailable,
    InvalidParameterValue,
    PathSegmentError,
    PathDestinationUnknown,
    ServiceNotSupported,
    InvalidAttributeValue,
    ObjectStateConflict,
    DeviceStateConflict,
    NotEnoughData,
    TooMuchData,
    InvalidParameter,
    PathSizeInvalid,
    Other(u8),
}

impl From<u8> for GeneralStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => GeneralStatus::Success,
            0x01 => GeneralStatus::ConnectionFailure,
            0x02 => GeneralStatus::ResourceUnavailable,
            0x03 => GeneralStatus::InvalidParameterValue,
            0x04 => GeneralStatus::PathSegmentError,
            0x05 => GeneralStatus::PathDestinationUnknown,
            0x08 => GeneralStatus::ServiceNotSupported,
            0x09 => GeneralStatus::InvalidAttributeValue,
            0x0C => GeneralStatus::ObjectStateConflict,
            0x10 => GeneralStatus::DeviceStateConflict,
            0x13 => GeneralStatus::NotEnoughData,
            0x15 => GeneralStatus::TooMuchData,
            0x20 => GeneralStatus::InvalidParameter,
            0x26 => GeneralStatus::PathSizeInvalid,
            other => GeneralStatus::Other(other),
        }
    }
}

impl From<GeneralStatus> for u8 {
    fn from(status: GeneralStatus) -> u8 {
        match status {
            GeneralStatus::Success => 0x00,
            GeneralStatus::ConnectionFailure => 0x01,
            GeneralStatus::ResourceUnavailable => 0x02,
            GeneralStatus::InvalidParameterValue => 0x03,
            GeneralStatus::PathSegmentError => 0x04,
            GeneralStatus::PathDestinationUnknown => 0x05,
            GeneralStatus::ServiceNotSupported => 0x08,
            GeneralStatus::InvalidAttributeValue => 0x09,
            GeneralStatus::ObjectStateConflict => 0x0C,
            GeneralStatus::DeviceStateConflict => 0x10,
            GeneralStatus::NotEnoughData => 0x13,
            GeneralStatus::TooMuchData => 0x15,
            GeneralStatus::InvalidParameter => 0x20,
            GeneralStatus::PathSizeInvalid => 0x26,
            GeneralStatus::Other(value) => value,
        }
    }
}

/// Connection Manager extended status codes returned with an unsuccessful
/// Forward_Open / Forward_Close. The 0x08xx block carries the safety specific
/// reasons of a rejected SafetyOpen.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u16)]
pub enum ExtendedStatus {
    DuplicateForwardOpen = 0x0100,
    TransportClassTrigger = 0x0103,
    OwnershipConflict = 0x0106,
    ConnectionNotFound = 0x0107,
    InvalidNetConnParam = 0x0108,
    InvalidConnectionSize = 0x0109,
    TargetNotConfigured = 0x0110,
    RpiNotSupported = 0x0111,
    RpiNotAcceptable = 0x0112,
    OutOfConnections = 0x0113,
    VendorIdOrProductCode = 0x0114,
    DeviceType = 0x0115,
    Revision = 0x0116,
    InvalidProdConsPath = 0x0117,
    InvalidConfigPathInconsistent = 0x0118,
    NonListenOnlyNotOpened = 0x0119,
    TargetObjectOutOfConnections = 0x011A,
    RpiSmallerThanInhibitTime = 0x011B,
    TransportClassNotSupported = 0x011C,
    ProductionTriggerNotSupported = 0x011D,
    DirectionNotSupported = 0x011E,
    InvalidOtFixVar = 0x011F,
    InvalidToFixVar = 0x0120,
    InvalidOtPriority = 0x0121,
    InvalidToPriority = 0x0122,
    InvalidOtConnectionType = 0x0123,
    InvalidToConnectionType = 0x0124,
    InvalidOtRedundantOwner = 0x0125,
    InvalidConfigSize = 0x0126,
    InvalidOtSize = 0x0127,
    InvalidToSize = 0x0128,
    InvalidConfigPath = 0x0129,
    InvalidConsumingPath = 0x012A,
    InvalidProducingPath = 0x012B,
    ConfigSymbolMissing = 0x012C,
    ConsumingSymbolMissing = 0x012D,
    ProducingSymbolMissing = 0x012E,
    InconsistentPathCombination = 0x012F,
    InconsistentConsumeFormat = 0x0130,
    InconsistentProduceFormat = 0x0131,
    NullForwardOpenNotSupported = 0x0132,
    TimeoutMultiplierNotAcceptable = 0x0133,
    ConnectionTimedOut = 0x0203,
    UnconnectedRequestTimedOut = 0x0204,
    UnconnectedParameterError = 0x0205,
    MessageTooLarge = 0x0206,
    InvalidPortInPath = 0x0311,
    InvalidLinkAddress = 0x0312,
    InvalidSegmentInPath = 0x0315,
    CloseConnectionPathMismatch = 0x0316,
    Miscellaneous = 0x031C,
    SafetySegmentFormat = 0x0800,
    SafetyRpiNotSupported = 0x0801,
    TcorrParameters = 0x0802,
    ConfigurationSignature = 0x0803,
    PingIntervalMultiplier = 0x0804,
    TcooMinMultiplier = 0x0805,
    NetTimeExpectationMultiplier = 0x0806,
    TimeoutMultiplier = 0x0807,
    MaxConsumerNumber = 0x0808,
    MaxFaultNumber = 0x0809,
    ConsumerNumberUnavailable = 0x080C,
    TunidMismatch = 0x080D,
}

impl From<ExtendedStatus> for u16 {
    fn from(status: ExtendedStatus) -> u16 {
        status as u16
    }
}

impl TryFrom<u16> for ExtendedStatus {
    type Error = u16;

    /// Returns the raw value back when it is not part of the table.
    fn try_from(value: u16) -> Result<Self, u16> {
        use ExtendedStatus::*;
        const TABLE: [ExtendedStatus; 63] = [
            DuplicateForwardOpen,
            TransportClassTrigger,
            OwnershipConflict,
            ConnectionNotFound,
            InvalidNetConnParam,
            InvalidConnectionSize,
            TargetNotConfigured,
            RpiNotSupported,
            RpiNotAcceptable,
            OutOfConnections,
            VendorIdOrProductCode,
            DeviceType,
            Revision,
            InvalidProdConsPath,
            InvalidConfigPathInconsistent,
            NonListenOnlyNotOpened,
            TargetObjectOutOfConnections,
            RpiSmallerThanInhibitTime,
            TransportClassNotSupported,
            ProductionTriggerNotSupported,
            DirectionNotSupported,
            InvalidOtFixVar,
            InvalidToFixVar,
            InvalidOtPriority,
            InvalidToPriority,
            InvalidOtConnectionType,
            InvalidToConnectionType,
            InvalidOtRedundantOwner,
            InvalidConfigSize,
            InvalidOtSize,
            InvalidToSize,
            InvalidConfigPath,
            InvalidConsumingPath,
            InvalidProducingPath,
            ConfigSymbolMissing,
            ConsumingSymbolMissing,
            ProducingSymbolMissing,
            InconsistentPathCombination,
            InconsistentConsumeFormat,
            InconsistentProduceFormat,
            NullForwardOpenNotSupported,
            TimeoutMultiplierNotAcceptable,
            ConnectionTimedOut,
            UnconnectedRequestTimedOut,
            UnconnectedParameterError,
            MessageTooLarge,
            InvalidPortInPath,
            InvalidLinkAddress,
            InvalidSegmentInPath,
            CloseConnectionPathMismatch,
            Miscellaneous,
            SafetySegmentFormat,
            SafetyRpiNotSupported,
            TcorrParameters,
            ConfigurationSignature,
            PingIntervalMultiplier,
            TcooMinMultiplier,
            NetTimeExpectationMultiplier,
            TimeoutMultiplier,
            MaxConsumerNumber,
            MaxFaultNumber,
            ConsumerNumberUnavailable,
            TunidMismatch,
        ];
        TABLE
            .iter()
            .copied()
            .find(|status| *status as u16 == value)
            .ok_or(value)
    }
}

/// General/extended status pair of an unsuccessful connection manager reply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CipStatus {
    pub general: GeneralStatus,
    pub extended: Option<ExtendedStatus>,
}

impl CipStatus {
    pub const fn new(general: GeneralStatus, extended: Option<ExtendedStatus>) -> Self {
        Self { general, extended }
    }

    /// Connection failure (0x01) with the given extended status.
    pub const fn connection_failure(extended: ExtendedStatus) -> Self {
        Self::new(GeneralStatus::ConnectionFailure, Some(extended))
    }

    pub const fn general_only(general: GeneralStatus) -> Self {
        Self::new(general, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_status_all_u8_values() {
        for value in 0..=255u8 {
            let status = GeneralStatus::from(value);
            assert_eq!(u8::from(status), value);
        }
        assert_eq!(GeneralStatus::from(0x04), GeneralStatus::PathSegmentError);
        assert_eq!(GeneralStatus::from(0x7F), GeneralStatus::Other(0x7F));
    }

    #[test]
    fn test_extended_status_table() {
        for value in 0..=0x0FFFu16 {
            if let Ok(status) = ExtendedStatus::try_from(value) {
                assert_eq!(u16::from(status), value);
            }
        }
        assert_eq!(
            ExtendedStatus::try_from(0x0315),
            Ok(ExtendedStatus::InvalidSegmentInPath)
        );
        assert_eq!(ExtendedStatus::try_from(0x0101), Err(0x0101));
    }
}
