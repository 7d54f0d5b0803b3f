//! Legality checks of a parsed SafetyOpen and the resulting connection plan.

use tracing::{debug, warn};

use super::{Direction, PathPosition, SafetyOpenParameters, SceError};
use crate::cip::{
    ConnectionType, NetConnParams, SAFETY_TRANSPORT_CLASS_TRIGGER, TRANSPORT_DIRECTION_BIT,
};
use crate::config::{DeviceIdentity, MAX_CONSUMERS, StackConfig};
use crate::epath::ElectronicKey;
use crate::sfa::{SafetyFormat, TCOO_SIZE, data_len_for_frame};

/// Smallest supported EPI in microseconds.
pub const MIN_EPI_US: u32 = 5_000;
/// Largest supported EPI in microseconds.
pub const MAX_EPI_US: u32 = 1_000_000;

const MAX_PING_INTERVAL_MULTIPLIER: u16 = 1_000;
const MAX_TCOO_MIN_MULTIPLIER: u16 = 1_000;
const MAX_NET_TIME_EXPECTATION: u16 = 45_312;
const TIMEOUT_MULTIPLIER_RANGE: core::ops::RangeInclusive<u8> = 1..=4;
const MAX_FAULT_NUMBER: u16 = 255;

/// Which validator a SafetyOpen creates at this target.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidatorKind {
    /// Safety validator client: this device produces the data, the originator
    /// sends time coordination messages on O->T.
    Producer,
    /// Safety validator server: this device consumes the data and sends time
    /// coordination messages on T->O.
    Consumer,
}

/// Everything a validator instance is created from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpenPlan {
    pub kind: ValidatorKind,
    pub format: SafetyFormat,
    pub data_len: usize,
    /// Data is produced on a multicast connection.
    pub multicast: bool,
    /// Expected packet interval of the data connection.
    pub epi_us: u32,
    /// RPI of the time coordination connection.
    pub tcoo_rpi_us: u32,
    pub tcorr_epi_us: u32,
    pub ping_interval_multiplier: u16,
    pub tcoo_min_multiplier: u16,
    pub net_time_expectation_multiplier: u16,
    pub timeout_multiplier: u8,
    pub max_consumer_number: u8,
    /// `None` for Base format.
    pub max_fault_number: Option<u16>,
    pub consuming_instance: u16,
    pub producing_instance: u16,
}

fn check_params(direction: Direction, params: NetConnParams) -> Result<(), SceError> {
    if params.is_variable() {
        return Err(SceError::VariableSize(direction));
    }
    Ok(())
}

/// Compare an electronic key against this device.
///
/// Zero fields of the key match anything. With the compatibility bit set the
/// major revision must match and the device minor revision must be at least the
/// key's; without it a non-zero minor revision must match exactly.
///
/// # Errors
/// - [`SceError::VendorOrProductCode`], [`SceError::DeviceType`] or
///   [`SceError::Revision`] for the first mismatching field
pub fn check_electronic_key(key: &ElectronicKey, identity: &DeviceIdentity) -> Result<(), SceError> {
    let differs = |expected: u16, actual: u16| expected != 0 && expected != actual;
    if differs(key.vendor_id, identity.vendor_id)
        || differs(key.product_code, identity.product_code)
    {
        return Err(SceError::VendorOrProductCode);
    }
    if differs(key.device_type, identity.device_type) {
        return Err(SceError::DeviceType);
    }
    if key.major_revision != 0 && key.major_revision != identity.major_revision {
        return Err(SceError::Revision);
    }
    let minor_ok = if key.compatibility {
        key.minor_revision <= identity.minor_revision
    } else {
        key.minor_revision == 0 || key.minor_revision == identity.minor_revision
    };
    if !minor_ok {
        return Err(SceError::Revision);
    }
    Ok(())
}

/// Apply every legality check to a parsed SafetyOpen and work out which
/// validator it opens.
///
/// Checks run in a fixed order and the first failure wins, so the status in
/// the Unsuccessful reply is deterministic.
///
/// # Errors
/// - the [`SceError`] of the first failed check
pub fn validate_forward_open(
    params: &SafetyOpenParameters<'_>,
    config: &StackConfig,
) -> Result<OpenPlan, SceError> {
    let result = validate(params, config);
    if let Err(err) = &result {
        warn!("SafetyOpen {:?} rejected: {}", params.triad, err);
    }
    result
}

fn validate(params: &SafetyOpenParameters<'_>, config: &StackConfig) -> Result<OpenPlan, SceError> {
    if params.transport_class_trigger & !TRANSPORT_DIRECTION_BIT != SAFETY_TRANSPORT_CLASS_TRIGGER {
        return Err(SceError::TransportClassTrigger(params.transport_class_trigger));
    }
    if params.ot_params.redundant_owner() {
        return Err(SceError::RedundantOwner);
    }
    check_params(Direction::OriginatorToTarget, params.ot_params)?;
    check_params(Direction::TargetToOriginator, params.to_params)?;

    let ot_type = params.ot_params.connection_type();
    let to_type = params.to_params.connection_type();
    if ot_type == ConnectionType::Null && to_type == ConnectionType::Null {
        return Err(SceError::NullConnection);
    }
    if ot_type != ConnectionType::PointToPoint {
        return Err(SceError::ConnectionType(Direction::OriginatorToTarget));
    }
    if !matches!(to_type, ConnectionType::PointToPoint | ConnectionType::Multicast) {
        return Err(SceError::ConnectionType(Direction::TargetToOriginator));
    }

    let safety = &params.safety;
    let format = safety.format();
    let ot_size = params.ot_params.size();
    let to_size = params.to_params.size();
    let tcoo_size = TCOO_SIZE as u16;

    let (kind, data_len, epi_us, tcoo_rpi_us) = if ot_size == tcoo_size {
        let data_len = data_len_for_frame(format, usize::from(to_size)).ok_or(
            SceError::ConnectionSize {
                direction: Direction::TargetToOriginator,
                size: to_size,
            },
        )?;
        (ValidatorKind::Producer, data_len, params.to_rpi, params.ot_rpi)
    } else if to_size == tcoo_size {
        let data_len = data_len_for_frame(format, usize::from(ot_size)).ok_or(
            SceError::ConnectionSize {
                direction: Direction::OriginatorToTarget,
                size: ot_size,
            },
        )?;
        (ValidatorKind::Consumer, data_len, params.ot_rpi, params.to_rpi)
    } else {
        return Err(SceError::NoTimeCoordination);
    };
    let multicast = kind == ValidatorKind::Producer && to_type == ConnectionType::Multicast;

    if !(MIN_EPI_US..=MAX_EPI_US).contains(&epi_us) {
        return Err(SceError::EpiRange(epi_us));
    }

    let piem = safety.ping_interval_multiplier;
    if piem == 0 || piem > MAX_PING_INTERVAL_MULTIPLIER {
        return Err(SceError::PingIntervalMultiplier(piem));
    }
    let expected_tcoo_rpi = u64::from(epi_us) * u64::from(piem);
    if u64::from(tcoo_rpi_us) != expected_tcoo_rpi {
        return Err(SceError::RpiMismatch {
            rpi: tcoo_rpi_us,
            expected: expected_tcoo_rpi,
        });
    }
    if safety.tcoo_min_multiplier > MAX_TCOO_MIN_MULTIPLIER {
        return Err(SceError::TcooMinMultiplier(safety.tcoo_min_multiplier));
    }
    if safety.net_time_expectation_multiplier > MAX_NET_TIME_EXPECTATION {
        return Err(SceError::NetTimeExpectation(
            safety.net_time_expectation_multiplier,
        ));
    }
    if !TIMEOUT_MULTIPLIER_RANGE.contains(&safety.timeout_multiplier) {
        return Err(SceError::TimeoutMultiplier(safety.timeout_multiplier));
    }

    let max_consumers = safety.max_consumer_number;
    let consumers_ok = match (kind, multicast) {
        (ValidatorKind::Producer, false) => max_consumers == 1,
        (ValidatorKind::Producer, true) => {
            max_consumers >= 1 && max_consumers <= config.max_consumers
        }
        (ValidatorKind::Consumer, _) => (1..=MAX_CONSUMERS).contains(&max_consumers),
    };
    if !consumers_ok {
        return Err(SceError::MaxConsumerNumber(max_consumers));
    }
    if let Some(max_fault) = safety.max_fault_number() {
        if max_fault > MAX_FAULT_NUMBER {
            return Err(SceError::MaxFaultNumber(max_fault));
        }
    }
    if multicast && safety.tcorr_epi == 0 {
        return Err(SceError::TcorrParameters);
    }

    if let Some(key) = &params.electronic_key {
        check_electronic_key(key, &config.identity)?;
    }
    if let Some(unid) = config.identity.unid {
        if safety.tunid != unid {
            return Err(SceError::TunidMismatch);
        }
    }

    let plan = OpenPlan {
        kind,
        format,
        data_len,
        multicast,
        epi_us,
        tcoo_rpi_us,
        tcorr_epi_us: safety.tcorr_epi,
        ping_interval_multiplier: piem,
        tcoo_min_multiplier: safety.tcoo_min_multiplier,
        net_time_expectation_multiplier: safety.net_time_expectation_multiplier,
        timeout_multiplier: safety.timeout_multiplier,
        max_consumer_number: max_consumers,
        max_fault_number: safety.max_fault_number(),
        consuming_instance: params.app_path.instance(PathPosition::Consuming),
        producing_instance: params.app_path.instance(PathPosition::Producing),
    };
    debug!("SafetyOpen {:?} accepted: {:?}", params.triad, plan);
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::sce::Unid;
    use crate::sce::forward_open::tests::{long_path, request};
    use crate::sce::parse_forward_open;

    fn check(
        format: SafetyFormat,
        config: &StackConfig,
        tweak: impl FnOnce(&mut SafetyOpenParameters<'_>),
    ) -> Result<OpenPlan, SceError> {
        let bytes = request(&long_path(format));
        let mut params = parse_forward_open(&bytes, Role::Target).unwrap();
        tweak(&mut params);
        validate_forward_open(&params, config)
    }

    /// Turn the default consumer request into one for a producer.
    fn as_producer(params: &mut SafetyOpenParameters<'_>, to: ConnectionType, data_size: u16) {
        params.ot_params = NetConnParams::new(ConnectionType::PointToPoint, 6);
        params.ot_rpi = 20_000;
        params.to_params = NetConnParams::new(to, data_size);
        params.to_rpi = 10_000;
    }

    #[test]
    fn test_consumer_plan() {
        let plan = check(SafetyFormat::Base, &StackConfig::default(), |_| {}).unwrap();
        assert_eq!(plan.kind, ValidatorKind::Consumer);
        assert_eq!(plan.format, SafetyFormat::Base);
        assert_eq!(plan.data_len, 2);
        assert!(!plan.multicast);
        assert_eq!(plan.epi_us, 10_000);
        assert_eq!(plan.tcoo_rpi_us, 20_000);
        assert_eq!(plan.max_fault_number, None);
        assert_eq!(plan.consuming_instance, 2);
        assert_eq!(plan.producing_instance, 3);
    }

    #[test]
    fn test_producer_plan() {
        let plan = check(SafetyFormat::Extended, &StackConfig::default(), |p| {
            as_producer(p, ConnectionType::PointToPoint, 16);
        })
        .unwrap();
        assert_eq!(plan.kind, ValidatorKind::Producer);
        assert_eq!(plan.data_len, 10);
        assert_eq!(plan.max_fault_number, Some(3));
    }

    #[test]
    fn test_multicast_producer_needs_time_correction() {
        let config = StackConfig::default();
        let result = check(SafetyFormat::Base, &config, |p| {
            as_producer(p, ConnectionType::Multicast, 8);
            p.safety.max_consumer_number = 4;
        });
        assert_eq!(result, Err(SceError::TcorrParameters));

        let plan = check(SafetyFormat::Base, &config, |p| {
            as_producer(p, ConnectionType::Multicast, 8);
            p.safety.max_consumer_number = 4;
            p.safety.tcorr_epi = 10_000;
        })
        .unwrap();
        assert!(plan.multicast);
        assert_eq!(plan.max_consumer_number, 4);
    }

    #[test]
    fn test_connection_checks() {
        let config = StackConfig::default();
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| p.transport_class_trigger = 0x83),
            Err(SceError::TransportClassTrigger(0x83))
        );
        // direction bit alone is fine
        assert!(check(SafetyFormat::Base, &config, |p| p.transport_class_trigger = 0x80).is_ok());
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.ot_params = NetConnParams::from(u16::from(p.ot_params) | 0x8000);
            }),
            Err(SceError::RedundantOwner)
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.to_params = NetConnParams::from(u16::from(p.to_params) | 0x0200);
            }),
            Err(SceError::VariableSize(Direction::TargetToOriginator))
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.ot_params = NetConnParams::new(ConnectionType::Null, 8);
                p.to_params = NetConnParams::new(ConnectionType::Null, 6);
            }),
            Err(SceError::NullConnection)
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.ot_params = NetConnParams::new(ConnectionType::Multicast, 8);
            }),
            Err(SceError::ConnectionType(Direction::OriginatorToTarget))
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.to_params = NetConnParams::new(ConnectionType::Reserved, 6);
            }),
            Err(SceError::ConnectionType(Direction::TargetToOriginator))
        );
    }

    #[test]
    fn test_size_checks() {
        let config = StackConfig::default();
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.ot_params = NetConnParams::new(ConnectionType::PointToPoint, 9);
            }),
            Err(SceError::ConnectionSize {
                direction: Direction::OriginatorToTarget,
                size: 9
            })
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.to_params = NetConnParams::new(ConnectionType::PointToPoint, 8);
            }),
            Err(SceError::NoTimeCoordination)
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                as_producer(p, ConnectionType::PointToPoint, 13);
            }),
            Err(SceError::ConnectionSize {
                direction: Direction::TargetToOriginator,
                size: 13
            })
        );
    }

    #[test]
    fn test_timing_checks() {
        let config = StackConfig::default();
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| p.ot_rpi = 4_999),
            Err(SceError::EpiRange(4_999))
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| p.to_rpi = 30_000),
            Err(SceError::RpiMismatch {
                rpi: 30_000,
                expected: 20_000
            })
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| p.safety.ping_interval_multiplier = 0),
            Err(SceError::PingIntervalMultiplier(0))
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| p.safety.tcoo_min_multiplier = 1_001),
            Err(SceError::TcooMinMultiplier(1_001))
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                p.safety.net_time_expectation_multiplier = 45_313;
            }),
            Err(SceError::NetTimeExpectation(45_313))
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| p.safety.timeout_multiplier = 5),
            Err(SceError::TimeoutMultiplier(5))
        );
    }

    #[test]
    fn test_consumer_and_fault_limits() {
        let config = StackConfig::default().with_max_consumers(4);
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                as_producer(p, ConnectionType::PointToPoint, 8);
                p.safety.max_consumer_number = 2;
            }),
            Err(SceError::MaxConsumerNumber(2))
        );
        assert_eq!(
            check(SafetyFormat::Base, &config, |p| {
                as_producer(p, ConnectionType::Multicast, 8);
                p.safety.max_consumer_number = 5;
                p.safety.tcorr_epi = 10_000;
            }),
            Err(SceError::MaxConsumerNumber(5))
        );
        assert_eq!(
            check(SafetyFormat::Extended, &config, |p| {
                if let crate::sce::SafetyTail::Extended {
                    max_fault_number, ..
                } = &mut p.safety.tail
                {
                    *max_fault_number = 256;
                }
            }),
            Err(SceError::MaxFaultNumber(256))
        );
    }

    #[test]
    fn test_tunid_check() {
        let ours = Unid {
            snn: [1, 2, 3, 4, 5, 6],
            node_id: 0x11,
        };
        let mut config = StackConfig::default();
        config.identity = config.identity.with_unid(ours);
        assert!(check(SafetyFormat::Base, &config, |_| {}).is_ok());

        config.identity.unid = Some(Unid {
            node_id: 0x12,
            ..ours
        });
        assert_eq!(
            check(SafetyFormat::Base, &config, |_| {}),
            Err(SceError::TunidMismatch)
        );
    }

    #[test]
    fn test_electronic_key() {
        let identity = DeviceIdentity::new(1, 0x23, 0x45, 2, 3);
        let key = ElectronicKey {
            vendor_id: 1,
            device_type: 0x23,
            product_code: 0x45,
            major_revision: 2,
            compatibility: false,
            minor_revision: 3,
        };
        assert_eq!(check_electronic_key(&key, &identity), Ok(()));
        let wildcard = ElectronicKey {
            vendor_id: 0,
            device_type: 0,
            product_code: 0,
            major_revision: 0,
            compatibility: false,
            minor_revision: 0,
        };
        assert_eq!(check_electronic_key(&wildcard, &identity), Ok(()));
        assert_eq!(
            check_electronic_key(&ElectronicKey { vendor_id: 2, ..key }, &identity),
            Err(SceError::VendorOrProductCode)
        );
        assert_eq!(
            check_electronic_key(&ElectronicKey { product_code: 9, ..key }, &identity),
            Err(SceError::VendorOrProductCode)
        );
        assert_eq!(
            check_electronic_key(&ElectronicKey { device_type: 9, ..key }, &identity),
            Err(SceError::DeviceType)
        );
        assert_eq!(
            check_electronic_key(&ElectronicKey { major_revision: 3, ..key }, &identity),
            Err(SceError::Revision)
        );
        assert_eq!(
            check_electronic_key(&ElectronicKey { minor_revision: 1, ..key }, &identity),
            Err(SceError::Revision)
        );
        let compatible = ElectronicKey {
            compatibility: true,
            minor_revision: 1,
            ..key
        };
        assert_eq!(check_electronic_key(&compatible, &identity), Ok(()));
        assert_eq!(
            check_electronic_key(
                &ElectronicKey {
                    minor_revision: 4,
                    ..compatible
                },
                &identity
            ),
            Err(SceError::Revision)
        );
    }
}
