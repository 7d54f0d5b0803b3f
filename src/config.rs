//! Configuration of a stack instance.

use crate::error::StackError;
use crate::sce::Unid;
use crate::sfa::MixMethod;

/// Maximum number of consumers of one multicast producer.
pub const MAX_CONSUMERS: u8 = 15;

/// Which end of a safety connection this device is.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Role {
    /// Answers SafetyOpen requests.
    #[default]
    Target,
    /// Originates connections. Additionally accepts the compressed application
    /// path that still lists instances.
    Originator,
}

/// Identity the electronic key and TUNID of a SafetyOpen are checked against.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub major_revision: u8,
    pub minor_revision: u8,
    /// Unique network identifier of this device. `None` until it has been
    /// assigned; TUNID checks are skipped while unset.
    pub unid: Option<Unid>,
}

impl DeviceIdentity {
    #[must_use]
    pub fn new(vendor_id: u16, device_type: u16, product_code: u16, major: u8, minor: u8) -> Self {
        Self {
            vendor_id,
            device_type,
            product_code,
            major_revision: major,
            minor_revision: minor,
            unid: None,
        }
    }

    #[must_use]
    pub fn with_unid(mut self, unid: Unid) -> Self {
        self.unid = Some(unid);
        self
    }
}

/// Configuration for a [`Stack`](crate::Stack).
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub role: Role,
    /// Number of safety validator instances. The arena is sized once from this.
    pub max_instances: usize,
    /// Consumers one multicast producer accepts.
    pub max_consumers: u8,
    pub identity: DeviceIdentity,
    /// Byte placement used for every transmitted telegram.
    pub mix_method: MixMethod,
}

impl StackConfig {
    /// Create a new target configuration.
    ///
    /// # Arguments
    /// * `identity` - Identity checked against electronic keys
    /// * `max_instances` - Number of safety validator instances
    #[must_use]
    pub fn new(identity: DeviceIdentity, max_instances: usize) -> Self {
        Self {
            role: Role::Target,
            max_instances,
            max_consumers: MAX_CONSUMERS,
            identity,
            mix_method: MixMethod::OddEvenSort,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_max_consumers(mut self, max_consumers: u8) -> Self {
        self.max_consumers = max_consumers;
        self
    }

    /// Reject sizing the stack cannot run with.
    ///
    /// # Errors
    /// - [`StackError::InvalidConfig`] (fail-safe)
    pub fn validate(&self) -> Result<(), StackError> {
        if self.max_instances == 0 {
            return Err(StackError::InvalidConfig("max_instances must be at least 1"));
        }
        if self.max_instances > usize::from(u16::MAX) {
            return Err(StackError::InvalidConfig("max_instances exceeds the instance ID range"));
        }
        if self.max_consumers == 0 || self.max_consumers > MAX_CONSUMERS {
            return Err(StackError::InvalidConfig("max_consumers must be within 1..=15"));
        }
        Ok(())
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::new(DeviceIdentity::default(), 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Classify;

    #[test]
    fn test_default_config_is_valid() {
        let config = StackConfig::default();
        assert_eq!(config.role, Role::Target);
        assert_eq!(config.max_consumers, 15);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_invalid_sizing_is_fail_safe() {
        let config = StackConfig::new(DeviceIdentity::default(), 0);
        let err = config.validate().unwrap_err();
        assert!(err.is_fail_safe());

        let config = StackConfig::default().with_max_consumers(16);
        assert!(config.validate().is_err());
        let config = StackConfig::default().with_max_consumers(0);
        assert!(config.validate().is_err());
    }
}
