//! GATT identifiers and peripheral matching
//!
//! The relay peripheral exposes a UART-style service with one characteristic the
//! central writes to and one it receives notifications from.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{RelayError, Result};

// ----------------------------------------------------------------------------
// BLE Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Relay GATT service UUID
pub const RELAY_SERVICE_UUID: Uuid = Uuid::from_u128(0x597F1290_5B99_477D_9261_F0ED801FC566);

/// Characteristic the central writes encoded events to
pub const RELAY_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x597F1291_5B99_477D_9261_F0ED801FC566);

/// Characteristic the peripheral notifies on
pub const RELAY_NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x597F1292_5B99_477D_9261_F0ED801FC566);

/// Advertised name of the stock relay firmware
pub const DEFAULT_PERIPHERAL_NAME: &str = "HID BLE Relay";

// ----------------------------------------------------------------------------
// Service Descriptor
// ----------------------------------------------------------------------------

/// The GATT service and characteristics a session depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: Uuid,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
}

impl Default for ServiceDescriptor {
    fn default() -> Self {
        Self {
            service: RELAY_SERVICE_UUID,
            write_characteristic: RELAY_WRITE_CHARACTERISTIC_UUID,
            notify_characteristic: RELAY_NOTIFY_CHARACTERISTIC_UUID,
        }
    }
}

// ----------------------------------------------------------------------------
// Peripheral Identity
// ----------------------------------------------------------------------------

/// Criteria a discovered device must meet to be treated as the relay
///
/// Either criterion may be omitted; an identity with neither set is rejected by
/// [`PeripheralIdentity::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralIdentity {
    /// Substring the advertised local name must contain
    pub name_contains: Option<String>,
    /// Service UUID that must appear in the advertisement
    pub required_service: Option<Uuid>,
}

impl Default for PeripheralIdentity {
    fn default() -> Self {
        Self {
            name_contains: Some(DEFAULT_PERIPHERAL_NAME.to_string()),
            required_service: Some(RELAY_SERVICE_UUID),
        }
    }
}

impl PeripheralIdentity {
    /// Match by name substring and service
    pub fn new(name_contains: impl Into<String>, required_service: Uuid) -> Self {
        Self {
            name_contains: Some(name_contains.into()),
            required_service: Some(required_service),
        }
    }

    /// Match any device advertising `service`, whatever its name
    pub fn any_name(service: Uuid) -> Self {
        Self {
            name_contains: None,
            required_service: Some(service),
        }
    }

    /// Parse a service UUID given as text (any case)
    pub fn with_service_str(mut self, service: &str) -> Result<Self> {
        self.required_service = Some(Uuid::parse_str(service)?);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name_contains.is_none() && self.required_service.is_none() {
            return Err(RelayError::InvalidConfiguration {
                reason: "peripheral identity needs a name filter or a service filter".to_string(),
            });
        }
        Ok(())
    }

    /// Whether an advertisement with `name` and `services` identifies the relay
    pub fn matches(&self, name: Option<&str>, services: &[Uuid]) -> bool {
        if let Some(wanted) = &self.name_contains {
            match name {
                Some(name) if name.contains(wanted.as_str()) => {}
                _ => return false,
            }
        }
        match self.required_service {
            Some(service) => services.contains(&service),
            None => true,
        }
    }
}
