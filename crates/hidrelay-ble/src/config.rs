//! Relay transport configuration

use std::num::NonZeroUsize;
use std::time::Duration;

use hidrelay_core::{KeyTagStyle, PeripheralIdentity, RelayError, ServiceDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::{BleRelayError, Result};

// ----------------------------------------------------------------------------
// Restart Policy
// ----------------------------------------------------------------------------

/// How long the supervisor waits before starting the next session
///
/// `Immediate` restarts with no delay at all, including after repeated failures.
/// `Backoff` doubles the delay for each consecutive session that never became ready,
/// starting at `initial` and capped at `max`; a session that reached ready resets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestartPolicy {
    #[default]
    Immediate,
    Backoff { initial: Duration, max: Duration },
}

impl RestartPolicy {
    /// Delay before the next attempt after `consecutive_failures` failed sessions
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        match *self {
            RestartPolicy::Immediate => Duration::ZERO,
            RestartPolicy::Backoff { .. } if consecutive_failures == 0 => Duration::ZERO,
            RestartPolicy::Backoff { initial, max } => {
                let exponent = (consecutive_failures - 1).min(16);
                initial.saturating_mul(1u32 << exponent).min(max)
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the relay transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Which advertising device is the relay
    pub identity: PeripheralIdentity,
    /// GATT service and characteristics used once connected
    pub service: ServiceDescriptor,
    /// Maximum time a single scan may take before the session gives up
    pub scan_timeout: Duration,
    /// Maximum time to wait for the link to come up
    pub connection_timeout: Duration,
    /// Write size used when the platform does not report the negotiated one
    pub fallback_write_size: NonZeroUsize,
    /// Key tag dialect understood by the relay firmware
    pub key_tags: KeyTagStyle,
    /// Delay policy between sessions
    pub restart: RestartPolicy,
    /// Capacity of the observer event channel
    pub event_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            identity: PeripheralIdentity::default(),
            service: ServiceDescriptor::default(),
            scan_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(10),
            // ATT default MTU of 23 minus the 3-byte write header
            fallback_write_size: NonZeroUsize::new(20).unwrap_or(NonZeroUsize::MIN),
            key_tags: KeyTagStyle::Short,
            restart: RestartPolicy::Immediate,
            event_buffer: 64,
        }
    }
}

impl RelayConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the peripheral matching criteria
    pub fn with_identity(mut self, identity: PeripheralIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Set the GATT service descriptor
    pub fn with_service(mut self, service: ServiceDescriptor) -> Self {
        self.service = service;
        self
    }

    /// Set scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the write size used when none is negotiated
    pub fn with_fallback_write_size(mut self, size: NonZeroUsize) -> Self {
        self.fallback_write_size = size;
        self
    }

    /// Set key tag dialect
    pub fn with_key_tags(mut self, key_tags: KeyTagStyle) -> Self {
        self.key_tags = key_tags;
        self
    }

    /// Set restart policy
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Check the configuration for values the transport cannot work with
    pub fn validate(&self) -> Result<()> {
        self.identity.validate()?;

        if self.scan_timeout.is_zero() {
            return Err(invalid("scan timeout must be greater than 0"));
        }
        if self.connection_timeout.is_zero() {
            return Err(invalid("connection timeout must be greater than 0"));
        }
        if self.event_buffer == 0 {
            return Err(invalid("event buffer must hold at least one event"));
        }
        if let RestartPolicy::Backoff { initial, max } = self.restart {
            if initial.is_zero() || initial > max {
                return Err(invalid("backoff needs 0 < initial <= max"));
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> BleRelayError {
    BleRelayError::Configuration(RelayError::InvalidConfiguration {
        reason: reason.to_string(),
    })
}
