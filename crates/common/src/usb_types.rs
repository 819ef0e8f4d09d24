//! USB type abstractions and utilities
//!
//! Identity of a single physical attachment of a USB device, and the
//! VID:PID filter that selects the one target device the agent watches for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one physical attachment of a USB device
///
/// `service_id` is assigned by the host for this particular attachment. The
/// same `(vendor_id, product_id, serial_number)` triplet can reappear with a
/// different `service_id` after a re-enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: String,
    pub service_id: u64,
}

impl DeviceIdentity {
    pub fn new(
        vendor_id: u16,
        product_id: u16,
        serial_number: impl Into<String>,
        service_id: u64,
    ) -> Self {
        Self {
            vendor_id,
            product_id,
            serial_number: serial_number.into(),
            service_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (SN: {}, service {})",
            self.vendor_id, self.product_id, self.serial_number, self.service_id
        )
    }
}

/// Derive a per-attachment service id from the bus topology
///
/// The host assigns a fresh device address on every enumeration, so
/// `(bus, address)` names one attachment for as long as it is present.
pub fn service_id_for(bus: u8, address: u8) -> u64 {
    (u64::from(bus) << 8) | u64::from(address)
}

/// Exact VID:PID match for the target device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl TargetFilter {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Check if a VID/PID pair is the target device
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }

    /// Check if a device identity belongs to the target device
    pub fn matches_identity(&self, identity: &DeviceIdentity) -> bool {
        self.matches(identity.vendor_id, identity.product_id)
    }
}

impl fmt::Display for TargetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}:0x{:04x}", self.vendor_id, self.product_id)
    }
}

impl FromStr for TargetFilter {
    type Err = crate::Error;

    /// Parse a filter in the form `0xVID:0xPID`
    fn from_str(filter: &str) -> crate::Result<Self> {
        let invalid = |reason: &str| crate::Error::InvalidFilter {
            filter: filter.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = filter.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(invalid("expected VID:PID (e.g., '0x03e7:0x2485')"));
        }

        let vendor_id = parse_hex_id(parts[0]).map_err(|reason| invalid(&reason))?;
        let product_id = parse_hex_id(parts[1]).map_err(|reason| invalid(&reason))?;

        Ok(Self::new(vendor_id, product_id))
    }
}

fn parse_hex_id(id: &str) -> std::result::Result<u16, String> {
    let hex_part = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .ok_or_else(|| format!("'{}' must start with '0x'", id))?;

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(format!("'{}' must have 1-4 hex digits", id));
    }

    u16::from_str_radix(hex_part, 16).map_err(|_| format!("'{}' is not a valid hex number", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parse_valid() {
        let filter: TargetFilter = "0x03e7:0x2485".parse().unwrap();
        assert_eq!(filter, TargetFilter::new(0x03e7, 0x2485));

        let upper: TargetFilter = "0X03E7:0XF63B".parse().unwrap();
        assert_eq!(upper, TargetFilter::new(0x03e7, 0xf63b));
    }

    #[test]
    fn test_filter_parse_invalid() {
        assert!("03e7:2485".parse::<TargetFilter>().is_err());
        assert!("0x03e7".parse::<TargetFilter>().is_err());
        assert!("0x03e7:*".parse::<TargetFilter>().is_err());
        assert!("0x03e7:0x2485:0x1".parse::<TargetFilter>().is_err());
        assert!("0xGHIJ:0x2485".parse::<TargetFilter>().is_err());
        assert!("0x12345:0x2485".parse::<TargetFilter>().is_err());
    }

    #[test]
    fn test_filter_display_parses_back() {
        let filter = TargetFilter::new(0x03e7, 0x2485);
        assert_eq!(filter.to_string(), "0x03e7:0x2485");
        assert_eq!(filter.to_string().parse::<TargetFilter>().unwrap(), filter);
    }

    #[test]
    fn test_filter_matching() {
        let filter = TargetFilter::new(0x03e7, 0x2485);
        assert!(filter.matches(0x03e7, 0x2485));
        assert!(!filter.matches(0x03e7, 0xf63b));
        assert!(!filter.matches(0x1234, 0x2485));

        let identity = DeviceIdentity::new(0x03e7, 0x2485, "A1", 100);
        assert!(filter.matches_identity(&identity));
    }

    #[test]
    fn test_service_id_distinguishes_reattachment() {
        assert_eq!(service_id_for(1, 4), 0x0104);
        assert_ne!(service_id_for(1, 4), service_id_for(1, 5));
        assert_ne!(service_id_for(1, 4), service_id_for(2, 4));
    }

    #[test]
    fn test_identity_display() {
        let identity = DeviceIdentity::new(0x03e7, 0x2485, "A1", 100);
        assert_eq!(identity.to_string(), "03e7:2485 (SN: A1, service 100)");
    }
}
