//! Device identification
//!
//! Turns a libusb device into a [`DeviceIdentity`]. The serial number needs
//! an open handle, which can fail for permission reasons; identification
//! still succeeds with a placeholder serial in that case.

use common::{DeviceIdentity, TargetFilter, service_id_for};
use rusb::{Device, DeviceDescriptor, UsbContext};
use tracing::debug;

/// Serial reported when the string descriptor cannot be read
pub const UNKNOWN_SERIAL: &str = "unknown";

/// Identify `device` if it matches `filter`
pub fn identify<T: UsbContext>(device: &Device<T>, filter: &TargetFilter) -> Option<DeviceIdentity> {
    let desc = match device.device_descriptor() {
        Ok(desc) => desc,
        Err(e) => {
            debug!(
                "No descriptor for bus {} addr {}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            return None;
        }
    };

    if !filter.matches(desc.vendor_id(), desc.product_id()) {
        return None;
    }

    let serial = read_serial(device, &desc);
    Some(build_identity(
        desc.vendor_id(),
        desc.product_id(),
        serial,
        device.bus_number(),
        device.address(),
    ))
}

/// Identity for a device that already left, when it was never recorded
///
/// The descriptor is cached by libusb and stays readable after detach, but
/// the device can no longer be opened.
pub fn identify_departed<T: UsbContext>(
    device: &Device<T>,
    filter: &TargetFilter,
) -> Option<DeviceIdentity> {
    let desc = device.device_descriptor().ok()?;
    if !filter.matches(desc.vendor_id(), desc.product_id()) {
        return None;
    }
    Some(build_identity(
        desc.vendor_id(),
        desc.product_id(),
        None,
        device.bus_number(),
        device.address(),
    ))
}

fn read_serial<T: UsbContext>(device: &Device<T>, desc: &DeviceDescriptor) -> Option<String> {
    let index = desc.serial_number_string_index()?;
    let handle = device
        .open()
        .map_err(|e| debug!("Cannot open device to read serial: {}", e))
        .ok()?;
    handle
        .read_string_descriptor_ascii(index)
        .map_err(|e| debug!("Cannot read serial descriptor: {}", e))
        .ok()
}

/// Assemble an identity, substituting [`UNKNOWN_SERIAL`] for a missing serial
pub fn build_identity(
    vendor_id: u16,
    product_id: u16,
    serial: Option<String>,
    bus: u8,
    address: u8,
) -> DeviceIdentity {
    let serial = serial
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN_SERIAL.to_string());
    DeviceIdentity::new(vendor_id, product_id, serial, service_id_for(bus, address))
}
