//! Test utilities for uvc-autoctl
//!
//! Identity builders and timeout helpers shared by the test suites of the
//! lifecycle engine and the agent.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{oak_identity, OAK_FILTER};
//!
//! let device = oak_identity("14442C10D13EABCE00", 100);
//! assert!(OAK_FILTER.matches_identity(&device));
//! ```

use crate::usb_types::{DeviceIdentity, TargetFilter};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Luxonis (Intel Movidius) vendor id
pub const OAK_VENDOR_ID: u16 = 0x03e7;

/// OAK-D Lite product id when booted into the UVC firmware
pub const OAK_PRODUCT_ID: u16 = 0x2485;

/// Filter matching the OAK-D Lite
pub const OAK_FILTER: TargetFilter = TargetFilter::new(OAK_VENDOR_ID, OAK_PRODUCT_ID);

/// Create an OAK-D Lite identity with the given serial and service id
pub fn oak_identity(serial: &str, service_id: u64) -> DeviceIdentity {
    DeviceIdentity::new(OAK_VENDOR_ID, OAK_PRODUCT_ID, serial, service_id)
}

/// Create an identity for a device that is not the target
pub fn foreign_identity(service_id: u64) -> DeviceIdentity {
    DeviceIdentity::new(0x046d, 0xc52b, format!("FOREIGN{:04}", service_id), service_id)
}

/// Run a future with a timeout
///
/// # Example
/// ```
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
/// assert_eq!(result, 42);
/// # }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oak_identity() {
        let device = oak_identity("A1", 7);
        assert_eq!(device.vendor_id, OAK_VENDOR_ID);
        assert_eq!(device.product_id, OAK_PRODUCT_ID);
        assert_eq!(device.serial_number, "A1");
        assert_eq!(device.service_id, 7);
    }

    #[test]
    fn test_foreign_identity_does_not_match() {
        assert!(!OAK_FILTER.matches_identity(&foreign_identity(1)));
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }
}
