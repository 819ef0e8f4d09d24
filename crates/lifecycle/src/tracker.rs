//! Identity tracking for the single target device
//!
//! Debouncing is by attachment identity: a detach only counts when its
//! `service_id` matches the attachment currently recorded.

use common::{DeviceIdentity, TargetFilter};
use tracing::debug;

/// Holds at most one attached target device
#[derive(Debug, Clone)]
pub struct DeviceTracker {
    filter: TargetFilter,
    tracked: Option<DeviceIdentity>,
}

impl DeviceTracker {
    pub fn new(filter: TargetFilter) -> Self {
        Self {
            filter,
            tracked: None,
        }
    }

    pub fn filter(&self) -> TargetFilter {
        self.filter
    }

    /// Record an attach
    ///
    /// Returns `false` without touching the record when the candidate is not
    /// the target device. A matching candidate replaces whatever was recorded.
    pub fn on_attach(&mut self, candidate: DeviceIdentity) -> bool {
        if !self.filter.matches_identity(&candidate) {
            debug!("Ignoring attach of non-target device {}", candidate);
            return false;
        }

        if let Some(previous) = &self.tracked
            && previous.service_id != candidate.service_id
        {
            debug!(
                "Replacing tracked attachment {} with {}",
                previous.service_id, candidate.service_id
            );
        }

        self.tracked = Some(candidate);
        true
    }

    /// Record a detach
    ///
    /// Clears the record only when the candidate is the target device and
    /// names the recorded attachment. Stale or foreign detaches return `false`.
    pub fn on_detach(&mut self, candidate: &DeviceIdentity) -> bool {
        if !self.filter.matches_identity(candidate) {
            debug!("Ignoring detach of non-target device {}", candidate);
            return false;
        }

        match &self.tracked {
            Some(current) if current.service_id == candidate.service_id => {
                self.tracked = None;
                true
            }
            Some(current) => {
                debug!(
                    "Ignoring stale detach for service {} (tracking {})",
                    candidate.service_id, current.service_id
                );
                false
            }
            None => {
                debug!(
                    "Ignoring detach for service {} with nothing tracked",
                    candidate.service_id
                );
                false
            }
        }
    }

    pub fn current(&self) -> Option<&DeviceIdentity> {
        self.tracked.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.tracked.is_some()
    }
}
