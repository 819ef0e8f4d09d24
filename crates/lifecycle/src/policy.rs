//! Auto-mode policy
//!
//! Auto mode decides whether device presence drives the camera. The decisions
//! are pure functions of the mode, the camera state and device presence so the
//! controller can stay a thin sequencer around them.

/// User-togglable auto mode
///
/// Only two mutators exist: [`AutoMode::toggle`] and [`AutoMode::force_off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoMode {
    enabled: bool,
}

impl AutoMode {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flip the mode and return the new value
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Disable the mode, returning whether it was enabled
    pub fn force_off(&mut self) -> bool {
        std::mem::replace(&mut self.enabled, false)
    }
}

impl Default for AutoMode {
    fn default() -> Self {
        Self::new(true)
    }
}

/// What to do with the camera once the target device attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachAction {
    StartCamera,
    AlreadyRunning,
    Nothing,
}

/// What to do with the camera once the auto mode flipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    StartCamera,
    StopCamera,
    Nothing,
}

/// Decide the camera action for an attach of the target device
pub fn on_attach(auto_mode_enabled: bool, camera_running: bool) -> AttachAction {
    match (auto_mode_enabled, camera_running) {
        (_, true) => AttachAction::AlreadyRunning,
        (true, false) => AttachAction::StartCamera,
        (false, false) => AttachAction::Nothing,
    }
}

/// Decide the camera action after the auto mode changed to `enabled`
pub fn on_toggle(enabled: bool, device_present: bool, camera_running: bool) -> ToggleAction {
    match (enabled, device_present, camera_running) {
        (true, true, false) => ToggleAction::StartCamera,
        (false, _, true) => ToggleAction::StopCamera,
        _ => ToggleAction::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_flips() {
        let mut mode = AutoMode::new(false);
        assert!(mode.toggle());
        assert!(mode.is_enabled());
        assert!(!mode.toggle());
        assert!(!mode.is_enabled());
    }

    #[test]
    fn test_force_off_reports_change() {
        let mut mode = AutoMode::new(true);
        assert!(mode.force_off());
        assert!(!mode.is_enabled());
        assert!(!mode.force_off());
        assert!(!mode.is_enabled());
    }

    #[test]
    fn test_default_enabled() {
        assert!(AutoMode::default().is_enabled());
    }

    #[test]
    fn test_attach_decisions_exhaustive() {
        let cases = [
            (false, false, AttachAction::Nothing),
            (false, true, AttachAction::AlreadyRunning),
            (true, false, AttachAction::StartCamera),
            (true, true, AttachAction::AlreadyRunning),
        ];

        for (auto_mode, running, expected) in cases {
            assert_eq!(
                on_attach(auto_mode, running),
                expected,
                "auto_mode={} running={}",
                auto_mode,
                running
            );
        }
    }

    #[test]
    fn test_toggle_decisions_exhaustive() {
        let cases = [
            (false, false, false, ToggleAction::Nothing),
            (false, false, true, ToggleAction::StopCamera),
            (false, true, false, ToggleAction::Nothing),
            (false, true, true, ToggleAction::StopCamera),
            (true, false, false, ToggleAction::Nothing),
            (true, false, true, ToggleAction::Nothing),
            (true, true, false, ToggleAction::StartCamera),
            (true, true, true, ToggleAction::Nothing),
        ];

        for (enabled, present, running, expected) in cases {
            assert_eq!(
                on_toggle(enabled, present, running),
                expected,
                "enabled={} present={} running={}",
                enabled,
                present,
                running
            );
        }
    }
}
