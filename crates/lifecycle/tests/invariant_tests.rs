//! Controller Invariant Tests
//!
//! Drives the controller through every sequence of up to four operations
//! drawn from attach, detach, toggle and manual disconnect, and checks after
//! each step that:
//! - the tracked record follows the service-id matching rules
//! - a stale detach changes neither the record nor the camera
//! - at most one camera process is alive and it matches `running`
//! - the status label was pushed and agrees with `running`
//!
//! A final test races monitor events against user commands from two threads.
//!
//! Run with: `cargo test -p lifecycle --test invariant_tests`

use common::DeviceIdentity;
use common::test_utils::{OAK_FILTER, oak_identity};
use lifecycle::test_utils::{RecordingUi, ScriptedLauncher, StopBehavior};
use lifecycle::{Controller, LaunchTarget, ProcessSupervisor, StatusLabel};
use std::io::Write;
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy)]
enum Op {
    Attach(u64),
    Detach(u64),
    Toggle,
    Disconnect,
}

const OPS: [Op; 6] = [
    Op::Attach(100),
    Op::Attach(101),
    Op::Detach(100),
    Op::Detach(101),
    Op::Toggle,
    Op::Disconnect,
];

fn device(service_id: u64) -> DeviceIdentity {
    oak_identity("A1", service_id)
}

fn sequences(max_len: usize) -> Vec<Vec<Op>> {
    let mut all = vec![Vec::new()];
    let mut frontier = vec![Vec::new()];
    for _ in 0..max_len {
        let mut next = Vec::new();
        for seq in &frontier {
            for op in OPS {
                let mut extended: Vec<Op> = seq.clone();
                extended.push(op);
                next.push(extended);
            }
        }
        all.extend(next.iter().cloned());
        frontier = next;
    }
    all
}

fn run_sequence(script: &NamedTempFile, behavior: StopBehavior, auto_mode: bool, ops: &[Op]) {
    let launcher = ScriptedLauncher::new(behavior);
    let counters = launcher.counters();
    let supervisor = ProcessSupervisor::new(Box::new(launcher), LaunchTarget::new(script.path()));
    let controller = Controller::new(RecordingUi::new(), OAK_FILTER, supervisor, auto_mode);

    let mut expected_record: Option<u64> = None;

    for (step, op) in ops.iter().enumerate() {
        let context = format!("sequence {:?} step {} (auto_mode={})", ops, step, auto_mode);
        let labels_before = controller.ui().labels().len();
        let running_before = controller.is_camera_running();
        let record_before = controller.tracked_device();

        match *op {
            Op::Attach(service_id) => {
                controller.handle_attach(device(service_id));
                expected_record = Some(service_id);
            }
            Op::Detach(service_id) => {
                controller.handle_detach(device(service_id));
                if expected_record == Some(service_id) {
                    expected_record = None;
                } else {
                    assert_eq!(controller.is_camera_running(), running_before, "{}", context);
                    assert_eq!(controller.tracked_device(), record_before, "{}", context);
                }
            }
            Op::Toggle => controller.toggle_auto_mode(),
            Op::Disconnect => controller.disconnect_camera_explicitly(),
        }

        let running = controller.is_camera_running();

        assert_eq!(
            controller.tracked_device().map(|d| d.service_id),
            expected_record,
            "{}",
            context
        );

        let labels = controller.ui().labels();
        assert!(labels.len() > labels_before, "no label push: {}", context);
        assert_eq!(
            labels.last().copied(),
            Some(StatusLabel::from_running(running)),
            "{}",
            context
        );

        let finished = match behavior {
            StopBehavior::IgnoreInterrupt => counters.kills(),
            _ => counters.interrupts(),
        };
        let alive = counters.launches() - finished;
        assert!(alive <= 1, "more than one camera process: {}", context);
        assert_eq!(alive == 1, running, "{}", context);

        assert!(controller.ui().alerts().iter().all(|(title, _)| {
            behavior == StopBehavior::IgnoreInterrupt && title == "Stopping camera timed out."
        }));
    }

    let kills_before = counters.kills();
    controller.shutdown();
    assert!(!controller.is_camera_running());
    controller.shutdown();
    if behavior != StopBehavior::IgnoreInterrupt {
        assert_eq!(counters.kills(), kills_before);
    }
}

#[test]
fn test_all_short_sequences_with_cooperative_camera() {
    let mut script = NamedTempFile::new().unwrap();
    writeln!(script, "#!/usr/bin/env python3").unwrap();

    for ops in sequences(4) {
        for auto_mode in [true, false] {
            run_sequence(&script, StopBehavior::ExitOnInterrupt, auto_mode, &ops);
        }
    }
}

#[test]
fn test_all_short_sequences_with_unresponsive_camera() {
    let mut script = NamedTempFile::new().unwrap();
    writeln!(script, "#!/usr/bin/env python3").unwrap();

    for ops in sequences(3) {
        for auto_mode in [true, false] {
            run_sequence(&script, StopBehavior::IgnoreInterrupt, auto_mode, &ops);
        }
    }
}

const RACE_ROUNDS: usize = 2000;

#[test]
fn test_concurrent_events_and_commands_keep_one_camera() {
    let mut script = NamedTempFile::new().unwrap();
    writeln!(script, "#!/usr/bin/env python3").unwrap();

    let launcher = ScriptedLauncher::new(StopBehavior::ExitOnInterrupt);
    let counters = launcher.counters();
    let supervisor = ProcessSupervisor::new(Box::new(launcher), LaunchTarget::new(script.path()));
    let controller = Arc::new(Controller::new(
        RecordingUi::new(),
        OAK_FILTER,
        supervisor,
        true,
    ));

    let events = {
        let controller = controller.clone();
        thread::spawn(move || {
            for round in 0..RACE_ROUNDS {
                let service_id = 100 + (round % 3) as u64;
                controller.handle_attach(device(service_id));
                controller.handle_detach(device(service_id));
            }
        })
    };
    let commands = {
        let controller = controller.clone();
        thread::spawn(move || {
            for _ in 0..RACE_ROUNDS {
                controller.toggle_auto_mode();
                controller.disconnect_camera_explicitly();
            }
        })
    };
    events.join().unwrap();
    commands.join().unwrap();

    let running = controller.is_camera_running();
    let alive = counters.launches() - counters.interrupts();
    assert!(alive <= 1, "{} camera processes alive", alive);
    assert_eq!(alive == 1, running);
    assert_eq!(
        controller.ui().last_label(),
        Some(StatusLabel::from_running(running))
    );
    assert!(controller.ui().alerts().is_empty());

    controller.shutdown();
    assert!(!controller.is_camera_running());
    assert_eq!(counters.launches(), counters.interrupts());
}
