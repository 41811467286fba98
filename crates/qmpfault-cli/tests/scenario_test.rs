//! Scenario runs against the simulated target.

use std::io::Write;

use qmpfault_cli::{Scenario, ScenarioError};
use qmpfault_core::{Session, SessionConfig};
use qmpfault_harness::{SimMachine, SimTarget};
use qmpfault_proto::command;
use serde_json::json;

const GLITCH: &str = r#"{
    "faults": [
        {
            "name": "flip-flag",
            "at_ns": 1000,
            "actions": [
                { "op": "write_memory", "address": "0x4000", "value": "0xff", "size": 1 },
                { "op": "read_memory", "address": 16384, "size": 1, "cpu": "/machine/cpu[1]" }
            ]
        },
        {
            "at_ns": 500,
            "repeat_every_ns": 700,
            "actions": [
                { "op": "set_signal", "device": "/machine/gpio0", "line": 1, "value": true },
                { "op": "set_property", "path": "/machine/uart0", "property": "enabled", "value": false },
                { "op": "get_property", "path": "/machine/uart0", "property": "enabled" }
            ]
        }
    ]
}"#;

fn machine() -> SimMachine {
    SimMachine::new(2)
        .with_end_time(3000)
        .with_device("/machine/gpio0")
        .with_property("/machine/uart0", "enabled", json!(true))
}

#[test]
fn scenario_runs_to_end_of_time() {
    let scenario = Scenario::from_json(GLITCH).unwrap();
    let target = SimTarget::new(machine());
    let mut session = Session::new(target.clone(), SessionConfig::default());

    assert_eq!(scenario.install(&mut session).unwrap(), vec![0, 1]);
    session.run().unwrap();

    let machine = target.machine();
    assert_eq!(machine.peek(0x4000, 1), 0xff);
    assert_eq!(machine.property("/machine/uart0", "enabled"), Some(&json!(false)));

    // Repeats at 500, 1200, 1900, 2600; the next one would be past the end.
    let times: Vec<u64> = machine.gpio_log().iter().map(|g| g.time_ns).collect();
    assert_eq!(times, vec![500, 1200, 1900, 2600]);
    assert_eq!(session.registered_callbacks(), 2);
    assert!(machine.is_shut_down());
    // Start, plus one per firing: flip-flag once, the repeating fault four times.
    assert_eq!(machine.count(command::CONT), 6);
}

#[test]
fn failing_action_aborts_run() {
    let text = r#"{"faults": [{"at_ns": 10, "actions": [
        { "op": "set_signal", "device": "/machine/missing", "line": 0, "value": true }
    ]}]}"#;
    let scenario = Scenario::from_json(text).unwrap();
    let target = SimTarget::new(machine());
    let mut session = Session::new(target.clone(), SessionConfig::default());

    scenario.install(&mut session).unwrap();
    assert!(session.run().is_err());
    assert!(target.is_closed());
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(GLITCH.as_bytes()).unwrap();

    let scenario = Scenario::load(file.path()).unwrap();
    assert_eq!(scenario.faults.len(), 2);
    assert_eq!(scenario.faults[0].name.as_deref(), Some("flip-flag"));

    let missing = Scenario::load(&file.path().with_extension("absent")).unwrap_err();
    assert!(matches!(missing, ScenarioError::Io { .. }));
}

#[test]
fn repeating_fault_is_freed_with_its_session() {
    let scenario = Scenario::from_json(GLITCH).unwrap();
    let repeating = &scenario.faults[1];
    let target = SimTarget::new(machine());
    let mut session = Session::new(target.clone(), SessionConfig::default());

    let callback = repeating.callback(1);
    session.schedule_trigger(repeating.at_ns, &callback).unwrap();
    let weak = callback.downgrade();
    drop(callback);
    session.run().unwrap();

    assert_eq!(target.machine().gpio_log().len(), 4);
    assert!(weak.upgrade().is_some());
    drop(session);
    assert!(weak.upgrade().is_none());
}
