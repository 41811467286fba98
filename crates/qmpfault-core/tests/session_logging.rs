//! Verbosity gating of session logs.
//!
//! Level 1 logs time-stamped actions, level 2 adds every command and
//! response.

use qmpfault_core::{Session, SessionCallback, SessionConfig};
use qmpfault_harness::SimTarget;
use tracing_test::traced_test;

fn schedule_one(verbosity: u8) {
    let config = SessionConfig { verbosity, ..Default::default() };
    let mut session = Session::new(SimTarget::default(), config);
    let glitch = SessionCallback::new("glitch", |_: &mut Session<SimTarget>| Ok(()));
    session.schedule_trigger(1000, &glitch).unwrap();
}

fn count(lines: &[&str], needle: &str) -> usize {
    lines.iter().filter(|line| line.contains(needle)).count()
}

#[traced_test]
#[test]
fn quiet_session_logs_nothing() {
    schedule_one(0);
    assert!(!logs_contain("Notify glitch"));
    assert!(!logs_contain("arguments="));
}

#[traced_test]
#[test]
fn verbosity_one_logs_actions_only() {
    schedule_one(1);
    assert!(logs_contain("0ns: Notify glitch in 1000ns"));
    assert!(!logs_contain("arguments="));
    assert!(!logs_contain("response="));
}

#[traced_test]
#[test]
fn verbosity_two_logs_traffic() {
    schedule_one(2);
    assert!(logs_contain("0ns: Notify glitch in 1000ns"));
    logs_assert(|lines: &[&str]| {
        match (count(lines, "arguments="), count(lines, "response=")) {
            (1, 1) => Ok(()),
            (commands, responses) => {
                Err(format!("expected one command and one response, got {commands} and {responses}"))
            },
        }
    });
}
