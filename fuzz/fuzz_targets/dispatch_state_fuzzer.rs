//! Fuzz target for the Dispatcher state machine
//!
//! # Strategy
//!
//! - Arbitrary interleaving of fault, shutdown and unrelated events
//! - Fault times jump forwards and backwards
//! - Both clock policies
//!
//! # Invariants
//!
//! - Nothing is dispatched before `start` or after shutdown
//! - Every dispatched fault is followed by exactly one resume
//! - The clock never decreases
//! - Strict policy rejects every regression, lenient never does

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use qmpfault_core::{ClockPolicy, DispatchAction, Dispatcher, LoopState, SessionError};
use qmpfault_proto::Event;

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    Start,
    Fault { event_id: u8, time_ns: u32 },
    Shutdown,
    Other,
}

fuzz_target!(|input: (bool, Vec<Input>)| {
    let (lenient, inputs) = input;
    let policy = if lenient { ClockPolicy::Lenient } else { ClockPolicy::Strict };
    let mut dispatcher = Dispatcher::new(policy);

    for input in inputs {
        let before = dispatcher.state();
        let clock_before = dispatcher.now_ns();

        let result = match &input {
            Input::Start => dispatcher.start(),
            Input::Fault { event_id, time_ns } => {
                dispatcher.handle_event(&Event::fault(u64::from(*event_id), u64::from(*time_ns)))
            },
            Input::Shutdown => dispatcher.handle_event(&Event::shutdown()),
            Input::Other => dispatcher.handle_event(&Event::new("RESUME", Default::default())),
        };

        assert!(dispatcher.now_ns() >= clock_before, "clock went backwards");

        match result {
            Ok(actions) => {
                if matches!(input, Input::Start) {
                    assert_eq!(before, LoopState::Idle);
                    assert_eq!(actions, [DispatchAction::Resume]);
                } else if before != LoopState::Running {
                    assert!(actions.is_empty(), "dispatched outside the running state");
                }
                let invokes =
                    actions.iter().filter(|a| matches!(a, DispatchAction::Invoke { .. })).count();
                let resumes = actions.iter().filter(|a| matches!(a, DispatchAction::Resume)).count();
                if invokes > 0 {
                    assert_eq!(invokes, resumes);
                }
            },
            Err(SessionError::ClockRegression { .. }) => assert!(!lenient),
            Err(SessionError::AlreadyRunning | SessionError::Closed) => {},
            Err(e) => panic!("unexpected dispatcher error: {e}"),
        }
    }
});

