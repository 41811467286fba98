//! Event dispatch state machine.
//!
//! Pure logic over the event stream: no I/O, no callbacks. Each event yields
//! actions for [`Session::run`](crate::Session::run) to execute, which keeps
//! the resume/invoke ordering testable on its own.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐  start   ┌─────────┐  SHUTDOWN   ┌─────────┐
//! │ Idle │─────────>│ Running │────────────>│ Stopped │
//! └──────┘  Resume  └─────────┘    Stop     └─────────┘
//!                     │     ↑
//!                     └─────┘
//!               FAULT_EVENT: Invoke, Resume
//! ```

use qmpfault_proto::{Event, EventKind};

use crate::{clock::SimClock, config::ClockPolicy, error::SessionError};

/// Actions returned by the dispatcher, executed in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// Send `cont` so the target keeps running
    Resume,

    /// Run the callback registered under `event_id`
    Invoke {
        /// Fault event id
        event_id: u64,
        /// Simulated time at which it fired
        time_ns: u64,
    },

    /// Termination observed; no further resume
    Stop,
}

/// Dispatch loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Loop not entered yet
    Idle,
    /// Target executing, waiting for events
    Running,
    /// Termination observed (terminal)
    Stopped,
}

/// Event dispatch state machine.
///
/// Sole owner of the simulated clock.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    state: LoopState,
    clock: SimClock,
    policy: ClockPolicy,
}

impl Dispatcher {
    /// Create a dispatcher in [`LoopState::Idle`].
    pub fn new(policy: ClockPolicy) -> Self {
        Self { state: LoopState::Idle, clock: SimClock::new(), policy }
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Whether termination has been observed.
    pub fn is_stopped(&self) -> bool {
        self.state == LoopState::Stopped
    }

    /// Current simulated time.
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    /// Enter the loop.
    ///
    /// Transitions to Running and returns the initial `Resume`.
    ///
    /// # Errors
    ///
    /// - `SessionError::AlreadyRunning` if the loop is running
    /// - `SessionError::Closed` if the loop already stopped
    pub fn start(&mut self) -> Result<Vec<DispatchAction>, SessionError> {
        match self.state {
            LoopState::Idle => {
                self.state = LoopState::Running;
                Ok(vec![DispatchAction::Resume])
            },
            LoopState::Running => Err(SessionError::AlreadyRunning),
            LoopState::Stopped => Err(SessionError::Closed),
        }
    }

    /// Process one event.
    ///
    /// - `FAULT_EVENT`: advance the clock, then `Invoke` and `Resume`
    /// - `SHUTDOWN`: transition to Stopped, `Stop`
    /// - anything else: no actions
    ///
    /// Once stopped, remaining events of the batch yield no actions.
    ///
    /// # Errors
    ///
    /// - `SessionError::Protocol` if a fault event payload is malformed
    /// - `SessionError::ClockRegression` if simulated time goes backwards
    ///   under [`ClockPolicy::Strict`]
    pub fn handle_event(&mut self, event: &Event) -> Result<Vec<DispatchAction>, SessionError> {
        match self.state {
            LoopState::Running => {},
            LoopState::Stopped => {
                tracing::warn!(event = %event.event, "ignoring event after shutdown");
                return Ok(Vec::new());
            },
            LoopState::Idle => return Ok(Vec::new()),
        }

        match event.kind()? {
            EventKind::FaultTrigger(fault) => {
                if !self.clock.advance(fault.time_ns, self.policy)? {
                    tracing::warn!(
                        current_ns = self.clock.now_ns(),
                        observed_ns = fault.time_ns,
                        event_id = fault.event_id,
                        "fault event reports earlier simulated time, keeping clock"
                    );
                }
                Ok(vec![
                    DispatchAction::Invoke { event_id: fault.event_id, time_ns: fault.time_ns },
                    DispatchAction::Resume,
                ])
            },
            EventKind::Shutdown => {
                self.state = LoopState::Stopped;
                Ok(vec![DispatchAction::Stop])
            },
            EventKind::Other => Ok(Vec::new()),
        }
    }
}
