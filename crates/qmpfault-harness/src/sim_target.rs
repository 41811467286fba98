//! In-process transport to a [`SimMachine`].
//!
//! `SimTarget` implements [`Transport`] so a [`qmpfault_core::Session`] runs
//! against the simulated machine without a socket. Clones share the machine:
//! the session owns one clone, the test keeps another for assertions.

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use qmpfault_core::{Transport, TransportError};
use qmpfault_proto::{Command, Event, Response};

use crate::machine::SimMachine;

/// Shared state behind all clones of a target.
#[derive(Debug)]
struct SharedState {
    machine: SimMachine,
    queued: Vec<Event>,
    closed: bool,
    clears: usize,
}

/// Transport backed by a simulated machine.
#[derive(Debug, Clone)]
pub struct SimTarget {
    state: Arc<Mutex<SharedState>>,
}

impl Default for SimTarget {
    fn default() -> Self {
        Self::new(SimMachine::default())
    }
}

impl SimTarget {
    /// Wrap a machine.
    pub fn new(machine: SimMachine) -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState {
                machine,
                queued: Vec::new(),
                closed: false,
                clears: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the machine.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut SimMachine) -> R) -> R {
        f(&mut self.lock().machine)
    }

    /// Snapshot of the machine.
    pub fn machine(&self) -> SimMachine {
        self.lock().machine.clone()
    }

    /// Whether the session released the channel.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of `clear_events` calls.
    pub fn clear_count(&self) -> usize {
        self.lock().clears
    }

    /// Names of received commands, in order.
    pub fn command_names(&self) -> Vec<String> {
        self.lock().machine.commands().iter().map(|c| c.name().to_string()).collect()
    }
}

impl Transport for SimTarget {
    fn send(&mut self, command: &Command) -> Result<Option<Response>, TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let response = state.machine.handle(command);
        let events = state.machine.take_events();
        state.queued.extend(events);
        Ok(Some(response))
    }

    fn poll_events(&mut self, blocking: bool) -> Result<Vec<Event>, TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let events = state.machine.take_events();
        state.queued.extend(events);

        if blocking && state.queued.is_empty() {
            // Nothing can arrive later: the machine only moves on `cont`.
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "simulated target is stopped with no pending events",
            )));
        }
        Ok(std::mem::take(&mut state.queued))
    }

    fn clear_events(&mut self) {
        let mut state = self.lock();
        state.queued.clear();
        state.clears += 1;
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}
