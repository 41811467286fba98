//! Scripted transport for protocol edge cases.
//!
//! Replays canned responses and event batches regardless of the commands
//! received. Used where a well-behaved simulated machine cannot produce the
//! situation under test: missing results, disconnects, unknown event ids,
//! time going backwards.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use qmpfault_core::{Transport, TransportError};
use qmpfault_proto::{Command, Event, Response};
use serde_json::json;

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Option<Response>>,
    batches: VecDeque<Vec<Event>>,
    sent: Vec<Command>,
    closed: bool,
}

/// Transport replaying a script.
///
/// Responses are consumed one per command; once exhausted every command gets
/// `{"return": {}}`. Event batches are consumed one per blocking poll; a
/// blocking poll with no batch left reports the channel closed.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response for the next unanswered command.
    #[must_use]
    pub fn respond(self, response: Response) -> Self {
        self.lock().responses.push_back(Some(response));
        self
    }

    /// Queue a successful response with `value` as result.
    #[must_use]
    pub fn respond_ok(self, value: serde_json::Value) -> Self {
        self.respond(Response::Return(value))
    }

    /// Queue a disconnect in place of the next response.
    #[must_use]
    pub fn disconnect(self) -> Self {
        self.lock().responses.push_back(None);
        self
    }

    /// Queue an event batch for the next blocking poll.
    #[must_use]
    pub fn events(self, batch: Vec<Event>) -> Self {
        self.lock().batches.push_back(batch);
        self
    }

    /// Commands received so far.
    pub fn sent(&self) -> Vec<Command> {
        self.lock().sent.clone()
    }

    /// Number of received commands named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.lock().sent.iter().filter(|c| c.name() == name).count()
    }

    /// Whether the session released the channel.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, command: &Command) -> Result<Option<Response>, TransportError> {
        let mut script = self.lock();
        if script.closed {
            return Err(TransportError::Closed);
        }
        script.sent.push(command.clone());
        Ok(script.responses.pop_front().unwrap_or(Some(Response::Return(json!({})))))
    }

    fn poll_events(&mut self, blocking: bool) -> Result<Vec<Event>, TransportError> {
        let mut script = self.lock();
        if script.closed {
            return Err(TransportError::Closed);
        }
        if !blocking {
            return Ok(Vec::new());
        }
        script.batches.pop_front().ok_or(TransportError::Closed)
    }

    fn clear_events(&mut self) {}

    fn close(&mut self) {
        self.lock().closed = true;
    }
}
