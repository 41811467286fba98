//! Transport abstraction.
//!
//! A transport is a strict request/reply channel with an out-of-band event
//! queue: at most one command is outstanding, and events that arrive while
//! waiting for a response are queued rather than returned in its place.

use qmpfault_proto::{Command, Event, Response};

use crate::error::TransportError;

/// Channel to a running target.
///
/// Synchronous by contract: the session has a single thread of control and
/// only suspends inside [`send`](Transport::send) and a blocking
/// [`poll_events`](Transport::poll_events).
///
/// # Invariants
///
/// - Events are returned in arrival order, each exactly once
/// - Events received while waiting for a response stay queued for the next
///   poll
/// - After [`close`](Transport::close), `send` and `poll_events` fail
pub trait Transport {
    /// Submit a command and wait for its response.
    ///
    /// Returns `Ok(None)` when the peer closed the channel instead of
    /// answering.
    fn send(&mut self, command: &Command) -> Result<Option<Response>, TransportError>;

    /// Drain queued events.
    ///
    /// With `blocking`, waits until at least one event is available. Without
    /// it, returns whatever is queued or readable right now, possibly nothing.
    fn poll_events(&mut self, blocking: bool) -> Result<Vec<Event>, TransportError>;

    /// Discard any queued events.
    fn clear_events(&mut self);

    /// Release the channel.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, command: &Command) -> Result<Option<Response>, TransportError> {
        (**self).send(command)
    }

    fn poll_events(&mut self, blocking: bool) -> Result<Vec<Event>, TransportError> {
        (**self).poll_events(blocking)
    }

    fn clear_events(&mut self) {
        (**self).clear_events();
    }

    fn close(&mut self) {
        (**self).close();
    }
}
