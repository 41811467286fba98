//! Error types for the fault injection session.
//!
//! Every error here ends the session. The owner (the CLI, a test) decides how
//! to report it and whether to exit the process; [`SessionError::category`]
//! maps each variant onto the operator-facing failure classes.

use std::io;

use qmpfault_proto::ProtocolError;
use thiserror::Error;

/// Failure classes reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Channel could not be established or negotiated
    Connection,
    /// Channel broke during operation
    Channel,
    /// Client and target disagree about protocol state
    Desync,
    /// Bad input from the operator or the scenario
    Operator,
}

/// Errors raised by a [`Transport`](crate::Transport) implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// Socket read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Peer sent a line we cannot decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors that abort a fault injection session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Command got no response; the channel is gone.
    #[error("disconnected while waiting for response to {command}")]
    ChannelClosed {
        /// Command that was in flight
        command: String,
    },

    /// Transport failed during send or poll.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Event payload could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Target rejected a command.
    #[error("{command} failed: {class}: {desc}")]
    CommandFailed {
        /// Command name
        command: String,
        /// QMP error class
        class: String,
        /// Target's description
        desc: String,
    },

    /// Response lacks the result a command is expected to return.
    #[error("{command} returned no {field}")]
    MissingResult {
        /// Command name
        command: String,
        /// Missing result field
        field: &'static str,
    },

    /// Fault event references an id no callback was registered under.
    #[error("fault event {0} has no registered callback")]
    UnknownEventId(u64),

    /// Fault event reports a time earlier than one already observed.
    #[error("simulated time went backwards: {observed_ns}ns after {current_ns}ns")]
    ClockRegression {
        /// Clock value before the event
        current_ns: u64,
        /// Time carried by the event
        observed_ns: u64,
    },

    /// Callback fired while it was still running.
    #[error("callback {name} is already running")]
    CallbackBusy {
        /// Callback name
        name: String,
    },

    /// `run` called while the dispatch loop is active.
    #[error("dispatch loop is already running")]
    AlreadyRunning,

    /// Operation attempted after the session ended.
    #[error("session is closed")]
    Closed,

    /// Operator supplied an argument the target cannot act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SessionError {
    /// Failure class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ChannelClosed { .. }
            | Self::Closed
            | Self::Transport(TransportError::Closed | TransportError::Io(_)) => {
                ErrorCategory::Channel
            },
            Self::Transport(TransportError::Protocol(_))
            | Self::Protocol(_)
            | Self::MissingResult { .. }
            | Self::UnknownEventId(_)
            | Self::ClockRegression { .. } => ErrorCategory::Desync,
            Self::CommandFailed { .. }
            | Self::CallbackBusy { .. }
            | Self::AlreadyRunning
            | Self::InvalidArgument(_) => ErrorCategory::Operator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_channel_is_channel_failure() {
        let err = SessionError::ChannelClosed { command: "cont".to_string() };
        assert_eq!(err.category(), ErrorCategory::Channel);
        assert_eq!(err.to_string(), "disconnected while waiting for response to cont");

        let err = SessionError::from(TransportError::Closed);
        assert_eq!(err.category(), ErrorCategory::Channel);
    }

    #[test]
    fn desync_errors() {
        assert_eq!(SessionError::UnknownEventId(3).category(), ErrorCategory::Desync);
        assert_eq!(
            SessionError::MissingResult { command: "read_mem".to_string(), field: "value" }
                .to_string(),
            "read_mem returned no value"
        );
        assert_eq!(
            SessionError::ClockRegression { current_ns: 10, observed_ns: 5 }.category(),
            ErrorCategory::Desync
        );
    }

    #[test]
    fn rejected_command_is_operator_error() {
        let err = SessionError::CommandFailed {
            command: "write_mem".to_string(),
            class: "GenericError".to_string(),
            desc: "'/foo' is not a CPU or doesn't exists".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Operator);
        assert_eq!(
            err.to_string(),
            "write_mem failed: GenericError: '/foo' is not a CPU or doesn't exists"
        );
    }
}
