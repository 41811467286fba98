//! Client error types.

use std::io;

use qmpfault_core::{ErrorCategory, TransportError};
use thiserror::Error;

use crate::address::AddressError;

/// Errors raised while establishing a session.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Operator supplied an unusable address.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Socket could not be opened.
    #[error("could not connect to {address}: {source}")]
    Connect {
        /// Address as given
        address: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// First line was not a QMP greeting.
    #[error("didn't get QMP greeting message: {0}")]
    Greeting(String),

    /// Target refused or never answered `qmp_capabilities`.
    #[error("could not negotiate capabilities: {0}")]
    Capabilities(String),

    /// Channel failed during the handshake.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Failure class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Address(_) => ErrorCategory::Operator,
            Self::Connect { .. }
            | Self::Greeting(_)
            | Self::Capabilities(_)
            | Self::Transport(_) => ErrorCategory::Connection,
        }
    }
}
