//! Deterministic simulation harness for fault injection testing.
//!
//! A simulated QMP target ([`SimMachine`]) with an instantaneous virtual
//! clock, plus three ways to talk to it:
//!
//! - [`SimTarget`]: in-process [`qmpfault_core::Transport`]
//! - [`SimServer`]: the same machine behind a TCP or Unix socket
//! - [`ScriptedTransport`]: canned responses and events for edge cases a
//!   well-behaved machine never produces

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod machine;
pub mod scripted;
pub mod sim_server;
pub mod sim_target;

pub use machine::{GpioChange, PendingTrigger, SimMachine};
pub use scripted::ScriptedTransport;
pub use sim_server::{ServeOptions, SimServer};
pub use sim_target::SimTarget;
