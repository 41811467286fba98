//! Scenario-driven fault injection.
//!
//! Loads a [`Scenario`] from JSON and installs its faults on a session. The
//! `qmpfault` binary wires this to a socket connection.

#![forbid(unsafe_code)]

pub mod scenario;

pub use scenario::{Action, Fault, Scenario, ScenarioError, Word};
