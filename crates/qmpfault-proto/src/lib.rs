//! QMP wire protocol
//!
//! Typed messages exchanged with a QEMU instance over the QEMU Machine
//! Protocol. Only the subset driven by the fault injection workflow is
//! modeled.
//!
//! # Message Shapes
//!
//! - [`Command`]: `{"execute": name, "arguments": {..}}` (client to target)
//! - [`Response`]: `{"return": value}` or `{"error": {"class", "desc"}}`
//! - [`Event`]: `{"event": name, "data": {..}, "timestamp": {..}}`
//! - [`Greeting`]: `{"QMP": {"version": .., "capabilities": [..]}}`
//!
//! Every message is a single JSON object terminated by a newline.
//! [`ServerMessage::decode`] classifies one line received from the target.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod errors;
pub mod event;
pub mod message;
pub mod selector;

pub use command::Command;
pub use errors::{ProtocolError, Result};
pub use event::{Event, EventKind, FaultEventData, Timestamp};
pub use message::{Greeting, QemuVersion, QmpError, Response, ServerMessage};
pub use selector::CpuSelector;
