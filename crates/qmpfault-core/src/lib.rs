//! Fault injection session core
//!
//! Drives a simulated machine over QMP: resumes execution, arms fault
//! triggers on the target's virtual clock, and runs operator callbacks when
//! those triggers fire. Callbacks act on the machine through the same
//! [`Session`] (memory, QOM properties, GPIO lines) and may arm further
//! triggers.
//!
//! # Architecture
//!
//! The event loop follows the action pattern: [`Dispatcher`] is a pure state
//! machine that consumes events and returns [`DispatchAction`]s, and
//! [`Session::run`] executes them against the [`Transport`]. The transport is
//! a trait so the same session runs against a real QEMU socket or an
//! in-process simulated target.
//!
//! # Components
//!
//! - [`Session`]: Command facade and dispatch loop executor
//! - [`CallbackRegistry`]: Fault event id to callback, idempotent registration
//! - [`Dispatcher`]: Event stream state machine
//! - [`SimClock`]: Simulated time observed from fault events
//! - [`Transport`]: Request/response channel with an out-of-band event queue

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod callback;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

pub use callback::{Callback, WeakCallback};
pub use clock::SimClock;
pub use config::{ClockPolicy, SessionConfig};
pub use dispatch::{DispatchAction, Dispatcher, LoopState};
pub use error::{ErrorCategory, SessionError, TransportError};
pub use qmpfault_proto::CpuSelector;
pub use registry::CallbackRegistry;
pub use session::{MAX_ACCESS_SIZE, Session, SessionCallback};
pub use transport::Transport;
