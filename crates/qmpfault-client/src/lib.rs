//! QMP socket client.
//!
//! Connects to a target's QMP monitor over TCP or a Unix socket, performs the
//! greeting and capabilities handshake, and hands back a
//! [`Session`](qmpfault_core::Session) ready to schedule faults.
//!
//! ```no_run
//! use qmpfault_client::connect;
//! use qmpfault_core::SessionConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = connect("localhost:4444", SessionConfig::default())?;
//! session.run()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod address;
pub mod error;
pub mod transport;

pub use address::{AddressError, QmpAddress};
pub use error::ClientError;
use qmpfault_core::{Session, SessionConfig};
pub use transport::QmpTransport;

/// Connect to the target at `address` and open a session.
///
/// `address` is `host:port` for TCP or a Unix socket path.
pub fn connect(address: &str, config: SessionConfig) -> Result<Session<QmpTransport>, ClientError> {
    let address: QmpAddress = address.parse()?;
    connect_to(&address, config)
}

/// Connect to an already parsed address and open a session.
pub fn connect_to(
    address: &QmpAddress,
    config: SessionConfig,
) -> Result<Session<QmpTransport>, ClientError> {
    let (transport, greeting) = QmpTransport::connect(address)?;
    tracing::info!(%address, "Connected to QEMU {}", greeting.version());
    Ok(Session::new(transport, config))
}
