//! Target address parsing.
//!
//! `host:port` selects TCP. Anything else is taken as a Unix socket path.

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

/// Where the target's QMP monitor listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QmpAddress {
    /// TCP endpoint
    Tcp {
        /// Host name or IPv4 address
        host: String,
        /// Port number
        port: u16,
    },
    /// Unix domain socket
    Unix(PathBuf),
}

/// Address could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Empty address string.
    #[error("empty address")]
    Empty,

    /// `host:port` form with a port that is not a number.
    #[error("bad port in address '{0}'")]
    BadPort(String),
}

impl FromStr for QmpAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let parts: Vec<&str> = s.split(':').collect();
        if let [host, port] = parts.as_slice() {
            let port = port.parse().map_err(|_| AddressError::BadPort(s.to_string()))?;
            return Ok(Self::Tcp { host: (*host).to_string(), port });
        }

        Ok(Self::Unix(PathBuf::from(s)))
    }
}

impl fmt::Display for QmpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn any_port_parses(host in "[a-z][a-z0-9.-]{0,20}", port: u16) {
            let address: QmpAddress = format!("{host}:{port}").parse().unwrap();
            prop_assert_eq!(address, QmpAddress::Tcp { host, port });
        }

        #[test]
        fn parse_never_panics(s in "\\PC*") {
            let _ = s.parse::<QmpAddress>();
        }
    }

    #[test]
    fn host_port_is_tcp() {
        let address: QmpAddress = "localhost:4444".parse().unwrap();
        assert_eq!(address, QmpAddress::Tcp { host: "localhost".to_string(), port: 4444 });
        assert_eq!(address.to_string(), "localhost:4444");
    }

    #[test]
    fn bad_port_is_rejected() {
        assert_eq!(
            "localhost:qmp".parse::<QmpAddress>(),
            Err(AddressError::BadPort("localhost:qmp".to_string()))
        );
        assert!(matches!("host:70000".parse::<QmpAddress>(), Err(AddressError::BadPort(_))));
    }

    #[test]
    fn anything_else_is_a_socket_path() {
        assert_eq!(
            "/tmp/qmp.sock".parse::<QmpAddress>().unwrap(),
            QmpAddress::Unix(PathBuf::from("/tmp/qmp.sock"))
        );
        // More than one colon is not host:port.
        assert!(matches!("a:b:c".parse::<QmpAddress>().unwrap(), QmpAddress::Unix(_)));
        assert_eq!("".parse::<QmpAddress>(), Err(AddressError::Empty));
    }
}
