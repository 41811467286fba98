//! Messages received from the target.
//!
//! The target interleaves three kinds of lines on the same stream: the
//! one-time greeting, command responses, and asynchronous events. A response
//! always belongs to the single outstanding command; events may arrive at any
//! point, including between a command and its response.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    Event,
    errors::{ProtocolError, Result},
};

/// QEMU release reported in the greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QemuVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Micro version
    pub micro: u32,
}

impl fmt::Display for QemuVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Version block of the greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// QEMU release
    pub qemu: QemuVersion,
    /// Downstream package string
    #[serde(default)]
    pub package: String,
}

/// Body of the greeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetingBody {
    /// Target version
    pub version: VersionInfo,
    /// Capabilities offered for negotiation
    #[serde(default)]
    pub capabilities: Vec<Value>,
}

/// Greeting sent by the target as soon as a client connects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    /// Greeting body
    #[serde(rename = "QMP")]
    pub qmp: GreetingBody,
}

impl Greeting {
    /// QEMU release of the target.
    pub fn version(&self) -> QemuVersion {
        self.qmp.version.qemu
    }
}

/// Error reported by the target for a failed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QmpError {
    /// Error class (`GenericError`, `CommandNotFound`, ...)
    pub class: String,
    /// Human readable description
    pub desc: String,
}

impl fmt::Display for QmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.desc)
    }
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Success with the command's result payload
    Return(Value),
    /// Failure reported by the target
    Error(QmpError),
}

impl Response {
    /// Convert into a `Result`, keeping the success payload.
    pub fn into_result(self) -> std::result::Result<Value, QmpError> {
        match self {
            Self::Return(value) => Ok(value),
            Self::Error(err) => Err(err),
        }
    }

    /// Encode the way the target would send it.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        match self {
            Self::Return(value) => map.insert("return".to_string(), value.clone()),
            Self::Error(err) => map.insert(
                "error".to_string(),
                serde_json::to_value(err).unwrap_or(Value::Null),
            ),
        };
        Value::Object(map)
    }
}

/// Any line received from the target.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Connection greeting
    Greeting(Greeting),
    /// Response to the outstanding command
    Response(Response),
    /// Asynchronous notification
    Event(Event),
}

impl ServerMessage {
    /// Decode one line.
    ///
    /// Classification is by key: `return`, `error`, `event`, `QMP`. Extra
    /// keys (such as a command `id`) are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Json` if the line is not JSON or a known message has
    ///   the wrong shape
    /// - `ProtocolError::NotAnObject` if the line is not a JSON object
    /// - `ProtocolError::UnknownMessage` if no identifying key is present
    pub fn decode(line: &str) -> Result<Self> {
        let Value::Object(mut map) = serde_json::from_str::<Value>(line)? else {
            return Err(ProtocolError::NotAnObject);
        };

        if let Some(value) = map.remove("return") {
            return Ok(Self::Response(Response::Return(value)));
        }

        if let Some(error) = map.remove("error") {
            let error: QmpError = serde_json::from_value(error)?;
            return Ok(Self::Response(Response::Error(error)));
        }

        if map.contains_key("event") {
            let event: Event = serde_json::from_value(Value::Object(map))?;
            return Ok(Self::Event(event));
        }

        if map.contains_key("QMP") {
            let greeting: Greeting = serde_json::from_value(Value::Object(map))?;
            return Ok(Self::Greeting(greeting));
        }

        let keys = map.keys().cloned().collect::<Vec<_>>().join(", ");
        Err(ProtocolError::UnknownMessage { keys })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const GREETING: &str = r#"{"QMP": {"version": {"qemu": {"micro": 0, "minor": 1, "major": 9}, "package": "v9.1.0"}, "capabilities": ["oob"]}}"#;

    #[test]
    fn decodes_greeting() {
        let ServerMessage::Greeting(greeting) = ServerMessage::decode(GREETING).unwrap() else {
            panic!("expected greeting");
        };
        assert_eq!(greeting.version(), QemuVersion { major: 9, minor: 1, micro: 0 });
        assert_eq!(greeting.version().to_string(), "9.1.0");
    }

    #[test]
    fn decodes_return() {
        let message = ServerMessage::decode(r#"{"return": {"value": 42}, "id": 7}"#).unwrap();
        assert_eq!(message, ServerMessage::Response(Response::Return(json!({"value": 42}))));
    }

    #[test]
    fn decodes_error() {
        let line = r#"{"error": {"class": "GenericError", "desc": "'/x' is not a CPU or doesn't exists"}}"#;
        let ServerMessage::Response(response) = ServerMessage::decode(line).unwrap() else {
            panic!("expected response");
        };
        let err = response.into_result().unwrap_err();
        assert_eq!(err.class, "GenericError");
    }

    #[test]
    fn decodes_event() {
        let line = r#"{"event": "FAULT_EVENT", "data": {"event_id": 0, "time_ns": 1000}}"#;
        let message = ServerMessage::decode(line).unwrap();
        assert_eq!(message, ServerMessage::Event(Event::fault(0, 1000)));
    }

    #[test]
    fn rejects_non_object() {
        assert!(matches!(ServerMessage::decode("[1, 2]"), Err(ProtocolError::NotAnObject)));
    }

    #[test]
    fn rejects_unknown_object() {
        let err = ServerMessage::decode(r#"{"hello": 1}"#).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized message with keys [hello]");
    }

    #[test]
    fn rejects_truncated_line() {
        assert!(matches!(ServerMessage::decode(r#"{"return": "#), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn response_encoding_decodes_back() {
        let response = Response::Error(QmpError {
            class: "CommandNotFound".to_string(),
            desc: "The command read_mem has not been found".to_string(),
        });
        let line = response.to_value().to_string();
        assert_eq!(ServerMessage::decode(&line).unwrap(), ServerMessage::Response(response));
    }
}
