//! Asynchronous events emitted by the target.
//!
//! Two event names drive the fault injection session: `FAULT_EVENT` fires
//! when an armed trigger expires, `SHUTDOWN` ends the run. Everything else is
//! passed through for diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::{ProtocolError, Result};

/// Name of the fault trigger event.
pub const FAULT_EVENT: &str = "FAULT_EVENT";
/// Name of the termination event.
pub const SHUTDOWN: &str = "SHUTDOWN";

/// Host wall-clock time at which the target emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the epoch
    pub seconds: i64,
    /// Sub-second part
    pub microseconds: i64,
}

/// A named occurrence with a data payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    pub event: String,
    /// Event payload; `null` when the target sent none
    #[serde(default)]
    pub data: Value,
    /// Emission time, if the target attached one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// Payload of a `FAULT_EVENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEventData {
    /// Identifier passed to `trigger_event`
    pub event_id: u64,
    /// Target virtual time at which the trigger fired
    pub time_ns: u64,
}

/// Classification of an event for the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Armed trigger expired
    FaultTrigger(FaultEventData),
    /// Target is going away
    Shutdown,
    /// Any other event name
    Other,
}

impl Event {
    /// Event with the given name and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data, timestamp: None }
    }

    /// `FAULT_EVENT {event_id, time_ns}`
    pub fn fault(event_id: u64, time_ns: u64) -> Self {
        Self::new(FAULT_EVENT, json!({ "event_id": event_id, "time_ns": time_ns }))
    }

    /// `SHUTDOWN {}`
    pub fn shutdown() -> Self {
        Self::new(SHUTDOWN, json!({}))
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.event
    }

    /// Classify the event, decoding the payload of load-bearing events.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedEvent` if a `FAULT_EVENT` lacks a
    ///   non-negative integer `event_id` or `time_ns`
    pub fn kind(&self) -> Result<EventKind> {
        match self.event.as_str() {
            FAULT_EVENT => {
                let data = FaultEventData::deserialize(&self.data).map_err(|e| {
                    ProtocolError::MalformedEvent { event: self.event.clone(), reason: e.to_string() }
                })?;
                Ok(EventKind::FaultTrigger(data))
            },
            SHUTDOWN => Ok(EventKind::Shutdown),
            _ => Ok(EventKind::Other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_event_decodes_payload() {
        let event = Event::fault(2, 5000);
        assert_eq!(
            event.kind().unwrap(),
            EventKind::FaultTrigger(FaultEventData { event_id: 2, time_ns: 5000 })
        );
    }

    #[test]
    fn shutdown_needs_no_payload() {
        let event: Event = serde_json::from_str(r#"{"event": "SHUTDOWN"}"#).unwrap();
        assert_eq!(event.data, Value::Null);
        assert_eq!(event.kind().unwrap(), EventKind::Shutdown);
    }

    #[test]
    fn unknown_names_pass_through() {
        let event = Event::new("STOP", json!({}));
        assert_eq!(event.kind().unwrap(), EventKind::Other);
    }

    #[test]
    fn fault_event_without_time_is_malformed() {
        let event = Event::new(FAULT_EVENT, json!({ "event_id": 1 }));
        assert!(matches!(event.kind(), Err(ProtocolError::MalformedEvent { .. })));
    }

    #[test]
    fn negative_event_id_is_malformed() {
        let event = Event::new(FAULT_EVENT, json!({ "event_id": -1, "time_ns": 10 }));
        assert!(event.kind().is_err());
    }

    #[test]
    fn timestamp_is_preserved() {
        let line = r#"{"event":"STOP","data":{},"timestamp":{"seconds":1700000000,"microseconds":12}}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(event.timestamp, Some(Timestamp { seconds: 1_700_000_000, microseconds: 12 }));
    }
}
