//! Declarative fault scenarios.
//!
//! A scenario is a JSON document listing faults. Each fault fires at a time
//! relative to the target's clock when the scenario is installed, optionally
//! repeats, and runs a list of actions against the target:
//!
//! ```json
//! {
//!   "faults": [
//!     {
//!       "at_ns": 1000000,
//!       "repeat_every_ns": 500000,
//!       "actions": [
//!         { "op": "write_memory", "address": "0x40001000", "value": 1, "size": 4 },
//!         { "op": "set_signal", "device": "/machine/gpio0", "line": 3, "value": true }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::{fs, io, path::Path};

use qmpfault_core::{
    CpuSelector, MAX_ACCESS_SIZE, Session, SessionCallback, SessionError, Transport,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Scenario could not be loaded.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File could not be read.
    #[error("could not read scenario {path}: {source}")]
    Io {
        /// Scenario path
        path: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Document is not a valid scenario.
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    /// Document parsed but describes something the target cannot do.
    #[error("fault {fault}: {reason}")]
    Invalid {
        /// Index of the offending fault
        fault: usize,
        /// What is wrong with it
        reason: String,
    },
}

/// Faults to inject.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Faults, scheduled in order
    pub faults: Vec<Fault>,
}

/// One scheduled fault.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fault {
    /// Label used in logs; defaults to `fault-<index>`
    #[serde(default)]
    pub name: Option<String>,
    /// Delay from installation, in target nanoseconds
    pub at_ns: u64,
    /// Re-arm this far after every firing
    #[serde(default)]
    pub repeat_every_ns: Option<u64>,
    /// Actions run in order when the fault fires
    pub actions: Vec<Action>,
}

/// Operation run when a fault fires.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Action {
    /// Write guest memory.
    WriteMemory {
        /// Guest address
        address: Word,
        /// Value to write
        value: Word,
        /// Access width in bytes
        size: u32,
        /// CPU whose view of memory is used
        #[serde(default = "default_cpu")]
        cpu: CpuSelector,
        /// Issue the write with debug attributes
        #[serde(default)]
        debug: bool,
    },
    /// Read guest memory and log the value.
    ReadMemory {
        /// Guest address
        address: Word,
        /// Access width in bytes
        size: u32,
        /// CPU whose view of memory is used
        #[serde(default = "default_cpu")]
        cpu: CpuSelector,
    },
    /// Set a QOM property.
    SetProperty {
        /// QOM object path
        path: String,
        /// Property name
        property: String,
        /// New value
        value: Value,
    },
    /// Read a QOM property and log the value.
    GetProperty {
        /// QOM object path
        path: String,
        /// Property name
        property: String,
    },
    /// Drive a GPIO input.
    SetSignal {
        /// QOM path of the device
        device: String,
        /// Named GPIO; empty for the unnamed input
        #[serde(default)]
        signal: String,
        /// Line number
        line: u32,
        /// Level
        value: bool,
    },
}

fn default_cpu() -> CpuSelector {
    CpuSelector::Index(0)
}

/// 64-bit word written as a JSON integer, a `0x` hex string or a decimal
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WordRepr")]
pub struct Word(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum WordRepr {
    Int(u64),
    Text(String),
}

impl TryFrom<WordRepr> for Word {
    type Error = String;

    fn try_from(repr: WordRepr) -> Result<Self, Self::Error> {
        match repr {
            WordRepr::Int(n) => Ok(Self(n)),
            WordRepr::Text(text) => parse_word(&text)
                .map(Self)
                .ok_or_else(|| format!("'{text}' is not a 64-bit integer")),
        }
    }
}

fn parse_word(text: &str) -> Option<u64> {
    let text = text.trim().replace('_', "");
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl Scenario {
    /// Parse and validate a scenario document.
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Read, parse and validate a scenario file.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ScenarioError::Io { path: path.display().to_string(), source })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        for (index, fault) in self.faults.iter().enumerate() {
            let invalid = |reason: String| ScenarioError::Invalid { fault: index, reason };

            if fault.repeat_every_ns == Some(0) {
                return Err(invalid("repeat_every_ns must be positive".to_string()));
            }
            for action in &fault.actions {
                if let Action::WriteMemory { size, .. } | Action::ReadMemory { size, .. } = action
                    && !(1..=MAX_ACCESS_SIZE).contains(size)
                {
                    return Err(invalid(format!(
                        "access size {size} outside 1..={MAX_ACCESS_SIZE} bytes"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Schedule every fault on `session`. Returns the event ids in fault
    /// order.
    pub fn install<T: Transport + 'static>(
        &self,
        session: &mut Session<T>,
    ) -> Result<Vec<u64>, SessionError> {
        self.faults
            .iter()
            .enumerate()
            .map(|(index, fault)| {
                let callback = fault.callback(index);
                session.schedule_trigger(fault.at_ns, &callback)
            })
            .collect()
    }
}

impl Fault {
    /// Build the session callback that runs this fault.
    ///
    /// A repeating fault re-arms itself with the same callback, so it keeps
    /// its event id for the whole run.
    pub fn callback<T: Transport + 'static>(&self, index: usize) -> SessionCallback<T> {
        let name = self.name.clone().unwrap_or_else(|| format!("fault-{index}"));
        let actions = self.actions.clone();
        let repeat = self.repeat_every_ns;

        SessionCallback::new_cyclic(&name, move |me| {
            move |session: &mut Session<T>| {
                for action in &actions {
                    action.apply(session)?;
                }
                if let Some(period) = repeat
                    && let Some(me) = me.upgrade()
                {
                    session.schedule_trigger(period, &me)?;
                }
                Ok(())
            }
        })
    }
}

impl Action {
    /// Run this action against `session`.
    pub fn apply<T: Transport>(&self, session: &mut Session<T>) -> Result<(), SessionError> {
        match self {
            Self::WriteMemory { address, value, size, cpu, debug } => {
                session.write_memory(address.0, value.0, *size, cpu.clone(), *debug)
            },
            Self::ReadMemory { address, size, cpu } => {
                let value = session.read_memory(address.0, *size, cpu.clone())?;
                tracing::info!(
                    time_ns = session.now_ns(),
                    "read {value:#x} @{:#010x} from cpu {cpu}",
                    address.0
                );
                Ok(())
            },
            Self::SetProperty { path, property, value } => {
                session.set_property(path, property, value.clone())
            },
            Self::GetProperty { path, property } => {
                let value = session.get_property(path, property)?;
                tracing::info!(time_ns = session.now_ns(), "{path}.{property} = {value}");
                Ok(())
            },
            Self::SetSignal { device, signal, line, value } => {
                session.set_signal(device, signal, *line, *value)
            },
        }
    }
}
