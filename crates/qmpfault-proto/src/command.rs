//! Commands sent to the target.
//!
//! Each constructor builds exactly one QMP command with the argument keys the
//! fault injection extension of the target expects. Commands are stateless and
//! built per call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CpuSelector, errors::Result};

/// Capabilities negotiation, sent once after the greeting.
pub const QMP_CAPABILITIES: &str = "qmp_capabilities";
/// Resume guest execution.
pub const CONT: &str = "cont";
/// Arm a fault trigger on the target's virtual clock.
pub const TRIGGER_EVENT: &str = "trigger_event";
/// Write guest memory through a CPU's address space.
pub const WRITE_MEM: &str = "write_mem";
/// Read guest memory through a CPU's address space.
pub const READ_MEM: &str = "read_mem";
/// Read a QOM property.
pub const QOM_GET: &str = "qom-get";
/// Write a QOM property.
pub const QOM_SET: &str = "qom-set";
/// Drive a device GPIO input line.
pub const INJECT_GPIO: &str = "inject_gpio";

/// A named operation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command name
    pub execute: String,
    /// Argument name to value
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl Command {
    /// Command with no arguments.
    pub fn new(execute: impl Into<String>) -> Self {
        Self { execute: execute.into(), arguments: Map::new() }
    }

    /// Add an argument.
    #[must_use]
    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    /// Command name.
    pub fn name(&self) -> &str {
        &self.execute
    }

    /// Argument value by key. `None` if the argument is absent.
    pub fn argument(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }

    /// `qmp_capabilities {}`
    pub fn capabilities() -> Self {
        Self::new(QMP_CAPABILITIES)
    }

    /// `cont {}`
    pub fn resume() -> Self {
        Self::new(CONT)
    }

    /// `trigger_event {event_id, time_ns}`
    pub fn trigger_event(event_id: u64, time_ns: u64) -> Self {
        Self::new(TRIGGER_EVENT).arg("event_id", event_id).arg("time_ns", time_ns)
    }

    /// `write_mem {size, addr, val, cpu|qom, debug}`
    pub fn write_memory(
        address: u64,
        value: u64,
        size: u32,
        cpu: &CpuSelector,
        debug: bool,
    ) -> Self {
        Self::new(WRITE_MEM)
            .arg("size", size)
            .arg("addr", address)
            .arg("val", value)
            .arg(cpu.key(), cpu.to_value())
            .arg("debug", debug)
    }

    /// `read_mem {size, addr, cpu|qom}`
    pub fn read_memory(address: u64, size: u32, cpu: &CpuSelector) -> Self {
        Self::new(READ_MEM).arg("size", size).arg("addr", address).arg(cpu.key(), cpu.to_value())
    }

    /// `qom-get {path, property}`
    pub fn qom_get(path: &str, property: &str) -> Self {
        Self::new(QOM_GET).arg("path", path).arg("property", property)
    }

    /// `qom-set {path, property, value}`
    pub fn qom_set(path: &str, property: &str, value: Value) -> Self {
        Self::new(QOM_SET).arg("path", path).arg("property", property).arg("value", value)
    }

    /// `inject_gpio {device_name, [gpio], num, val}`
    ///
    /// An empty `gpio` selects the device's default (unnamed) input and the
    /// key is left out: the target distinguishes an absent name from an empty
    /// one. The line level is sent as `0`/`1`.
    pub fn inject_gpio(device_name: &str, gpio: &str, num: u32, value: bool) -> Self {
        let mut command = Self::new(INJECT_GPIO).arg("device_name", device_name);
        if !gpio.is_empty() {
            command = command.arg("gpio", gpio);
        }
        command.arg("num", num).arg("val", u8::from(value))
    }

    /// Serialize as one newline-terminated line.
    pub fn encode_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
