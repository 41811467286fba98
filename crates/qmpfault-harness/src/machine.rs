//! Simulated machine with a fault trigger timer.
//!
//! Models the target side of the fault injection commands: a virtual clock
//! that only moves while the machine runs, triggers armed relative to the
//! current virtual time, byte-addressed memory shared by all CPUs, QOM
//! properties and GPIO input lines.
//!
//! Running is instantaneous: `cont` jumps the clock to the earliest armed
//! trigger, queues a `FAULT_EVENT` for every trigger due at that time and
//! stops the machine again. With no trigger left before the configured end
//! time, the clock jumps to the end and `SHUTDOWN` is queued.

use std::collections::{BTreeMap, HashMap, VecDeque};

use qmpfault_core::MAX_ACCESS_SIZE;
use qmpfault_proto::{Command, Event, QmpError, Response, command};
use serde_json::{Value, json};

/// Error class the target uses for most rejected commands.
pub const GENERIC_ERROR: &str = "GenericError";

/// Error class for commands the target does not know.
pub const COMMAND_NOT_FOUND: &str = "CommandNotFound";

/// Armed fault trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTrigger {
    /// Absolute virtual deadline
    pub deadline_ns: u64,
    /// Id echoed back in the fault event
    pub event_id: u64,
}

/// Level change on a GPIO input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioChange {
    /// Virtual time of the change
    pub time_ns: u64,
    /// Device path
    pub device: String,
    /// Named GPIO, `None` for the default input
    pub gpio: Option<String>,
    /// Line number
    pub line: u64,
    /// New level
    pub level: bool,
}

/// Target state.
#[derive(Debug, Clone)]
pub struct SimMachine {
    now_ns: u64,
    end_ns: Option<u64>,
    shut_down: bool,
    cpu_paths: Vec<String>,
    pending: Vec<PendingTrigger>,
    events: VecDeque<Event>,
    memory: BTreeMap<u64, u8>,
    properties: HashMap<(String, String), Value>,
    devices: Vec<String>,
    gpio_log: Vec<GpioChange>,
    commands: Vec<Command>,
}

impl Default for SimMachine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SimMachine {
    /// Machine with `cpus` CPUs at `/machine/cpu[N]`.
    pub fn new(cpus: usize) -> Self {
        Self {
            now_ns: 0,
            end_ns: None,
            shut_down: false,
            cpu_paths: (0..cpus).map(|i| format!("/machine/cpu[{i}]")).collect(),
            pending: Vec::new(),
            events: VecDeque::new(),
            memory: BTreeMap::new(),
            properties: HashMap::new(),
            devices: Vec::new(),
            gpio_log: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Shut down once the clock reaches `end_ns` instead of as soon as no
    /// trigger is armed.
    #[must_use]
    pub fn with_end_time(mut self, end_ns: u64) -> Self {
        self.end_ns = Some(end_ns);
        self
    }

    /// Add a device accepting GPIO injection.
    #[must_use]
    pub fn with_device(mut self, path: &str) -> Self {
        self.devices.push(path.to_string());
        self
    }

    /// Add a QOM property. Its object becomes a known device.
    #[must_use]
    pub fn with_property(mut self, path: &str, property: &str, value: Value) -> Self {
        if !self.devices.iter().any(|d| d == path) {
            self.devices.push(path.to_string());
        }
        self.properties.insert((path.to_string(), property.to_string()), value);
        self
    }

    /// Current virtual time.
    pub fn now_ns(&self) -> u64 {
        self.now_ns
    }

    /// Whether `SHUTDOWN` has been emitted.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Triggers not fired yet.
    pub fn pending(&self) -> &[PendingTrigger] {
        &self.pending
    }

    /// Every command received, in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of received commands named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.commands.iter().filter(|c| c.name() == name).count()
    }

    /// Little-endian value of `size` bytes at `address`. Unwritten bytes read
    /// as zero. `size` is capped at [`MAX_ACCESS_SIZE`].
    pub fn peek(&self, address: u64, size: u32) -> u64 {
        (0..u64::from(size.min(MAX_ACCESS_SIZE))).fold(0u64, |acc, i| {
            let byte = self.memory.get(&address.wrapping_add(i)).copied().unwrap_or(0);
            acc | (u64::from(byte) << (8 * i))
        })
    }

    /// Store `size` little-endian bytes of `value` at `address`. `size` is
    /// capped at [`MAX_ACCESS_SIZE`].
    pub fn poke(&mut self, address: u64, value: u64, size: u32) {
        for i in 0..u64::from(size.min(MAX_ACCESS_SIZE)) {
            self.memory.insert(address.wrapping_add(i), (value >> (8 * i)) as u8);
        }
    }

    /// Current value of a QOM property.
    pub fn property(&self, path: &str, property: &str) -> Option<&Value> {
        self.properties.get(&(path.to_string(), property.to_string()))
    }

    /// GPIO level changes, in order.
    pub fn gpio_log(&self) -> &[GpioChange] {
        &self.gpio_log
    }

    /// Queue an event as if the target emitted it.
    pub fn emit(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Take all queued events.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Whether any event is queued.
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Execute one command.
    pub fn handle(&mut self, command: &Command) -> Response {
        self.commands.push(command.clone());

        let result = match command.name() {
            command::QMP_CAPABILITIES => Ok(json!({})),
            command::CONT => {
                self.run();
                Ok(json!({}))
            },
            command::TRIGGER_EVENT => self.trigger_event(command),
            command::WRITE_MEM => self.write_mem(command),
            command::READ_MEM => self.read_mem(command),
            command::QOM_GET => self.qom_get(command),
            command::QOM_SET => self.qom_set(command),
            command::INJECT_GPIO => self.inject_gpio(command),
            other => Err(QmpError {
                class: COMMAND_NOT_FOUND.to_string(),
                desc: format!("The command {other} has not been found"),
            }),
        };

        match result {
            Ok(value) => Response::Return(value),
            Err(err) => Response::Error(err),
        }
    }

    fn run(&mut self) {
        if self.shut_down {
            return;
        }

        let next = self.pending.iter().map(|t| t.deadline_ns).min();
        match next {
            Some(deadline) if self.end_ns.is_none_or(|end| deadline <= end) => {
                self.now_ns = self.now_ns.max(deadline);
                let now = self.now_ns;
                let (due, rest): (Vec<_>, Vec<_>) =
                    std::mem::take(&mut self.pending).into_iter().partition(|t| t.deadline_ns <= now);
                self.pending = rest;
                for trigger in due {
                    tracing::debug!(event_id = trigger.event_id, time_ns = self.now_ns, "fault due");
                    self.events.push_back(Event::fault(trigger.event_id, self.now_ns));
                }
            },
            _ => {
                self.now_ns = self.end_ns.unwrap_or(self.now_ns).max(self.now_ns);
                self.shut_down = true;
                self.events.push_back(Event::shutdown());
            },
        }
    }

    fn trigger_event(&mut self, command: &Command) -> Result<Value, QmpError> {
        let event_id = uint_arg(command, "event_id")?;
        let time_ns = uint_arg(command, "time_ns")?;
        self.pending
            .push(PendingTrigger { deadline_ns: self.now_ns.saturating_add(time_ns), event_id });
        Ok(json!({}))
    }

    fn write_mem(&mut self, command: &Command) -> Result<Value, QmpError> {
        self.resolve_cpu(command)?;
        let address = uint_arg(command, "addr")?;
        let value = uint_arg(command, "val")?;
        let size = size_arg(command)?;
        self.poke(address, value, size);
        Ok(json!({}))
    }

    fn read_mem(&mut self, command: &Command) -> Result<Value, QmpError> {
        self.resolve_cpu(command)?;
        let address = uint_arg(command, "addr")?;
        let size = size_arg(command)?;
        Ok(json!({ "value": self.peek(address, size) }))
    }

    fn qom_get(&mut self, command: &Command) -> Result<Value, QmpError> {
        let path = str_arg(command, "path")?;
        let property = str_arg(command, "property")?;
        self.property(path, property)
            .cloned()
            .ok_or_else(|| generic(format!("Property '{property}' not found")))
    }

    fn qom_set(&mut self, command: &Command) -> Result<Value, QmpError> {
        let path = str_arg(command, "path")?;
        let property = str_arg(command, "property")?;
        let value = command.argument("value").cloned().unwrap_or(Value::Null);
        let key = (path.to_string(), property.to_string());
        match self.properties.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                Ok(json!({}))
            },
            None => Err(generic(format!("Property '{property}' not found"))),
        }
    }

    fn inject_gpio(&mut self, command: &Command) -> Result<Value, QmpError> {
        let device = str_arg(command, "device_name")?;
        if !self.devices.iter().any(|d| d == device) {
            return Err(generic(format!("Device '{device}' is not a device")));
        }
        let gpio = match command.argument("gpio") {
            Some(Value::String(name)) => Some(name.clone()),
            Some(_) => return Err(generic("Invalid parameter type for 'gpio'".to_string())),
            None => None,
        };
        let line = uint_arg(command, "num")?;
        let level = uint_arg(command, "val")? != 0;
        self.gpio_log.push(GpioChange {
            time_ns: self.now_ns,
            device: device.to_string(),
            gpio,
            line,
            level,
        });
        Ok(json!({}))
    }

    fn resolve_cpu(&self, command: &Command) -> Result<usize, QmpError> {
        if let Some(path) = command.argument("qom") {
            let path = path.as_str().unwrap_or_default();
            return self
                .cpu_paths
                .iter()
                .position(|p| p == path)
                .ok_or_else(|| generic(format!("'{path}' is not a CPU or doesn't exists")));
        }

        let index = match command.argument("cpu") {
            Some(_) => uint_arg(command, "cpu")?,
            None => 0,
        };
        usize::try_from(index)
            .ok()
            .filter(|i| *i < self.cpu_paths.len())
            .ok_or_else(|| generic(format!("CPU {index} doesn't exist")))
    }
}

fn generic(desc: String) -> QmpError {
    QmpError { class: GENERIC_ERROR.to_string(), desc }
}

fn uint_arg(command: &Command, key: &str) -> Result<u64, QmpError> {
    command
        .argument(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| generic(format!("Parameter '{key}' is missing or not an integer")))
}

fn str_arg<'a>(command: &'a Command, key: &str) -> Result<&'a str, QmpError> {
    command
        .argument(key)
        .and_then(Value::as_str)
        .ok_or_else(|| generic(format!("Parameter '{key}' is missing or not a string")))
}

fn size_arg(command: &Command) -> Result<u32, QmpError> {
    let size = uint_arg(command, "size")?;
    u32::try_from(size)
        .ok()
        .filter(|s| (1..=MAX_ACCESS_SIZE).contains(s))
        .ok_or_else(|| generic(format!("Invalid access size {size}")))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use qmpfault_proto::{CpuSelector, EventKind};

    use super::*;

    #[test]
    fn cont_without_triggers_shuts_down() {
        let mut machine = SimMachine::new(1);
        machine.handle(&Command::resume());
        let events = machine.take_events();
        assert_eq!(events, vec![Event::shutdown()]);
        assert!(machine.is_shut_down());
    }

    #[test]
    fn triggers_are_relative_to_current_time() {
        let mut machine = SimMachine::new(1);
        machine.handle(&Command::trigger_event(0, 1000));
        machine.handle(&Command::resume());
        assert_eq!(machine.take_events(), vec![Event::fault(0, 1000)]);

        machine.handle(&Command::trigger_event(0, 500));
        assert_eq!(machine.pending()[0].deadline_ns, 1500);
        machine.handle(&Command::resume());
        assert_eq!(machine.take_events(), vec![Event::fault(0, 1500)]);
    }

    #[test]
    fn triggers_due_together_fire_in_one_stop() {
        let mut machine = SimMachine::new(1);
        machine.handle(&Command::trigger_event(0, 100));
        machine.handle(&Command::trigger_event(1, 100));
        machine.handle(&Command::trigger_event(2, 300));
        machine.handle(&Command::resume());

        let ids: Vec<u64> = machine
            .take_events()
            .iter()
            .filter_map(|e| match e.kind().unwrap() {
                EventKind::FaultTrigger(f) => Some(f.event_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(machine.pending().len(), 1);
    }

    #[test]
    fn end_time_bounds_the_run() {
        let mut machine = SimMachine::new(1).with_end_time(200);
        machine.handle(&Command::trigger_event(0, 1000));
        machine.handle(&Command::resume());
        assert_eq!(machine.take_events(), vec![Event::shutdown()]);
        assert_eq!(machine.now_ns(), 200);
    }

    #[test]
    fn memory_is_shared_and_little_endian() {
        let mut machine = SimMachine::new(2);
        machine.handle(&Command::write_memory(0x1000, 0x1122_3344, 4, &CpuSelector::Index(1), false));
        let response =
            machine.handle(&Command::read_memory(0x1001, 2, &CpuSelector::from("/machine/cpu[0]")));
        assert_eq!(response, Response::Return(json!({ "value": 0x2233 })));
    }

    #[test]
    fn wide_access_is_capped_at_one_word() {
        let mut machine = SimMachine::new(1);
        machine.poke(0x2000, u64::MAX, 16);
        assert_eq!(machine.peek(0x2000, 16), u64::MAX);
        assert_eq!(machine.peek(0x2008, 8), 0);
    }

    #[test]
    fn unknown_cpu_path_is_rejected() {
        let mut machine = SimMachine::new(1);
        let response =
            machine.handle(&Command::read_memory(0, 4, &CpuSelector::from("/machine/uart0")));
        let Response::Error(err) = response else { panic!("expected error") };
        assert_eq!(err.desc, "'/machine/uart0' is not a CPU or doesn't exists");
    }

    #[test]
    fn gpio_requires_known_device() {
        let mut machine = SimMachine::new(1).with_device("/machine/gpio0");
        assert!(matches!(
            machine.handle(&Command::inject_gpio("/machine/gpio1", "", 0, true)),
            Response::Error(_)
        ));
        machine.handle(&Command::inject_gpio("/machine/gpio0", "", 3, true));
        assert_eq!(machine.gpio_log()[0].gpio, None);
        assert_eq!(machine.gpio_log()[0].line, 3);
        assert!(machine.gpio_log()[0].level);
    }

    #[test]
    fn unknown_command_is_not_found() {
        let mut machine = SimMachine::new(1);
        let Response::Error(err) = machine.handle(&Command::new("human-monitor-command")) else {
            panic!("expected error")
        };
        assert_eq!(err.class, COMMAND_NOT_FOUND);
    }

    proptest! {
        #[test]
        fn triggers_fire_once_in_deadline_order(deadlines in prop::collection::vec(0u64..10_000, 0..20)) {
            let mut machine = SimMachine::new(1);
            for (id, at) in deadlines.iter().enumerate() {
                machine.handle(&Command::trigger_event(id as u64, *at));
            }

            let mut fired = Vec::new();
            while !machine.is_shut_down() {
                machine.handle(&Command::resume());
                for event in machine.take_events() {
                    if let EventKind::FaultTrigger(data) = event.kind().unwrap() {
                        fired.push((data.event_id, data.time_ns));
                    }
                }
            }

            prop_assert_eq!(fired.len(), deadlines.len());
            prop_assert!(fired.windows(2).all(|w| w[0].1 <= w[1].1));
            for (id, time_ns) in fired {
                prop_assert_eq!(time_ns, deadlines[id as usize]);
            }
        }
    }
}
