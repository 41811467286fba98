//! Fault injection session.
//!
//! [`Session`] is the command facade and the dispatch loop executor. Facade
//! operations may be called at any time: before [`Session::run`], or from a
//! callback while the loop is running. Callbacks receive the session by
//! mutable reference, so their commands complete before the loop polls again.

use std::{collections::VecDeque, fmt};

use qmpfault_proto::{Command, CpuSelector, Event, command};
use serde_json::Value;

use crate::{
    callback::Callback,
    config::SessionConfig,
    dispatch::{DispatchAction, Dispatcher, LoopState},
    error::SessionError,
    registry::CallbackRegistry,
    transport::Transport,
};

/// Largest access the target's memory commands carry (one 64-bit value).
pub const MAX_ACCESS_SIZE: u32 = 8;

/// Callback run by a session when its fault fires.
pub type SessionCallback<T> = Callback<Session<T>>;

/// Fault injection session over a transport.
///
/// Owns the transport, the simulated clock (through the [`Dispatcher`]), and
/// the callback registry. Single-threaded: callbacks run on the loop's thread
/// of control.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    dispatcher: Dispatcher,
    registry: CallbackRegistry<Session<T>>,
    closed: bool,
}

impl<T: Transport> Session<T> {
    /// Wrap an already negotiated transport.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let dispatcher = Dispatcher::new(config.clock_policy);
        Self { transport, config, dispatcher, registry: CallbackRegistry::new(), closed: false }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Last simulated time reported by the target.
    pub fn now_ns(&self) -> u64 {
        self.dispatcher.now_ns()
    }

    /// Dispatch loop state.
    pub fn state(&self) -> LoopState {
        self.dispatcher.state()
    }

    /// Whether the channel has been released.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of callbacks registered so far.
    pub fn registered_callbacks(&self) -> usize {
        self.registry.len()
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resume execution of the target.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        self.send(Command::resume())?;
        Ok(())
    }

    /// Arm a fault trigger `at_time_ns` from now on the target's clock.
    ///
    /// Registers `callback` (reusing its id if already registered) and
    /// returns the event id handed to the target.
    pub fn schedule_trigger(
        &mut self,
        at_time_ns: u64,
        callback: &SessionCallback<T>,
    ) -> Result<u64, SessionError> {
        let event_id = self.registry.register(callback);
        self.log_action(format_args!("Notify {} in {at_time_ns}ns", callback.name()));
        self.send(Command::trigger_event(event_id, at_time_ns))?;
        Ok(event_id)
    }

    /// Write `value` (`size` bytes) at `address` as seen by `cpu`.
    ///
    /// `debug` issues the transaction with debug attributes.
    pub fn write_memory(
        &mut self,
        address: u64,
        value: u64,
        size: u32,
        cpu: impl Into<CpuSelector>,
        debug: bool,
    ) -> Result<(), SessionError> {
        let cpu = cpu.into();
        check_access_size(size)?;
        self.log_action(format_args!(
            "write: {value:#010x} @{address:#010x} size {size} from cpu {cpu}"
        ));
        self.send(Command::write_memory(address, value, size, &cpu, debug))?;
        Ok(())
    }

    /// Read `size` bytes at `address` as seen by `cpu`.
    ///
    /// # Errors
    ///
    /// - `SessionError::MissingResult` if the response has no `value`
    pub fn read_memory(
        &mut self,
        address: u64,
        size: u32,
        cpu: impl Into<CpuSelector>,
    ) -> Result<u64, SessionError> {
        let cpu = cpu.into();
        check_access_size(size)?;
        self.log_action(format_args!("read value: @{address:#010X} size {size} from cpu {cpu}"));
        let result = self.send(Command::read_memory(address, size, &cpu))?;
        result.get("value").and_then(Value::as_u64).ok_or_else(|| SessionError::MissingResult {
            command: command::READ_MEM.to_string(),
            field: "value",
        })
    }

    /// Read QOM property `property` of the object at `path`.
    pub fn get_property(&mut self, path: &str, property: &str) -> Result<Value, SessionError> {
        self.send(Command::qom_get(path, property))
    }

    /// Set QOM property `property` of the object at `path`.
    pub fn set_property(
        &mut self,
        path: &str,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<(), SessionError> {
        self.send(Command::qom_set(path, property, value.into()))?;
        Ok(())
    }

    /// Drive GPIO input `line` of `signal` on `device` to `value`.
    ///
    /// An empty `signal` selects the device's unnamed GPIO input.
    pub fn set_signal(
        &mut self,
        device: &str,
        signal: &str,
        line: u32,
        value: bool,
    ) -> Result<(), SessionError> {
        self.log_action(format_args!("gpio: {device} {signal}[{line}] = {value}"));
        self.send(Command::inject_gpio(device, signal, line, value))?;
        Ok(())
    }

    /// Run the dispatch loop until the target shuts down.
    ///
    /// Resumes the target, then for each polled batch of events advances the
    /// clock, runs fault callbacks and resumes again. Events that arrive while
    /// callbacks issue commands join the current batch. The channel is
    /// released when the loop ends, on success or error.
    ///
    /// # Errors
    ///
    /// - `SessionError::AlreadyRunning` if called from within a callback
    /// - `SessionError::Closed` if the session already ended
    /// - Any transport, protocol, or callback error; the loop does not retry
    pub fn run(&mut self) -> Result<(), SessionError> {
        let actions = self.dispatcher.start()?;
        let result = self.run_loop(actions);
        self.close();
        result
    }

    /// Release the channel. No operation is valid afterwards.
    pub fn close(&mut self) {
        if !self.closed {
            self.transport.close();
            self.closed = true;
        }
    }

    fn run_loop(&mut self, start: Vec<DispatchAction>) -> Result<(), SessionError> {
        self.log_action(format_args!("Simulation is now running"));
        self.execute(start)?;

        while !self.dispatcher.is_stopped() {
            let mut batch: VecDeque<Event> = self.poll(true)?.into();

            while let Some(event) = batch.pop_front() {
                if self.config.logs_traffic() {
                    tracing::debug!(event = %event.event, data = %event.data, "event");
                }

                let actions = self.dispatcher.handle_event(&event)?;
                self.execute(actions)?;

                if batch.is_empty() && !self.dispatcher.is_stopped() {
                    batch.extend(self.poll(false)?);
                }
            }

            self.transport.clear_events();
        }

        Ok(())
    }

    fn execute(&mut self, actions: Vec<DispatchAction>) -> Result<(), SessionError> {
        for action in actions {
            match action {
                DispatchAction::Resume => self.resume()?,
                DispatchAction::Invoke { event_id, time_ns } => {
                    let callback = self.registry.get(event_id)?;
                    tracing::debug!(event_id, time_ns, callback = callback.name(), "fault fired");
                    callback.invoke(self)?;
                },
                DispatchAction::Stop => self.log_action(format_args!("Simulation stopped")),
            }
        }
        Ok(())
    }

    fn poll(&mut self, blocking: bool) -> Result<Vec<Event>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(self.transport.poll_events(blocking)?)
    }

    /// Submit one command and return its result payload.
    fn send(&mut self, command: Command) -> Result<Value, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }

        if self.config.logs_traffic() {
            let arguments = Value::Object(command.arguments.clone());
            tracing::debug!(execute = %command.execute, arguments = %arguments, "command");
        }

        let response = self
            .transport
            .send(&command)?
            .ok_or_else(|| SessionError::ChannelClosed { command: command.execute.clone() })?;

        if self.config.logs_traffic() {
            tracing::debug!(execute = %command.execute, response = %response.to_value(), "response");
        }

        response.into_result().map_err(|err| SessionError::CommandFailed {
            command: command.execute,
            class: err.class,
            desc: err.desc,
        })
    }

    fn log_action(&self, message: fmt::Arguments<'_>) {
        if self.config.logs_actions() {
            tracing::info!(sim_time_ns = self.now_ns(), "{}ns: {}", self.now_ns(), message);
        }
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("registered_callbacks", &self.registry.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn check_access_size(size: u32) -> Result<(), SessionError> {
    if size == 0 || size > MAX_ACCESS_SIZE {
        return Err(SessionError::InvalidArgument(format!(
            "access size {size} outside 1..={MAX_ACCESS_SIZE} bytes"
        )));
    }
    Ok(())
}
