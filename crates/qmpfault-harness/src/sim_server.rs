//! Simulated machine served over a real socket.
//!
//! Speaks the QMP line protocol on one accepted connection: greeting first,
//! then one response per command line followed by whatever events the
//! command produced. Lets the blocking socket transport be tested end to end
//! without QEMU.

use std::{
    io::{self, BufRead, BufReader, Write},
    net::{SocketAddr, TcpListener},
    os::unix::net::UnixListener,
    path::Path,
    thread::{self, JoinHandle},
};

use qmpfault_proto::{Command, QmpError, Response};
use serde_json::json;

use crate::machine::{GENERIC_ERROR, SimMachine};

/// Greeting sent on connect.
pub fn greeting_line() -> String {
    json!({
        "QMP": {
            "version": { "qemu": { "major": 9, "minor": 1, "micro": 0 }, "package": "qmpfault-sim" },
            "capabilities": []
        }
    })
    .to_string()
}

/// Connection behavior knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeOptions {
    /// Write a command's events before its response instead of after.
    pub events_first: bool,
    /// Close the connection instead of answering the n-th command (0-based).
    pub hang_up_at: Option<usize>,
}

/// Background thread serving one connection.
#[derive(Debug)]
pub struct SimServer {
    address: String,
    handle: JoinHandle<io::Result<SimMachine>>,
}

impl SimServer {
    /// Serve `machine` on an ephemeral TCP port on localhost.
    pub fn spawn_tcp(machine: SimMachine, options: ServeOptions) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let local: SocketAddr = listener.local_addr()?;
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept()?;
            let reader = BufReader::new(stream.try_clone()?);
            serve(reader, stream, machine, options)
        });
        Ok(Self { address: local.to_string(), handle })
    }

    /// Serve `machine` on a Unix socket at `path`.
    pub fn spawn_unix(machine: SimMachine, path: &Path, options: ServeOptions) -> io::Result<Self> {
        let listener = UnixListener::bind(path)?;
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept()?;
            let reader = BufReader::new(stream.try_clone()?);
            serve(reader, stream, machine, options)
        });
        Ok(Self { address: path.display().to_string(), handle })
    }

    /// Address to connect to (`host:port` or socket path).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for the client to disconnect and return the final machine state.
    pub fn join(self) -> io::Result<SimMachine> {
        self.handle.join().map_err(|_| io::Error::other("simulated server thread panicked"))?
    }
}

fn serve<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    mut machine: SimMachine,
    options: ServeOptions,
) -> io::Result<SimMachine> {
    writeln!(writer, "{}", greeting_line())?;
    writer.flush()?;

    let mut line = String::new();
    let mut received = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(machine);
        }
        if line.trim().is_empty() {
            continue;
        }
        if options.hang_up_at == Some(received) {
            return Ok(machine);
        }
        received += 1;

        let response = match serde_json::from_str::<Command>(line.trim()) {
            Ok(command) => machine.handle(&command),
            Err(e) => Response::Error(QmpError {
                class: GENERIC_ERROR.to_string(),
                desc: format!("JSON parse error, {e}"),
            }),
        };
        let events = machine.take_events();

        if !options.events_first {
            writeln!(writer, "{}", response.to_value())?;
        }
        for event in &events {
            let encoded = serde_json::to_string(event).map_err(io::Error::other)?;
            writeln!(writer, "{encoded}")?;
        }
        if options.events_first {
            writeln!(writer, "{}", response.to_value())?;
        }
        writer.flush()?;
    }
}
