//! Blocking QMP socket transport.
//!
//! One line of JSON per message in each direction. [`QmpTransport`] keeps a
//! single command outstanding; events read while waiting for its response are
//! queued and handed out by the next poll.

use std::{
    collections::VecDeque,
    io::{self, BufRead, BufReader, Read, Write},
    net::{Shutdown, TcpStream},
    os::unix::net::UnixStream,
};

use qmpfault_core::{Transport, TransportError};
use qmpfault_proto::{Command, Event, Greeting, Response, ServerMessage};

use crate::{address::QmpAddress, error::ClientError};

/// Connected socket, TCP or Unix.
#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    fn open(address: &QmpAddress) -> io::Result<Self> {
        match address {
            QmpAddress::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                stream.set_nodelay(true)?;
                Ok(Self::Tcp(stream))
            },
            QmpAddress::Unix(path) => Ok(Self::Unix(UnixStream::connect(path)?)),
        }
    }

    fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(s) => s.try_clone().map(Self::Tcp),
            Self::Unix(s) => s.try_clone().map(Self::Unix),
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.set_nonblocking(nonblocking),
            Self::Unix(s) => s.set_nonblocking(nonblocking),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Unix(s) => s.flush(),
        }
    }
}

/// QMP channel over a TCP or Unix socket.
#[derive(Debug)]
pub struct QmpTransport {
    reader: BufReader<Stream>,
    writer: Stream,
    /// Bytes of a line not yet terminated, kept across non-blocking reads
    partial: Vec<u8>,
    events: VecDeque<Event>,
    closed: bool,
}

impl QmpTransport {
    /// Open the socket and complete the QMP handshake.
    ///
    /// Reads the greeting, then negotiates capabilities with
    /// `qmp_capabilities`. Returns the transport ready for commands together
    /// with the greeting.
    pub fn connect(address: &QmpAddress) -> Result<(Self, Greeting), ClientError> {
        let connect_error =
            |source| ClientError::Connect { address: address.to_string(), source };
        let stream = Stream::open(address).map_err(connect_error)?;
        let writer = stream.try_clone().map_err(connect_error)?;

        let mut transport = Self {
            reader: BufReader::new(stream),
            writer,
            partial: Vec::new(),
            events: VecDeque::new(),
            closed: false,
        };

        let greeting = match transport.read_message() {
            Ok(Some(ServerMessage::Greeting(greeting))) => greeting,
            Ok(Some(other)) => {
                return Err(ClientError::Greeting(format!("unexpected message {other:?}")));
            },
            Ok(None) => return Err(ClientError::Greeting("connection closed".to_string())),
            Err(e) => return Err(ClientError::Greeting(e.to_string())),
        };
        tracing::debug!(version = %greeting.version(), "greeting");

        match transport.send(&Command::capabilities())? {
            Some(Response::Return(_)) => {},
            Some(Response::Error(err)) => return Err(ClientError::Capabilities(err.to_string())),
            None => return Err(ClientError::Capabilities("connection closed".to_string())),
        }

        Ok((transport, greeting))
    }

    /// Number of events received but not yet polled.
    pub fn queued_events(&self) -> usize {
        self.events.len()
    }

    /// Read one complete non-blank line. `None` on end of stream.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            match self.reader.read_until(b'\n', &mut self.partial) {
                Ok(_) if !self.partial.ends_with(b"\n") => return Ok(None),
                Ok(_) => {
                    let bytes = std::mem::take(&mut self.partial);
                    let line = String::from_utf8(bytes)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    if !line.trim().is_empty() {
                        return Ok(Some(line));
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
    }

    fn read_message(&mut self) -> Result<Option<ServerMessage>, TransportError> {
        let Some(line) = self.read_line()? else {
            return Ok(None);
        };
        tracing::trace!(line = line.trim_end(), "received");
        Ok(Some(ServerMessage::decode(&line)?))
    }

    /// Queue an event; anything else outside a command exchange is dropped.
    fn queue(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Event(event) => self.events.push_back(event),
            ServerMessage::Response(response) => {
                tracing::warn!(response = %response.to_value(), "dropping unsolicited response");
            },
            ServerMessage::Greeting(_) => tracing::warn!("dropping repeated greeting"),
        }
    }

    /// Read every complete message already available without waiting.
    fn read_available(&mut self) -> Result<(), TransportError> {
        self.reader.get_ref().set_nonblocking(true)?;
        let result = self.drain_readable();
        self.reader.get_ref().set_nonblocking(false)?;
        result
    }

    fn drain_readable(&mut self) -> Result<(), TransportError> {
        loop {
            match self.read_message() {
                Ok(Some(message)) => self.queue(message),
                Ok(None) => return Ok(()),
                Err(TransportError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(());
                },
                Err(e) => return Err(e),
            }
        }
    }
}

impl Transport for QmpTransport {
    fn send(&mut self, command: &Command) -> Result<Option<Response>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let line = command.encode_line()?;
        match self.writer.write_all(line.as_bytes()).and_then(|()| self.writer.flush()) {
            Ok(()) => {},
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                ) =>
            {
                return Ok(None);
            },
            Err(e) => return Err(e.into()),
        }

        loop {
            match self.read_message()? {
                None => return Ok(None),
                Some(ServerMessage::Response(response)) => return Ok(Some(response)),
                Some(other) => self.queue(other),
            }
        }
    }

    fn poll_events(&mut self, blocking: bool) -> Result<Vec<Event>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        if blocking {
            while self.events.is_empty() {
                match self.read_message()? {
                    Some(message) => self.queue(message),
                    None => return Err(TransportError::Closed),
                }
            }
        } else {
            self.read_available()?;
        }

        Ok(self.events.drain(..).collect())
    }

    fn clear_events(&mut self) {
        self.events.clear();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.writer.shutdown() {
            tracing::debug!(error = %e, "socket shutdown");
        }
    }
}
