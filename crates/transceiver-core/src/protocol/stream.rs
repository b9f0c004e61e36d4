//! Byte channels
//!
//! The transport under a [`Transceiver`](super::Transceiver): a serial port, a
//! TCP bridge, or an in-memory loopback for tests.

use serialport::SerialPort;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::{serial::open_port, ProtocolError, DEFAULT_TIMEOUT_MS};
use crate::config::SerialSettings;

/// Abstraction for the byte channel under a transceiver (Serial, TCP or in-memory)
pub trait Channel: Read + Write + Send {
    /// Acquire the underlying resource
    fn open(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    /// Release the underlying resource
    fn close(&mut self) {}

    /// Whether the channel can be read and written
    fn is_open(&self) -> bool {
        true
    }

    /// Configured time a read may block before giving up
    fn read_timeout(&self) -> Duration;

    /// Bound how long the following reads may block
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Clear input buffers
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Clear output buffers
    fn clear_output_buffer(&mut self) -> io::Result<()>;

    /// Get number of bytes available to read
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

fn read_error(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::NotConnected => ProtocolError::NotConnected,
        _ => ProtocolError::IoError(e),
    }
}

/// Read until `len` bytes arrived or `timeout` elapsed.
///
/// A timeout is not an error: the bytes received so far are returned, possibly
/// none at all. Each read is given only the time left before the deadline, and
/// the channel's configured read timeout is restored afterwards.
pub fn read_up_to<C: Channel + ?Sized>(
    channel: &mut C,
    len: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = vec![0u8; len];
    let filled = fill_until(channel, &mut buf, Instant::now() + timeout);

    let configured = channel.read_timeout();
    let restored = channel.set_read_timeout(configured);

    let offset = filled?;
    restored.map_err(read_error)?;
    buf.truncate(offset);
    Ok(buf)
}

fn fill_until<C: Channel + ?Sized>(
    channel: &mut C,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<usize, ProtocolError> {
    let mut offset = 0;
    while offset < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        channel.set_read_timeout(remaining).map_err(read_error)?;

        match channel.read(&mut buf[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                break;
            }
            Err(e) => return Err(read_error(e)),
        }
    }
    Ok(offset)
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel is not open")
}

/// Serial port channel, configured from [`SerialSettings`]
pub struct SerialChannel {
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
    /// Timeout currently programmed into the port
    active_timeout: Duration,
    /// Timeout for the next read
    read_limit: Duration,
}

impl SerialChannel {
    /// Create a closed channel
    pub fn new(settings: SerialSettings) -> Self {
        let active_timeout = settings.read_timeout();
        Self {
            settings,
            port: None,
            active_timeout,
            read_limit: active_timeout,
        }
    }

    /// Serial parameters of this channel
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// The port handle, switched to `timeout`.
    ///
    /// The port has one timeout for both directions, so it is reprogrammed
    /// when the direction changes.
    fn port_with_timeout(&mut self, timeout: Duration) -> io::Result<&mut Box<dyn SerialPort>> {
        let port = self.port.as_mut().ok_or_else(not_open)?;
        if self.active_timeout != timeout {
            port.set_timeout(timeout)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            self.active_timeout = timeout;
        }
        Ok(port)
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.read_limit;
        self.port_with_timeout(timeout)?.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let timeout = self.settings.write_timeout();
        self.port_with_timeout(timeout)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.as_mut().ok_or_else(not_open)?.flush()
    }
}

impl Channel for SerialChannel {
    fn open(&mut self) -> Result<(), ProtocolError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = open_port(&self.settings)?;
        self.active_timeout = port.timeout();
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read_timeout(&self) -> Duration {
        self.settings.read_timeout()
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.read_limit = timeout;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(not_open)?
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(not_open)?
            .clear(serialport::ClearBuffer::Output)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .as_mut()
            .ok_or_else(not_open)?
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// TCP stream channel, for serial-over-IP bridges
pub struct TcpChannel {
    addr: String,
    stream: Option<TcpStream>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl TcpChannel {
    /// Create a closed channel for `addr` ("host:port")
    pub fn new(addr: impl Into<String>, read_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
            read_timeout,
            write_timeout,
        }
    }

    /// Wrap a connected stream
    pub fn from_stream(stream: TcpStream, timeout: Duration) -> io::Result<Self> {
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let addr = stream.peer_addr()?.to_string();
        Ok(Self {
            addr,
            stream: Some(stream),
            read_timeout: timeout,
            write_timeout: timeout,
        })
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(not_open)
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

impl Channel for TcpChannel {
    fn open(&mut self) -> Result<(), ProtocolError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // A zero timeout means "block forever" to the socket
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream()?.set_read_timeout(Some(timeout))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // No kernel call for this on sockets: drain whatever is queued
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let result = loop {
            match stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        stream.set_nonblocking(false)?;
        result
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        // TCP output buffer is managed by OS. Flush calls it.
        self.stream()?.flush()
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let mut buf = [0u8; 8192];
        let result = stream.peek(&mut buf);
        stream.set_nonblocking(false)?;

        match result {
            Ok(n) => Ok(n as u32),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// In-memory channel.
///
/// Bytes queued with [`feed`](LoopbackChannel::feed) are read back in order;
/// reading an empty queue times out immediately. In echo mode everything
/// written is queued for reading too, like a wire with TX tied to RX.
#[derive(Debug)]
pub struct LoopbackChannel {
    rx: VecDeque<u8>,
    written: Vec<u8>,
    echo: bool,
    open: bool,
    read_timeout: Duration,
    /// Largest chunk returned by one read, to simulate a slow line
    max_read: usize,
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self {
            rx: VecDeque::new(),
            written: Vec::new(),
            echo: false,
            open: true,
            read_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_read: usize::MAX,
        }
    }
}

impl LoopbackChannel {
    /// Open channel; written bytes are only captured
    pub fn new() -> Self {
        Self::default()
    }

    /// Open channel that reads back everything written to it
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Limit how many bytes one read call returns
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }

    /// Queue bytes for reading
    pub fn feed(&mut self, data: &[u8]) {
        self.rx.extend(data);
    }

    /// Bytes still queued for reading
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Take everything written so far
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Read for LoopbackChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(not_open());
        }
        if self.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data queued"));
        }
        let n = buf.len().min(self.rx.len()).min(self.max_read);
        for (slot, byte) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for LoopbackChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(not_open());
        }
        self.written.extend_from_slice(buf);
        if self.echo {
            self.rx.extend(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for LoopbackChannel {
    fn open(&mut self) -> Result<(), ProtocolError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        if !self.open {
            return Err(not_open());
        }
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.rx.len() as u32)
    }
}
