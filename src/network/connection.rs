//! Tagged Connection
//!
//! Owns one TCP stream and moves whole frames across it.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{MuxError, Result};
use crate::protocol::{read_frame, write_frame, Frame};

/// A framed, thread-safe connection
///
/// ## Concurrency
/// - `send` and `receive` take separate locks, so one thread can write a
///   request while another is blocked reading a response.
/// - Each lock covers a whole frame, so concurrent senders never
///   interleave bytes and concurrent receivers never split a frame.
/// - `close` shuts the socket down without taking either lock, which
///   wakes a receiver blocked in a read.
pub struct TaggedConnection {
    /// TCP stream reader (buffered for efficiency)
    reader: Mutex<BufReader<TcpStream>>,

    /// TCP stream writer (buffered for efficiency)
    writer: Mutex<BufWriter<TcpStream>>,

    /// Handle used only to shut the socket down
    stream: TcpStream,

    /// Set once by `close`
    closed: AtomicBool,

    /// Largest inbound payload accepted
    max_payload_size: usize,

    /// Peer address for logging
    peer_addr: String,
}

impl TaggedConnection {
    /// Connect to `config.server_addr`
    pub fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let stream = match config.connect_timeout() {
            Some(timeout) => connect_with_timeout(&config.server_addr, timeout)?,
            None => TcpStream::connect(&config.server_addr)?,
        };

        Self::from_stream(stream, config)
    }

    /// Wrap an already connected stream
    ///
    /// Sets up buffered I/O and configures the socket from `config`.
    pub fn from_stream(stream: TcpStream, config: &Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(config.nodelay)?;
        stream.set_write_timeout(config.write_timeout())?;
        // The reader must be able to idle forever
        stream.set_read_timeout(None)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream.try_clone()?;

        tracing::debug!("Connection established with {}", peer_addr);

        Ok(Self {
            reader: Mutex::new(BufReader::new(read_stream)),
            writer: Mutex::new(BufWriter::new(write_stream)),
            stream,
            closed: AtomicBool::new(false),
            max_payload_size: config.max_payload_size,
            peer_addr,
        })
    }

    /// Send one frame and flush it to the transport
    ///
    /// Transport failures are returned as-is and never retried here. A
    /// failed write closes the connection, so later calls fail with
    /// `ConnectionClosed`.
    pub fn send(&self, tag: i32, payload: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(MuxError::ConnectionClosed);
        }

        let mut writer = self.writer.lock();
        if let Err(e) = write_frame(&mut *writer, tag, payload) {
            let err = self.after_close(e);
            // Part of the frame may be on the wire; nothing after it can be framed
            if matches!(err, MuxError::Io(_)) {
                tracing::warn!("Write to {} failed mid-frame: {}", self.peer_addr, err);
                if let Err(close_err) = self.close() {
                    tracing::debug!("Error closing connection to {}: {}", self.peer_addr, close_err);
                }
            }
            return Err(err);
        }

        tracing::trace!("Sent frame tag={} len={} to {}", tag, payload.len(), self.peer_addr);
        Ok(())
    }

    /// Block until a complete frame arrives
    ///
    /// Returns `Ok(None)` when the peer shut down cleanly between frames.
    pub fn receive(&self) -> Result<Option<Frame>> {
        if self.is_closed() {
            return Err(MuxError::ConnectionClosed);
        }

        let mut reader = self.reader.lock();
        match read_frame(&mut *reader, self.max_payload_size) {
            // A shutdown we initiated reads as EOF
            Ok(None) if self.is_closed() => Err(MuxError::ConnectionClosed),
            Ok(frame) => Ok(frame),
            Err(e) => Err(self.after_close(e)),
        }
    }

    /// Close the underlying transport
    ///
    /// Idempotent. Pending and later `send`/`receive` calls fail with
    /// `ConnectionClosed`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::debug!("Closing connection to {}", self.peer_addr);

        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // The peer got there first
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Transport errors observed after `close` are reported as closure
    fn after_close(&self, err: MuxError) -> MuxError {
        match err {
            MuxError::Io(_) if self.is_closed() => MuxError::ConnectionClosed,
            other => other,
        }
    }
}

/// Try every resolved address in turn, returning the last failure
fn connect_with_timeout(addr: &str, timeout: std::time::Duration) -> Result<TcpStream> {
    let mut last_error = None;

    for socket_addr in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!("Connect to {} failed: {}", socket_addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} did not resolve to any address", addr),
            )
        })
        .into())
}
