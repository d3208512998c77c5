//! # Connection
//!
//! Purpose: Own one socket plus its receive buffer and drive the frame codec
//! against blocking reads and writes.
//!
//! ## Design Principles
//! 1. **Exclusive Ownership**: A connection is used by one caller at a time;
//!    there is no internal locking.
//! 2. **Fail Once**: Any transport or framing failure moves the connection to
//!    `Broken`, which is terminal. The pool discards broken connections.
//! 3. **Buffer Reuse**: The encode buffer and receive buffer live on the
//!    connection, so steady-state round trips do not allocate for framing.
//! 4. **Transport Agnostic**: Generic over `Read + Write` so the state machine
//!    runs the same over TCP and over in-memory streams.
//!
//! ## State Machine
//!
//! ```text
//! Idle --send--> AwaitingResponse --receive--> Idle
//!   \                   |
//!    +----- any I/O or framing failure -----> Broken (terminal)
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use ssdb_common::{decode_buf, encode, Request, Response, Value};
use tracing::{debug, trace};

use crate::config::{deadline, ClientConfig};
use crate::error::{ClientError, ClientResult};

/// Size of a single socket read.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Ready for the next request.
    Idle,
    /// A request was written and its response has not been read yet.
    AwaitingResponse,
    /// A failure occurred; the connection must be discarded.
    Broken,
}

/// Why a connection stopped being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokenCause {
    /// Read or write failed with this error kind.
    Io(io::ErrorKind),
    /// Peer closed the stream.
    Eof,
    /// Response bytes could not be framed.
    Protocol,
    /// `close` was called.
    Closed,
}

impl fmt::Display for BrokenCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokenCause::Io(kind) => write!(f, "io failure ({})", kind),
            BrokenCause::Eof => f.write_str("peer closed the connection"),
            BrokenCause::Protocol => f.write_str("malformed response"),
            BrokenCause::Closed => f.write_str("connection closed"),
        }
    }
}

/// Single server connection with reusable buffers.
pub struct Connection<S = TcpStream> {
    id: u64,
    stream: Option<S>,
    recv_buf: BytesMut,
    write_buf: Vec<u8>,
    state: ConnectionState,
    broken: Option<BrokenCause>,
    trace_frames: bool,
}

impl Connection<TcpStream> {
    /// Dials the configured server and applies socket options.
    ///
    /// Does not authenticate; the pool does that when a password is set.
    pub fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        stream.set_read_timeout(deadline(config.read_timeout))?;
        stream.set_write_timeout(deadline(config.write_timeout))?;
        // Requests are small; do not let Nagle hold them back.
        stream.set_nodelay(true)?;

        let conn = Connection::new(stream).with_frame_tracing(config.trace_frames);
        debug!(conn_id = conn.id, addr = %config.server_address(), "dialed connection");
        Ok(conn)
    }
}

impl<S: Read + Write> Connection<S> {
    /// Wraps an already established stream.
    pub fn new(stream: S) -> Self {
        Connection {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            stream: Some(stream),
            recv_buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            write_buf: Vec::with_capacity(256),
            state: ConnectionState::Idle,
            broken: None,
            trace_frames: false,
        }
    }

    /// Enables per-frame `trace!` events.
    pub fn with_frame_tracing(mut self, enabled: bool) -> Self {
        self.trace_frames = enabled;
        self
    }

    /// Process-unique id, used in log fields.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Cause recorded when the connection broke; `None` while healthy.
    pub fn broken_cause(&self) -> Option<BrokenCause> {
        self.broken
    }

    /// Underlying stream, until the connection is closed.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Encodes `request` and writes it in one blocking call.
    pub fn send(&mut self, request: Request) -> ClientResult<()> {
        self.send_values(request.values())
    }

    /// Encodes `values` and writes them in one blocking call.
    ///
    /// An encoding error leaves the connection usable; a write error breaks it.
    pub fn send_values(&mut self, values: &[Value]) -> ClientResult<()> {
        self.ensure_usable()?;
        if self.state == ConnectionState::AwaitingResponse {
            return Err(ClientError::PendingResponse);
        }

        self.write_buf.clear();
        encode(values, &mut self.write_buf)?;

        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::Broken(BrokenCause::Closed));
        };
        if let Err(err) = stream.write_all(&self.write_buf).and_then(|_| stream.flush()) {
            return Err(self.fail_io(err));
        }

        if self.trace_frames {
            trace!(
                conn_id = self.id,
                bytes = self.write_buf.len(),
                request = %String::from_utf8_lossy(&self.write_buf).escape_debug(),
                "sent request"
            );
        }
        self.state = ConnectionState::AwaitingResponse;
        Ok(())
    }

    /// Reads until one complete response is buffered and returns it.
    ///
    /// Bytes beyond the response stay buffered for the next call.
    pub fn receive(&mut self) -> ClientResult<Response> {
        self.ensure_usable()?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            match decode_buf(&mut self.recv_buf) {
                Ok(Some(response)) => {
                    self.state = ConnectionState::Idle;
                    if self.trace_frames {
                        trace!(
                            conn_id = self.id,
                            status = %response.status(),
                            blocks = response.blocks().len(),
                            "received response"
                        );
                    }
                    return Ok(response);
                }
                Ok(None) => {}
                Err(err) => {
                    self.mark_broken(BrokenCause::Protocol);
                    return Err(err.into());
                }
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(ClientError::Broken(BrokenCause::Closed));
            };
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.mark_broken(BrokenCause::Eof);
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    )
                    .into());
                }
                Ok(n) => self.recv_buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.fail_io(err)),
            }
        }
    }

    /// One full round trip: `send` followed by `receive`.
    pub fn call(&mut self, request: Request) -> ClientResult<Response> {
        self.send(request)?;
        self.receive()
    }

    /// Sends `auth` and checks for an `ok` status.
    pub fn authenticate(&mut self, password: &str) -> ClientResult<()> {
        let response = self.call(Request::new("auth").arg(password))?;
        if response.is_ok() {
            Ok(())
        } else {
            Err(ClientError::AuthFailed {
                status: response.status(),
            })
        }
    }

    /// Closes the socket. Further calls are no-ops.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.recv_buf.clear();
            if self.broken.is_none() {
                self.mark_broken(BrokenCause::Closed);
            }
            debug!(conn_id = self.id, "closed connection");
        }
    }

    fn ensure_usable(&self) -> ClientResult<()> {
        match self.broken {
            Some(cause) => Err(ClientError::Broken(cause)),
            None => Ok(()),
        }
    }

    fn mark_broken(&mut self, cause: BrokenCause) {
        self.state = ConnectionState::Broken;
        self.broken = Some(cause);
        debug!(conn_id = self.id, %cause, "connection broken");
    }

    fn fail_io(&mut self, err: io::Error) -> ClientError {
        self.mark_broken(BrokenCause::Io(err.kind()));
        ClientError::Io(err)
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("broken", &self.broken)
            .field("buffered", &self.recv_buf.len())
            .finish()
    }
}

fn connect_stream(config: &ClientConfig) -> ClientResult<TcpStream> {
    let addrs = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(config.server_address()))?;

    let mut last_err = None;
    for addr in addrs {
        let attempt = match deadline(config.connect_timeout) {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }

    match last_err {
        Some(err) => Err(err.into()),
        None => Err(ClientError::InvalidAddress(config.server_address())),
    }
}
