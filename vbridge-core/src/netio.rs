//! Non-blocking byte-stream plumbing.
//!
//! ```text
//!   Transport ◄── read_some ── NetIo.input  ──► receive machine
//!   Transport ◄── write_some ─ NetIo.output ◄── send machine
//! ```
//!
//! A [`Transport`] reports would-block as `ErrorKind::WouldBlock` and
//! an orderly close as `Ok(0)` from `read`. [`NetIo`] owns the two
//! fixed-size buffers both state machines work on; they are allocated
//! once the transport handshake has finished.
//!
//! Readiness is level-triggered: [`NetIo::wants`] says which directions
//! can make progress right now, and [`wait_ready`] parks a TCP
//! connection on exactly those.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::rc::Rc;

use tokio::io::Interest;
use tokio::net::TcpStream;

use crate::buffer::Buffer;
use crate::error::VbError;
use crate::step::Step;

/// Size of each of the input and output buffers.
pub const NETIO_BUFFER: usize = 16384;

// ── Transport ────────────────────────────────────────────────────

/// A non-blocking byte stream.
pub trait Transport {
    /// Peer name for logs, e.g. `127.0.0.1:40312`.
    fn name(&self) -> String;

    /// One step of the transport handshake; `Ready` carries the
    /// negotiated protocol name.
    fn handshake(&mut self) -> io::Result<Step<String>>;

    /// `Ok(0)` means the peer closed the stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// One step of an orderly shutdown.
    fn shutdown(&mut self) -> io::Result<Step>;
}

/// Directions in which a connection can make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wants {
    /// The input buffer has room.
    pub read: bool,
    /// The output buffer holds bytes to write.
    pub write: bool,
}

impl Wants {
    pub fn any(&self) -> bool {
        self.read || self.write
    }
}

/// Wait until `stream` is ready for one of the directions in `wants`.
///
/// Never completes when `wants` asks for nothing; callers bound the
/// wait with their own timer.
pub async fn wait_ready(stream: &TcpStream, wants: Wants) -> io::Result<()> {
    let interest = match (wants.read, wants.write) {
        (true, true) => Interest::READABLE | Interest::WRITABLE,
        (true, false) => Interest::READABLE,
        (false, true) => Interest::WRITABLE,
        (false, false) => return std::future::pending().await,
    };
    stream.ready(interest).await?;
    Ok(())
}

impl Transport for TcpStream {
    fn name(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".into())
    }

    fn handshake(&mut self) -> io::Result<Step<String>> {
        if let Some(e) = self.take_error()? {
            return Err(e);
        }
        Ok(Step::Ready("TCP".into()))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.try_read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.try_write(buf)
    }

    fn shutdown(&mut self) -> io::Result<Step> {
        // The socket is closed when the stream is dropped.
        Ok(Step::Ready(()))
    }
}

// ── Pipe ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PipeShared {
    /// `queue[side]` holds bytes written by `side`.
    queue: [VecDeque<u8>; 2],
    closed: [bool; 2],
}

/// One end of an in-memory, single-threaded byte stream.
///
/// Every read and write moves at most `max_chunk` bytes, which forces
/// the partial I/O paths of both state machines.
#[derive(Debug)]
pub struct Pipe {
    shared: Rc<RefCell<PipeShared>>,
    side: usize,
    name: String,
    max_chunk: usize,
}

/// Two connected pipe ends named `name`.
pub fn pipe_pair(name: &str, max_chunk: usize) -> (Pipe, Pipe) {
    let shared = Rc::new(RefCell::new(PipeShared::default()));
    let end = |side| Pipe {
        shared: Rc::clone(&shared),
        side,
        name: name.to_string(),
        max_chunk: max_chunk.max(1),
    };
    (end(0), end(1))
}

impl Pipe {
    fn peer(&self) -> usize {
        1 - self.side
    }

    /// Bytes written by this end that the peer has not read yet.
    pub fn unread(&self) -> usize {
        self.shared.borrow().queue[self.side].len()
    }
}

impl Transport for Pipe {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn handshake(&mut self) -> io::Result<Step<String>> {
        Ok(Step::Ready("pipe".into()))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.borrow_mut();
        let peer = self.peer();
        let queue = &mut shared.queue[peer];

        if queue.is_empty() {
            if shared.closed[peer] {
                return Ok(0);
            }
            return Err(ErrorKind::WouldBlock.into());
        }

        let n = buf.len().min(queue.len()).min(self.max_chunk);
        for (dst, src) in buf.iter_mut().zip(queue.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut shared = self.shared.borrow_mut();
        if shared.closed[self.peer()] {
            return Err(ErrorKind::BrokenPipe.into());
        }
        let n = buf.len().min(self.max_chunk);
        shared.queue[self.side].extend(&buf[..n]);
        Ok(n)
    }

    fn shutdown(&mut self) -> io::Result<Step> {
        self.shared.borrow_mut().closed[self.side] = true;
        Ok(Step::Ready(()))
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.shared.borrow_mut().closed[self.side] = true;
    }
}

// ── NetIo ────────────────────────────────────────────────────────

/// A transport plus the buffers the protocol machines work on.
#[derive(Debug)]
pub struct NetIo<T> {
    transport: T,
    name: String,
    proto: Option<String>,
    input: Buffer,
    output: Buffer,
}

impl<T: Transport> NetIo<T> {
    pub fn new(transport: T) -> Self {
        let name = transport.name();
        Self {
            transport,
            name,
            proto: None,
            input: Buffer::default(),
            output: Buffer::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Negotiated protocol, once started.
    pub fn proto(&self) -> Option<&str> {
        self.proto.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.proto.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// What the next `read_some` / `write_some` could move.
    ///
    /// Before the handshake only reads are of interest.
    pub fn wants(&self) -> Wants {
        if !self.is_started() {
            return Wants { read: true, write: false };
        }
        Wants {
            read: self.input.read_size() < self.input.capacity(),
            write: !self.output.is_drained(),
        }
    }

    /// Drive the handshake; buffers exist once this returns `Ready`.
    pub fn start(&mut self) -> Result<Step, VbError> {
        if self.proto.is_some() {
            return Ok(Step::Ready(()));
        }

        match self.transport.handshake() {
            Ok(Step::Ready(proto)) => {
                self.proto = Some(proto);
                self.input = Buffer::with_capacity(NETIO_BUFFER);
                self.output = Buffer::with_capacity(NETIO_BUFFER);
                Ok(Step::Ready(()))
            }
            Ok(Step::Pending) => Ok(Step::Pending),
            Err(e) if would_block(&e) => Ok(Step::Pending),
            Err(e) => Err(e.into()),
        }
    }

    /// One step of the orderly shutdown.
    pub fn stop(&mut self) -> Result<Step, VbError> {
        match self.transport.shutdown() {
            Ok(step) => Ok(step),
            Err(e) if would_block(&e) => Ok(Step::Pending),
            Err(e) => Err(e.into()),
        }
    }

    /// Read once into the input buffer. Returns whether bytes arrived.
    pub fn read_some(&mut self) -> Result<bool, VbError> {
        if !self.is_started() {
            return Ok(false);
        }

        self.input.shift();
        if self.input.write_size() == 0 {
            return Ok(false);
        }

        match self.transport.read(self.input.writable()) {
            Ok(0) => Err(VbError::Closed),
            Ok(n) => {
                self.input.commit(n);
                Ok(true)
            }
            Err(e) if would_block(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Write once from the output buffer. Returns whether bytes left.
    pub fn write_some(&mut self) -> Result<bool, VbError> {
        if !self.is_started() || self.output.is_drained() {
            return Ok(false);
        }

        match self.transport.write(self.output.readable()) {
            Ok(n) => {
                self.output.consume(n);
                self.output.shift();
                Ok(n > 0)
            }
            Err(e) if would_block(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn input(&mut self) -> &mut Buffer {
        &mut self.input
    }

    pub fn output(&mut self) -> &mut Buffer {
        &mut self.output
    }
}

fn would_block(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

// ── Tests ────────────────────────────────────────────────────────
