//! Per-connection adapter record and framed I/O engine.
//!
//! An [`Adapter`] is the daemon-side state for one backend client: identity,
//! buffered inbound/outbound frame queues, counters, and the staged config
//! change set. All handlers run on the single reactor thread to completion,
//! so interior mutability is `RefCell`/`Cell`, never a lock; the registry and
//! the driver task each hold an `Rc` reference, which is the subsystem's
//! lifecycle refcount.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::client::ClientId;
use crate::config::Tunables;
use crate::frame::{self, FrameCodec, FrameError, MAX_FRAME};
use crate::message::{self, BackendMessage, MessageError};
use crate::snapshot::ConfigChange;

/// Non-blocking byte transport under an adapter.
///
/// Both operations follow kernel socket semantics: they move as many bytes as
/// currently possible and fail with [`io::ErrorKind::WouldBlock`] when the
/// socket cannot make progress.
pub trait SocketIo {
    /// Read into `buf`, returning the number of bytes read (0 means the peer
    /// closed the connection).
    ///
    /// # Errors
    /// [`io::ErrorKind::WouldBlock`] when no data is ready; any other error
    /// is fatal for the connection.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write from `buf`, returning the number of bytes accepted.
    ///
    /// # Errors
    /// [`io::ErrorKind::WouldBlock`] when the socket cannot accept bytes; any
    /// other error is fatal for the connection.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl SocketIo for tokio::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }
}

/// Fatal connection-level failures; every variant ends in disconnect.
#[derive(Debug, Error)]
pub enum ConnError {
    /// The peer closed its end of the stream.
    #[error("peer closed the connection")]
    PeerClosed,
    /// The inbound stream is corrupt or malformed.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// A hard socket error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures enqueueing an outbound message; none of them disconnect.
#[derive(Debug, Error)]
pub enum SendError {
    /// The adapter has already been disconnected.
    #[error("adapter is disconnected")]
    NotConnected,
    /// The framed message would exceed the frame cap.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The message could not be serialised.
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Result of one writable tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The outbox drained within the burst.
    Idle,
    /// The socket blocked or a frame went out partially; writable must be
    /// re-armed so the residual resumes from its exact offset.
    Rearm,
    /// The burst is exhausted; writes stay paused until the resume tick.
    Paused,
}

struct OutFrame {
    buf: Bytes,
    off: usize,
}

struct Conn {
    codec: FrameCodec,
    scratch: BytesMut,
    rdbuf: Box<[u8]>,
    inbox: VecDeque<Bytes>,
    outbox: VecDeque<OutFrame>,
    writes_paused: bool,
    closed: bool,
}

/// Daemon-side state for one connected backend client.
pub struct Adapter {
    fd: RawFd,
    peer: SocketAddr,
    name: RefCell<String>,
    id: Cell<Option<ClientId>>,
    conn: RefCell<Conn>,
    pending_cfg_changes: RefCell<Vec<ConfigChange>>,
    num_msg_tx: Cell<u64>,
    num_msg_rx: Cell<u64>,
    tunables: Tunables,
    /// Wakes the driver task whenever queue state or lifecycle flips.
    pub(crate) wake: Notify,
}

impl Adapter {
    pub(crate) fn new(fd: RawFd, peer: SocketAddr, tunables: Tunables) -> Rc<Self> {
        Rc::new(Self {
            fd,
            peer,
            name: RefCell::new(format!("Unknown-FD-{fd}")),
            id: Cell::new(None),
            conn: RefCell::new(Conn {
                codec: FrameCodec,
                scratch: BytesMut::with_capacity(MAX_FRAME),
                rdbuf: vec![0u8; tunables.recv_bufsz].into_boxed_slice(),
                inbox: VecDeque::new(),
                outbox: VecDeque::new(),
                writes_paused: false,
                closed: false,
            }),
            pending_cfg_changes: RefCell::new(Vec::new()),
            num_msg_tx: Cell::new(0),
            num_msg_rx: Cell::new(0),
            tunables,
            wake: Notify::new(),
        })
    }

    /// File descriptor of the underlying socket (for identification only).
    #[must_use]
    pub fn fd(&self) -> RawFd { self.fd }

    /// Peer address the client connected from.
    #[must_use]
    pub fn peer(&self) -> SocketAddr { self.peer }

    /// Current display name (`Unknown-FD-<fd>` until the client registers).
    #[must_use]
    pub fn name(&self) -> String { self.name.borrow().clone() }

    pub(crate) fn set_name(&self, name: &str) {
        name.clone_into(&mut self.name.borrow_mut());
    }

    /// Bound client identity, if the client has registered.
    #[must_use]
    pub fn id(&self) -> Option<ClientId> { self.id.get() }

    pub(crate) fn set_id(&self, id: ClientId) { self.id.set(Some(id)); }

    pub(crate) fn take_id(&self) -> Option<ClientId> { self.id.take() }

    /// Whether the adapter has been disconnected.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.conn.borrow().closed }

    /// Mark the adapter closed and wake its driver; returns false when it
    /// already was (disconnect is idempotent).
    pub(crate) fn close(&self) -> bool {
        let mut conn = self.conn.borrow_mut();
        if conn.closed {
            return false;
        }
        conn.closed = true;
        drop(conn);
        self.wake.notify_one();
        true
    }

    /// Messages enqueued and messages dispatched, in that order.
    #[must_use]
    pub fn counters(&self) -> (u64, u64) { (self.num_msg_tx.get(), self.num_msg_rx.get()) }

    pub(crate) fn count_rx(&self) { self.num_msg_rx.set(self.num_msg_rx.get() + 1); }

    /// Whether a writable tick would make progress right now.
    #[must_use]
    pub fn wants_write(&self) -> bool {
        let conn = self.conn.borrow();
        !conn.closed && !conn.writes_paused && !conn.outbox.is_empty()
    }

    /// Whether frames are waiting to be dispatched.
    #[must_use]
    pub fn has_inbox(&self) -> bool { !self.conn.borrow().inbox.is_empty() }

    /// Whether writes are currently paused for fairness.
    #[must_use]
    pub fn writes_paused(&self) -> bool { self.conn.borrow().writes_paused }

    /// Clear the write pause; the driver re-arms writable if work remains.
    pub(crate) fn writes_on(&self) {
        self.conn.borrow_mut().writes_paused = false;
    }

    /// Staged config changes awaiting the snapshot transaction.
    #[must_use]
    pub fn pending_changes(&self) -> Ref<'_, Vec<ConfigChange>> {
        self.pending_cfg_changes.borrow()
    }

    pub(crate) fn pending_changes_mut(&self) -> RefMut<'_, Vec<ConfigChange>> {
        self.pending_cfg_changes.borrow_mut()
    }

    /// Pop the next complete frame awaiting dispatch.
    pub(crate) fn next_inbox_frame(&self) -> Option<Bytes> {
        self.conn.borrow_mut().inbox.pop_front()
    }

    /// One readable tick: drain the socket into the scratch buffer (at most
    /// `read_burst` passes), then rescan for complete frames. Returns the
    /// number of frames completed this tick.
    ///
    /// # Errors
    /// [`ConnError::PeerClosed`] on end-of-stream, [`ConnError::Frame`] when
    /// the stream is corrupt, [`ConnError::Io`] on a hard socket error; the
    /// caller must disconnect on any of them.
    pub(crate) fn handle_readable(&self, sock: &mut dyn SocketIo) -> Result<usize, ConnError> {
        let mut conn = self.conn.borrow_mut();
        let conn = &mut *conn;

        let mut passes = 0usize;
        while passes < self.tunables.read_burst {
            match sock.try_read(&mut conn.rdbuf) {
                Ok(0) => return Err(ConnError::PeerClosed),
                Ok(n) => {
                    conn.scratch.extend_from_slice(&conn.rdbuf[..n]);
                    passes += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ConnError::Io(e)),
            }
        }

        let mut frames = 0usize;
        while let Some(payload) = conn.codec.decode(&mut conn.scratch)? {
            conn.inbox.push_back(payload);
            frames += 1;
        }
        Ok(frames)
    }

    /// One writable tick: drain the outbox in enqueue order, at most
    /// `write_burst` whole frames.
    ///
    /// # Errors
    /// [`ConnError::Io`] on a hard socket error; the caller must disconnect.
    pub(crate) fn handle_writable(
        &self,
        sock: &mut dyn SocketIo,
    ) -> Result<WriteOutcome, ConnError> {
        let mut conn = self.conn.borrow_mut();
        let conn = &mut *conn;

        let mut processed = 0usize;
        while processed < self.tunables.write_burst {
            let Some(front) = conn.outbox.front_mut() else {
                return Ok(WriteOutcome::Idle);
            };
            match sock.try_write(&front.buf[front.off..]) {
                Ok(n) => {
                    front.off += n;
                    if front.off < front.buf.len() {
                        return Ok(WriteOutcome::Rearm);
                    }
                    conn.outbox.pop_front();
                    processed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteOutcome::Rearm);
                }
                Err(e) => return Err(ConnError::Io(e)),
            }
        }

        conn.writes_paused = true;
        Ok(WriteOutcome::Paused)
    }

    /// Pack, frame, and enqueue an outbound message.
    ///
    /// The transmit counter tracks enqueues, not deliveries. An oversize or
    /// unserialisable message is dropped with an error and does not affect
    /// the connection.
    ///
    /// # Errors
    /// [`SendError::NotConnected`] after disconnect, [`SendError::Message`]
    /// when packing fails, [`SendError::Frame`] when the payload exceeds the
    /// frame cap.
    pub fn enqueue_msg(&self, msg: &BackendMessage) -> Result<(), SendError> {
        let payload = message::pack(msg)?;
        self.enqueue_frame(&payload)
    }

    pub(crate) fn enqueue_frame(&self, payload: &[u8]) -> Result<(), SendError> {
        let framed = frame::encode_frame(payload)?;
        let mut conn = self.conn.borrow_mut();
        if conn.closed {
            return Err(SendError::NotConnected);
        }
        conn.outbox.push_back(OutFrame { buf: framed, off: 0 });
        let paused = conn.writes_paused;
        drop(conn);
        self.num_msg_tx.set(self.num_msg_tx.get() + 1);
        if !paused {
            self.wake.notify_one();
        }
        Ok(())
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        debug!(fd = self.fd, name = %self.name.get_mut().as_str(), "adapter destroyed");
    }
}
