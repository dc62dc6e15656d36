//! Per-adapter event loop bridging the reactor to the connection engine.
//!
//! Each adapter gets one cooperative task whose select arms are the five
//! event classes of the connection lifecycle: the post-accept init timer,
//! socket readable, socket writable, the write-resume timer, and the
//! deferred message-processing timer. At most one arm of each class is live
//! at a time; re-setting a deadline replaces the previous arm, and marking
//! the adapter closed retires them all.

use std::io;
use std::rc::Rc;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error};

use crate::adapter::{Adapter, ConnError, WriteOutcome};
use crate::dispatch;
use crate::message;
use crate::registry::AdapterRegistry;

enum Tick {
    Wake,
    Init,
    Resume,
    Proc,
    Readable(io::Result<()>),
    Writable(io::Result<()>),
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Drive one adapter until it disconnects. The task owns the socket; when
/// the adapter is marked closed the task unwinds and the socket drops, which
/// is the best-effort close.
pub(crate) async fn run_adapter(
    registry: Rc<AdapterRegistry>,
    adapter: Rc<Adapter>,
    mut socket: TcpStream,
) {
    let t = registry.tunables();
    let mut init_at = Some(Instant::now() + t.conn_init_delay);
    let mut resume_at: Option<Instant> = None;
    let mut proc_at: Option<Instant> = None;

    loop {
        if adapter.is_closed() {
            break;
        }
        let want_write = adapter.wants_write();

        let tick = tokio::select! {
            biased;
            () = adapter.wake.notified() => Tick::Wake,
            () = deadline(init_at), if init_at.is_some() => Tick::Init,
            () = deadline(resume_at), if resume_at.is_some() => Tick::Resume,
            () = deadline(proc_at), if proc_at.is_some() => Tick::Proc,
            res = socket.writable(), if want_write => Tick::Writable(res),
            res = socket.readable() => Tick::Readable(res),
        };

        match tick {
            // Queue or lifecycle state changed; loop to re-evaluate guards.
            Tick::Wake => {}
            Tick::Init => {
                init_at = None;
                if registry.txn().config_trxn_in_progress().is_some() {
                    // Another session's config transaction is still running.
                    init_at = Some(Instant::now() + t.conn_init_delay);
                } else if registry.txn().notify_conn(&adapter, true).is_err() {
                    error!(
                        client = %adapter.name(),
                        "transaction module could not start the initial config sync, disconnecting"
                    );
                    registry.disconnect(&adapter);
                }
            }
            Tick::Resume => {
                resume_at = None;
                debug!(client = %adapter.name(), "resuming writes");
                adapter.writes_on();
            }
            Tick::Proc => {
                proc_at = None;
                if process_inbox(&registry, &adapter) {
                    proc_at = Some(Instant::now() + t.proc_delay);
                }
            }
            Tick::Writable(Ok(())) => match adapter.handle_writable(&mut socket) {
                Ok(WriteOutcome::Idle | WriteOutcome::Rearm) => {}
                Ok(WriteOutcome::Paused) => {
                    debug!(client = %adapter.name(), "write burst exhausted, pausing writes");
                    resume_at = Some(Instant::now() + t.write_resume_delay);
                }
                Err(err) => {
                    error!(client = %adapter.name(), %err, "write failed");
                    registry.disconnect(&adapter);
                }
            },
            Tick::Readable(Ok(())) => match adapter.handle_readable(&mut socket) {
                Ok(0) => {}
                Ok(_) => {
                    proc_at = Some(Instant::now() + t.proc_delay);
                }
                Err(ConnError::PeerClosed) => {
                    debug!(client = %adapter.name(), "peer closed the connection");
                    registry.disconnect(&adapter);
                }
                Err(err) => {
                    error!(client = %adapter.name(), %err, "read failed");
                    registry.disconnect(&adapter);
                }
            },
            Tick::Writable(Err(err)) | Tick::Readable(Err(err)) => {
                error!(client = %adapter.name(), %err, "socket readiness failed");
                registry.disconnect(&adapter);
            }
        }
    }

    debug!(client = %adapter.name(), fd = adapter.fd(), "adapter task exiting");
}

/// Dispatch up to `proc_burst` frames; returns true when frames remain and
/// the processing timer must be re-armed.
fn process_inbox(registry: &Rc<AdapterRegistry>, adapter: &Rc<Adapter>) -> bool {
    let t = registry.tunables();
    let mut processed = 0usize;
    while processed < t.proc_burst {
        if adapter.is_closed() {
            return false;
        }
        let Some(frame) = adapter.next_inbox_frame() else {
            return false;
        };
        processed += 1;
        match message::unpack(&frame) {
            Ok(msg) => {
                adapter.count_rx();
                dispatch::handle_message(registry, adapter, msg);
            }
            Err(err) => {
                // A single undecodable frame is dropped; the stream itself
                // is still framed correctly.
                debug!(client = %adapter.name(), %err, "failed to decode message, skipping frame");
            }
        }
    }
    adapter.has_inbox()
}
