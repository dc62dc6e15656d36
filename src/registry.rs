//! Registry façade over all backend adapters.
//!
//! Owns the adapter list and the by-id index, creates adapters for freshly
//! accepted sockets, binds identities on registration, and tears adapters
//! down. Everything runs on the single reactor thread.

use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::client::ClientId;
use crate::config::Tunables;
use crate::driver;
use crate::snapshot::{self, ConfigDb};
use crate::subscription::{SubscriptionTable, SubscriptionCaps};
use crate::txn::TxnModule;

struct Inner {
    adapters: Vec<Rc<Adapter>>,
    by_id: [Option<Rc<Adapter>>; ClientId::COUNT],
}

/// Lifecycle entry points for the backend-adapter subsystem.
pub struct AdapterRegistry {
    inner: RefCell<Inner>,
    subs: SubscriptionTable,
    txn: Rc<dyn TxnModule>,
    tunables: Tunables,
}

impl AdapterRegistry {
    /// Build a registry over the given subscription table and transaction
    /// module.
    #[must_use]
    pub fn new(subs: SubscriptionTable, txn: Rc<dyn TxnModule>, tunables: Tunables) -> Rc<Self> {
        Rc::new(Self {
            inner: RefCell::new(Inner {
                adapters: Vec::new(),
                by_id: std::array::from_fn(|_| None),
            }),
            subs,
            txn,
            tunables,
        })
    }

    /// Tunables shared with adapters and drivers.
    #[must_use]
    pub fn tunables(&self) -> Tunables { self.tunables }

    /// The subscription table consulted for path queries.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionTable { &self.subs }

    /// Handle to the transaction module.
    #[must_use]
    pub fn txn(&self) -> Rc<dyn TxnModule> { Rc::clone(&self.txn) }

    /// Adopt a freshly accepted socket: bump its kernel buffers, build the
    /// adapter record, and spawn its driver task. Returns the existing
    /// adapter when one is already bound to the same descriptor.
    ///
    /// Must be called from within a `tokio::task::LocalSet` context.
    pub fn create_adapter(self: &Rc<Self>, socket: TcpStream, peer: SocketAddr) -> Rc<Adapter> {
        let fd = socket.as_raw_fd();
        if let Some(existing) = self.find_by_fd(fd) {
            return existing;
        }

        let sock = socket2::SockRef::from(&socket);
        if let Err(err) = sock.set_send_buffer_size(self.tunables.send_bufsz) {
            warn!(fd, %err, "failed to size the socket send buffer");
        }
        if let Err(err) = sock.set_recv_buffer_size(self.tunables.recv_bufsz) {
            warn!(fd, %err, "failed to size the socket receive buffer");
        }

        let adapter = Adapter::new(fd, peer, self.tunables);
        self.inner.borrow_mut().adapters.push(Rc::clone(&adapter));
        debug!(fd, %peer, "new backend adapter");

        tokio::task::spawn_local(driver::run_adapter(
            Rc::clone(self),
            Rc::clone(&adapter),
            socket,
        ));
        adapter
    }

    /// Adapter currently bound to a raw descriptor.
    #[must_use]
    pub fn find_by_fd(&self, fd: RawFd) -> Option<Rc<Adapter>> {
        self.inner
            .borrow()
            .adapters
            .iter()
            .find(|a| a.fd() == fd)
            .cloned()
    }

    /// The identified adapter for a client id, if one is connected.
    #[must_use]
    pub fn find_by_id(&self, id: ClientId) -> Option<Rc<Adapter>> {
        self.inner.borrow().by_id[id.index()].clone()
    }

    /// First adapter bearing `name`.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Rc<Adapter>> {
        self.inner
            .borrow()
            .adapters
            .iter()
            .find(|a| a.name() == name)
            .cloned()
    }

    /// Number of live adapters.
    #[must_use]
    pub fn adapter_count(&self) -> usize { self.inner.borrow().adapters.len() }

    /// Bind `id` to `adapter` and retire any older connection bearing the
    /// same name. The new adapter is indexed before the zombies are torn
    /// down so the fresh registration survives their cleanup.
    pub(crate) fn bind_identity(&self, adapter: &Rc<Adapter>, id: ClientId) {
        adapter.set_id(id);
        self.inner.borrow_mut().by_id[id.index()] = Some(Rc::clone(adapter));
        debug!(client = %adapter.name(), fd = adapter.fd(), "adapter identified");

        let name = adapter.name();
        let zombies: Vec<Rc<Adapter>> = self
            .inner
            .borrow()
            .adapters
            .iter()
            .filter(|old| !Rc::ptr_eq(old, adapter) && old.name() == name)
            .cloned()
            .collect();
        for old in zombies {
            debug!(
                client = %name,
                old_fd = old.fd(),
                new_fd = adapter.fd(),
                "client reconnected, removing stale connection"
            );
            self.disconnect(&old);
        }
    }

    /// Tear an adapter down: mark it closed (its driver drops the socket),
    /// notify the transaction module, and drop it from the index and the
    /// list. Idempotent.
    pub fn disconnect(&self, adapter: &Rc<Adapter>) {
        if !adapter.close() {
            return;
        }
        if let Err(err) = self.txn.notify_conn(adapter, false) {
            debug!(client = %adapter.name(), %err, "down notification rejected");
        }

        let mut inner = self.inner.borrow_mut();
        if let Some(id) = adapter.take_id() {
            let slot = &mut inner.by_id[id.index()];
            if slot.as_ref().is_some_and(|cur| Rc::ptr_eq(cur, adapter)) {
                *slot = None;
            }
        }
        inner.adapters.retain(|a| !Rc::ptr_eq(a, adapter));
        debug!(client = %adapter.name(), fd = adapter.fd(), "adapter disconnected");
    }

    /// Disconnect every adapter; combined with driver teardown this tears
    /// the subsystem down.
    pub fn shutdown(&self) {
        let all: Vec<Rc<Adapter>> = self.inner.borrow().adapters.clone();
        for adapter in all {
            self.disconnect(&adapter);
        }
    }

    /// Stage the config subtree `adapter` subscribes to into its pending
    /// change set (built once per adapter).
    pub fn snapshot_config(&self, adapter: &Rc<Adapter>, db: &dyn ConfigDb) {
        snapshot::snapshot_config(adapter, db, &self.subs);
    }

    /// Render per-adapter status into `out`.
    ///
    /// # Errors
    /// Propagates formatter errors from `out`.
    pub fn status_write(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let inner = self.inner.borrow();
        writeln!(out, "Backend adapters")?;
        for adapter in &inner.adapters {
            let (tx, rx) = adapter.counters();
            writeln!(out, "  Client: {}", adapter.name())?;
            writeln!(out, "    Conn-FD: {}", adapter.fd())?;
            match adapter.id() {
                Some(id) => writeln!(out, "    Client-Id: {id}")?,
                None => writeln!(out, "    Client-Id: unresolved")?,
            }
            writeln!(out, "    Ref-Count: {}", Rc::strong_count(adapter))?;
            writeln!(out, "    Msg-Sent: {tx}")?;
            writeln!(out, "    Msg-Recvd: {rx}")?;
        }
        writeln!(out, "  Total: {}", inner.adapters.len())
    }

    /// Render the pattern registry and which patterns have a live adapter.
    ///
    /// # Errors
    /// Propagates formatter errors from `out`.
    pub fn registry_write(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.subs.write_registry(out)?;
        for (pattern, subs) in self.subs.entries() {
            for id in subs.clients() {
                if let Some(adapter) = self.find_by_id(id) {
                    writeln!(
                        out,
                        " - Pattern: '{pattern}' served by '{id}' (fd {})",
                        adapter.fd()
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Resolve `path` against the subscription table and render the result.
    ///
    /// # Errors
    /// Propagates formatter errors from `out`.
    pub fn subscr_info_write(&self, out: &mut dyn fmt::Write, path: &str) -> fmt::Result {
        let info = self.subs.subscribers_for(path);
        writeln!(out, "Path: '{path}'")?;
        for id in info.clients() {
            let caps = info.caps(id);
            writeln!(
                out,
                "  -- Client: '{id}'  Validate:{} Notify:{} Own:{}",
                cap(caps, SubscriptionCaps::VALIDATE_CONFIG),
                cap(caps, SubscriptionCaps::NOTIFY_CONFIG),
                cap(caps, SubscriptionCaps::OWN_OPER_DATA),
            )?;
            if let Some(adapter) = self.find_by_id(id) {
                writeln!(out, "    -- Adapter: {} (fd {})", adapter.name(), adapter.fd())?;
            }
        }
        Ok(())
    }
}

const fn cap(caps: SubscriptionCaps, bit: SubscriptionCaps) -> char {
    if caps.contains(bit) { 'T' } else { 'F' }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::NoopTxn;

    fn test_registry() -> Rc<AdapterRegistry> {
        AdapterRegistry::new(
            SubscriptionTable::with_defaults(),
            Rc::new(NoopTxn),
            Tunables::default(),
        )
    }

    #[test]
    fn empty_registry_status() {
        let registry = test_registry();
        let mut out = String::new();
        registry.status_write(&mut out).unwrap();
        assert!(out.contains("Backend adapters"));
        assert!(out.contains("Total: 0"));
        assert_eq!(registry.adapter_count(), 0);
        assert!(registry.find_by_id(ClientId::Staticd).is_none());
        assert!(registry.find_by_name("staticd").is_none());
    }

    #[test]
    fn registry_dump_covers_the_pattern_table() {
        let registry = test_registry();
        let mut out = String::new();
        registry.registry_write(&mut out).unwrap();
        assert!(out.contains("Total patterns: 3"));
    }

    #[test]
    fn subscriber_dump_resolves_a_path() {
        let registry = test_registry();
        let mut out = String::new();
        registry
            .subscr_info_write(&mut out, "/frr-interface:lib/interface[name='eth0']")
            .unwrap();
        assert!(out.contains("Client: 'staticd'"));
        assert!(out.contains("Client: 'bgpd'"));
        assert!(out.contains("Validate:T Notify:T Own:T"));
    }
}
