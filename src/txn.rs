//! Contract exposed by the configuration-transaction module.
//!
//! The transaction module sequences config transactions (create → data
//! batches → validate → apply → destroy) across adapters. The adapter
//! subsystem only notifies it of connection events and forwards backend
//! replies; correlation by transaction and batch id is entirely the
//! transaction module's concern.

use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::adapter::Adapter;

/// Identifier of the session owning a config transaction.
pub type SessionId = u64;

/// Failure reported by the transaction module.
#[derive(Debug, Error)]
#[error("transaction module rejected the request: {0}")]
pub struct TxnError(pub String);

/// Notifications the adapter subsystem delivers to the transaction module.
///
/// All methods run on the single reactor thread, to completion; an
/// implementation may call back into the registry (for example to stage a
/// config snapshot or enqueue outbound requests) but must not block.
pub trait TxnModule {
    /// A backend connection came up (`up = true`, fired after the initial
    /// connect settles) or went away (`up = false`, fired from disconnect).
    ///
    /// # Errors
    /// Returning an error from the `up` notification makes the registry
    /// disconnect the adapter, forcing the client to reconnect later.
    fn notify_conn(&self, adapter: &Rc<Adapter>, up: bool) -> Result<(), TxnError>;

    /// A backend answered a transaction create/destroy.
    fn notify_trxn_reply(&self, trxn_id: u64, create: bool, success: bool, adapter: &Rc<Adapter>);

    /// A backend answered one configuration-data batch.
    fn notify_cfgdata_reply(
        &self,
        trxn_id: u64,
        batch_id: u64,
        success: bool,
        error_if_any: Option<&str>,
        adapter: &Rc<Adapter>,
    );

    /// A backend delivered its validation verdict.
    fn notify_validate_reply(
        &self,
        trxn_id: u64,
        success: bool,
        batch_ids: &[u64],
        error_if_any: Option<&str>,
        adapter: &Rc<Adapter>,
    );

    /// A backend answered an apply.
    fn notify_apply_reply(
        &self,
        trxn_id: u64,
        success: bool,
        batch_ids: &[u64],
        error_if_any: Option<&str>,
        adapter: &Rc<Adapter>,
    );

    /// The session currently running a config transaction, if any. A new
    /// adapter's initial snapshot transaction is deferred while one is live.
    fn config_trxn_in_progress(&self) -> Option<SessionId>;
}

/// Stand-in transaction module for bring-up and tooling.
///
/// Accepts every notification and never reports a transaction in progress,
/// which lets the daemon run before the real transaction engine is wired in.
pub struct NoopTxn;

impl TxnModule for NoopTxn {
    fn notify_conn(&self, adapter: &Rc<Adapter>, up: bool) -> Result<(), TxnError> {
        debug!(client = %adapter.name(), up, "connection event");
        Ok(())
    }

    fn notify_trxn_reply(&self, trxn_id: u64, create: bool, success: bool, adapter: &Rc<Adapter>) {
        debug!(client = %adapter.name(), trxn_id, create, success, "transaction reply dropped");
    }

    fn notify_cfgdata_reply(
        &self,
        trxn_id: u64,
        batch_id: u64,
        success: bool,
        _error_if_any: Option<&str>,
        adapter: &Rc<Adapter>,
    ) {
        debug!(client = %adapter.name(), trxn_id, batch_id, success, "config-data reply dropped");
    }

    fn notify_validate_reply(
        &self,
        trxn_id: u64,
        success: bool,
        batch_ids: &[u64],
        _error_if_any: Option<&str>,
        adapter: &Rc<Adapter>,
    ) {
        debug!(client = %adapter.name(), trxn_id, success, batches = batch_ids.len(), "validate reply dropped");
    }

    fn notify_apply_reply(
        &self,
        trxn_id: u64,
        success: bool,
        batch_ids: &[u64],
        _error_if_any: Option<&str>,
        adapter: &Rc<Adapter>,
    ) {
        debug!(client = %adapter.name(), trxn_id, success, batches = batch_ids.len(), "apply reply dropped");
    }

    fn config_trxn_in_progress(&self) -> Option<SessionId> { None }
}
