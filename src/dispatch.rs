//! Inbound message dispatch and outbound request builders.
//!
//! Inbound frames decode into the protocol union and fan out to the
//! transaction module; outbound transaction traffic is built here and
//! enqueued on the adapter. No reply is ever awaited synchronously —
//! correlation happens in the transaction module by transaction and batch
//! id.

use std::rc::Rc;

use tracing::{debug, error};

use crate::adapter::{Adapter, SendError};
use crate::client::ClientId;
use crate::message::{
    BackendMessage,
    CfgApplyReq,
    CfgDataItem,
    CfgDataReq,
    CfgValidateReq,
    SubscrReq,
    TrxnReq,
};
use crate::registry::AdapterRegistry;

/// Route one decoded inbound message.
///
/// Reply variants forward to the transaction module; request variants that
/// only ever flow daemon→backend are protocol misuse and are ignored without
/// closing the connection; the remaining reply variants are reserved for
/// future handling.
pub(crate) fn handle_message(
    registry: &Rc<AdapterRegistry>,
    adapter: &Rc<Adapter>,
    msg: BackendMessage,
) {
    match msg {
        BackendMessage::SubscrReq(req) => handle_subscr_req(registry, adapter, &req),
        BackendMessage::TrxnReply(rep) => {
            debug!(
                client = %adapter.name(),
                trxn_id = rep.trxn_id,
                create = rep.create,
                success = rep.success,
                "transaction reply"
            );
            registry
                .txn()
                .notify_trxn_reply(rep.trxn_id, rep.create, rep.success, adapter);
        }
        BackendMessage::CfgDataReply(rep) => {
            debug!(
                client = %adapter.name(),
                trxn_id = rep.trxn_id,
                batch_id = rep.batch_id,
                success = rep.success,
                "config-data reply"
            );
            registry.txn().notify_cfgdata_reply(
                rep.trxn_id,
                rep.batch_id,
                rep.success,
                rep.error_if_any.as_deref(),
                adapter,
            );
        }
        BackendMessage::CfgValidateReply(rep) => {
            debug!(
                client = %adapter.name(),
                trxn_id = rep.trxn_id,
                batches = rep.batch_ids.len(),
                success = rep.success,
                "validate reply"
            );
            registry.txn().notify_validate_reply(
                rep.trxn_id,
                rep.success,
                &rep.batch_ids,
                rep.error_if_any.as_deref(),
                adapter,
            );
        }
        BackendMessage::CfgApplyReply(rep) => {
            debug!(
                client = %adapter.name(),
                trxn_id = rep.trxn_id,
                batches = rep.batch_ids.len(),
                success = rep.success,
                "apply reply"
            );
            registry.txn().notify_apply_reply(
                rep.trxn_id,
                rep.success,
                &rep.batch_ids,
                rep.error_if_any.as_deref(),
                adapter,
            );
        }
        BackendMessage::GetReply(_)
        | BackendMessage::CfgCmdReply(_)
        | BackendMessage::ShowCmdReply(_)
        | BackendMessage::NotifyData(_) => {
            // Accepted but unused for now; kept for exhaustiveness.
        }
        BackendMessage::SubscrReply(_)
        | BackendMessage::GetReq(_)
        | BackendMessage::TrxnReq(_)
        | BackendMessage::CfgDataReq(_)
        | BackendMessage::CfgValidateReq(_)
        | BackendMessage::CfgApplyReq(_)
        | BackendMessage::CfgCmdReq(_)
        | BackendMessage::ShowCmdReq(_) => {
            debug!(client = %adapter.name(), "ignoring daemon-to-backend variant sent by backend");
        }
    }
}

fn handle_subscr_req(registry: &Rc<AdapterRegistry>, adapter: &Rc<Adapter>, req: &SubscrReq) {
    debug!(
        client = %req.client_name,
        subscribe = req.subscribe,
        xpaths = req.xpath_reg.len(),
        "subscription request"
    );
    if req.client_name.is_empty() {
        return;
    }
    adapter.set_name(&req.client_name);
    match ClientId::from_name(&req.client_name) {
        Some(id) => registry.bind_identity(adapter, id),
        None => {
            error!(
                client = %req.client_name,
                "unable to resolve client to a valid id, disconnecting"
            );
            registry.disconnect(adapter);
        }
    }
}

/// Ask the backend to create a configuration transaction.
///
/// # Errors
/// Propagates [`SendError`] from the enqueue; the connection stays up.
pub fn create_trxn(adapter: &Adapter, trxn_id: u64) -> Result<(), SendError> {
    send_trxn_req(adapter, trxn_id, true)
}

/// Ask the backend to destroy a configuration transaction.
///
/// # Errors
/// Propagates [`SendError`] from the enqueue; the connection stays up.
pub fn destroy_trxn(adapter: &Adapter, trxn_id: u64) -> Result<(), SendError> {
    send_trxn_req(adapter, trxn_id, false)
}

fn send_trxn_req(adapter: &Adapter, trxn_id: u64, create: bool) -> Result<(), SendError> {
    debug!(client = %adapter.name(), trxn_id, create, "sending TrxnReq");
    adapter.enqueue_msg(&BackendMessage::TrxnReq(TrxnReq { trxn_id, create }))
}

/// Send one batch of configuration data to the backend.
///
/// # Errors
/// Propagates [`SendError`] from the enqueue; the connection stays up.
pub fn send_cfg_data(
    adapter: &Adapter,
    trxn_id: u64,
    batch_id: u64,
    data_req: Vec<CfgDataItem>,
    end_of_data: bool,
) -> Result<(), SendError> {
    debug!(
        client = %adapter.name(),
        trxn_id,
        batch_id,
        items = data_req.len(),
        end_of_data,
        "sending CfgDataReq"
    );
    adapter.enqueue_msg(&BackendMessage::CfgDataReq(CfgDataReq {
        trxn_id,
        batch_id,
        data_req,
        end_of_data,
    }))
}

/// Ask the backend to validate the listed batches.
///
/// # Errors
/// Propagates [`SendError`] from the enqueue; the connection stays up.
pub fn send_cfg_validate(
    adapter: &Adapter,
    trxn_id: u64,
    batch_ids: &[u64],
) -> Result<(), SendError> {
    debug!(
        client = %adapter.name(),
        trxn_id,
        batches = batch_ids.len(),
        "sending CfgValidateReq"
    );
    adapter.enqueue_msg(&BackendMessage::CfgValidateReq(CfgValidateReq {
        trxn_id,
        batch_ids: batch_ids.to_vec(),
    }))
}

/// Ask the backend to apply the validated transaction.
///
/// # Errors
/// Propagates [`SendError`] from the enqueue; the connection stays up.
pub fn send_cfg_apply(adapter: &Adapter, trxn_id: u64) -> Result<(), SendError> {
    debug!(client = %adapter.name(), trxn_id, "sending CfgApplyReq");
    adapter.enqueue_msg(&BackendMessage::CfgApplyReq(CfgApplyReq { trxn_id }))
}
