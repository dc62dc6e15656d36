//! Backend protocol messages.
//!
//! The protocol is a closed tagged union exchanged between the daemon and its
//! backend clients. The wire encoding is delegated to a schema-driven packer;
//! [`pack`] and [`unpack`] are the only entry points the rest of the
//! subsystem uses, so the encoding can be swapped without touching dispatch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single configuration datum addressed by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YangData {
    /// Hierarchical configuration path of the datum.
    pub xpath: String,
    /// Leaf value, if the node carries one.
    pub value: Option<String>,
}

/// Operation requested for one configuration datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CfgReqType {
    /// Create or update the datum.
    Set,
    /// Remove the datum.
    Delete,
}

/// One entry of a configuration-data batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgDataItem {
    /// Requested operation.
    pub req_type: CfgReqType,
    /// The datum the operation applies to.
    pub data: YangData,
}

/// Registration sent by a backend client after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscrReq {
    /// Self-identifying well-known client name.
    pub client_name: String,
    /// True to subscribe the listed paths, false to drop them.
    pub subscribe: bool,
    /// Path patterns the client claims interest in.
    pub xpath_reg: Vec<String>,
}

/// Daemon's answer to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscrReply {
    /// Whether the registration was accepted.
    pub success: bool,
}

/// Operational-data fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReq {
    /// Paths to fetch.
    pub paths: Vec<String>,
}

/// Reply to an operational-data fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReply {
    /// Whether the fetch succeeded.
    pub success: bool,
    /// Diagnostic carried on failure.
    pub error_if_any: Option<String>,
}

/// Create or destroy a configuration transaction on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrxnReq {
    /// Transaction being created or destroyed.
    pub trxn_id: u64,
    /// True to create, false to destroy.
    pub create: bool,
}

/// Backend's answer to a transaction create/destroy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrxnReply {
    /// Transaction the reply correlates with.
    pub trxn_id: u64,
    /// Whether the request was a create.
    pub create: bool,
    /// Whether the backend honoured it.
    pub success: bool,
}

/// One batch of configuration data for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgDataReq {
    /// Owning transaction.
    pub trxn_id: u64,
    /// Batch within the transaction.
    pub batch_id: u64,
    /// The data of this batch.
    pub data_req: Vec<CfgDataItem>,
    /// True when no further batches follow.
    pub end_of_data: bool,
}

/// Backend's answer to one configuration-data batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgDataReply {
    /// Owning transaction.
    pub trxn_id: u64,
    /// Batch the reply correlates with.
    pub batch_id: u64,
    /// Whether the batch was staged.
    pub success: bool,
    /// Diagnostic carried on failure.
    pub error_if_any: Option<String>,
}

/// Ask the backend to validate staged batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgValidateReq {
    /// Owning transaction.
    pub trxn_id: u64,
    /// Batches to validate.
    pub batch_ids: Vec<u64>,
}

/// Backend's validation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgValidateReply {
    /// Owning transaction.
    pub trxn_id: u64,
    /// Batches the verdict covers.
    pub batch_ids: Vec<u64>,
    /// Whether validation passed.
    pub success: bool,
    /// Diagnostic carried on failure.
    pub error_if_any: Option<String>,
}

/// Ask the backend to apply the validated transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgApplyReq {
    /// Transaction to apply.
    pub trxn_id: u64,
}

/// Backend's answer to an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgApplyReply {
    /// Owning transaction.
    pub trxn_id: u64,
    /// Batches the apply covered.
    pub batch_ids: Vec<u64>,
    /// Whether the apply succeeded.
    pub success: bool,
    /// Diagnostic carried on failure.
    pub error_if_any: Option<String>,
}

/// Raw configuration commands pushed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgCmdReq {
    /// Commands in execution order.
    pub commands: Vec<String>,
}

/// Backend's answer to raw configuration commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgCmdReply {
    /// Whether the commands were accepted.
    pub success: bool,
}

/// Operational show command forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowCmdReq {
    /// The command to run.
    pub command: String,
}

/// Backend's answer to a show command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowCmdReply {
    /// Whether the command ran.
    pub success: bool,
    /// Rendered command output.
    pub output: String,
}

/// Unsolicited data notification from a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyData {
    /// The notified data nodes.
    pub data: Vec<YangData>,
}

/// The closed union of protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendMessage {
    /// Client registration (backend → daemon).
    SubscrReq(SubscrReq),
    /// Registration answer (daemon → backend).
    SubscrReply(SubscrReply),
    /// Operational fetch (daemon → backend).
    GetReq(GetReq),
    /// Operational fetch answer (backend → daemon).
    GetReply(GetReply),
    /// Transaction create/destroy (daemon → backend).
    TrxnReq(TrxnReq),
    /// Transaction answer (backend → daemon).
    TrxnReply(TrxnReply),
    /// Configuration-data batch (daemon → backend).
    CfgDataReq(CfgDataReq),
    /// Batch answer (backend → daemon).
    CfgDataReply(CfgDataReply),
    /// Validation request (daemon → backend).
    CfgValidateReq(CfgValidateReq),
    /// Validation verdict (backend → daemon).
    CfgValidateReply(CfgValidateReply),
    /// Apply request (daemon → backend).
    CfgApplyReq(CfgApplyReq),
    /// Apply answer (backend → daemon).
    CfgApplyReply(CfgApplyReply),
    /// Raw command push (daemon → backend).
    CfgCmdReq(CfgCmdReq),
    /// Raw command answer (backend → daemon).
    CfgCmdReply(CfgCmdReply),
    /// Show command (daemon → backend).
    ShowCmdReq(ShowCmdReq),
    /// Show command answer (backend → daemon).
    ShowCmdReply(ShowCmdReply),
    /// Unsolicited notification (backend → daemon).
    NotifyData(NotifyData),
}

/// Errors surfaced by the packer.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The message could not be serialised.
    #[error("failed to encode message: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// The payload is not a well-formed message.
    #[error("failed to decode message: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Serialise a message into its wire payload.
///
/// # Errors
/// Returns [`MessageError::Encode`] when serialisation fails.
pub fn pack(msg: &BackendMessage) -> Result<Vec<u8>, MessageError> {
    Ok(bincode::serde::encode_to_vec(msg, bincode::config::standard())?)
}

/// Deserialise a wire payload into a message.
///
/// # Errors
/// Returns [`MessageError::Decode`] when the payload is malformed.
pub fn unpack(payload: &[u8]) -> Result<BackendMessage, MessageError> {
    let (msg, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_round_trips() {
        let msg = BackendMessage::SubscrReq(SubscrReq {
            client_name: "staticd".to_owned(),
            subscribe: true,
            xpath_reg: vec!["/frr-interface:lib/*".to_owned()],
        });
        let bytes = pack(&msg).unwrap();
        assert_eq!(unpack(&bytes).unwrap(), msg);
    }

    #[test]
    fn cfg_data_round_trips() {
        let msg = BackendMessage::CfgDataReq(CfgDataReq {
            trxn_id: 7,
            batch_id: 2,
            data_req: vec![CfgDataItem {
                req_type: CfgReqType::Set,
                data: YangData {
                    xpath: "/frr-interface:lib/interface[name='eth0']".to_owned(),
                    value: Some("up".to_owned()),
                },
            }],
            end_of_data: true,
        });
        let bytes = pack(&msg).unwrap();
        assert_eq!(unpack(&bytes).unwrap(), msg);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(unpack(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).is_err());
    }
}
