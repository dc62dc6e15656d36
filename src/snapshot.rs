//! Config snapshot driver.
//!
//! When a freshly identified client needs its initial configuration, the
//! daemon walks the config database and stages the subset the client
//! subscribes to into the adapter's pending change set. The transaction
//! module later chunks that sequence into batches and drives it out through
//! the dispatch builders.

use tracing::debug;

use crate::adapter::Adapter;
use crate::subscription::SubscriptionTable;

/// A single data node yielded by the config-database iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    /// Leaf value, if the node carries one.
    pub value: Option<String>,
}

/// Contract the config database exposes to this subsystem.
pub trait ConfigDb {
    /// Visit every data node under `base_xpath`, in the database's natural
    /// traversal order.
    fn iterate(&self, base_xpath: &str, visitor: &mut dyn FnMut(&str, &DataNode));
}

/// A config database with no contents, for bring-up and tooling.
pub struct EmptyDb;

impl ConfigDb for EmptyDb {
    fn iterate(&self, _base_xpath: &str, _visitor: &mut dyn FnMut(&str, &DataNode)) {}
}

/// Kind of change staged for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    /// The node is newly created for the backend.
    Created,
    /// The node's value changed.
    Modified,
    /// The node was removed.
    Deleted,
}

/// One staged configuration change, ordered by `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Position in traversal order.
    pub seq: u32,
    /// Path of the changed node.
    pub xpath: String,
    /// Leaf value, if any.
    pub value: Option<String>,
    /// Kind of change.
    pub op: ChangeOp,
}

/// Stage the subtree `adapter` subscribes to into its pending change set.
///
/// The snapshot is built at most once per adapter: a non-empty pending set is
/// left untouched. An adapter that has not bound an identity yet has no
/// subscriptions to evaluate and is skipped.
pub fn snapshot_config(adapter: &Adapter, db: &dyn ConfigDb, subs: &SubscriptionTable) {
    let Some(id) = adapter.id() else {
        debug!(client = %adapter.name(), "skipping snapshot for unidentified adapter");
        return;
    };
    let mut pending = adapter.pending_changes_mut();
    if !pending.is_empty() {
        return;
    }
    let mut seq = 0u32;
    db.iterate("/", &mut |xpath, node| {
        if subs.subscribers_for(xpath).is_subscribed(id) {
            pending.push(ConfigChange {
                seq,
                xpath: xpath.to_owned(),
                value: node.value.clone(),
                op: ChangeOp::Created,
            });
            seq += 1;
        }
    });
    debug!(client = %adapter.name(), staged = pending.len(), "config snapshot staged");
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use super::*;
    use crate::client::ClientId;
    use crate::config::Tunables;

    struct MemDb {
        nodes: Vec<(String, Option<String>)>,
    }

    impl ConfigDb for MemDb {
        fn iterate(&self, _base_xpath: &str, visitor: &mut dyn FnMut(&str, &DataNode)) {
            for (xpath, value) in &self.nodes {
                visitor(xpath, &DataNode { value: value.clone() });
            }
        }
    }

    fn test_adapter() -> std::rc::Rc<Adapter> {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1234);
        Adapter::new(9, peer, Tunables::default())
    }

    fn test_db() -> MemDb {
        MemDb {
            nodes: vec![
                (
                    "/frr-interface:lib/interface[name='eth0']".to_owned(),
                    Some("eth0".to_owned()),
                ),
                (
                    "/frr-routing:routing/control-plane-protocols/control-plane-protocol[type='frr-bgp:bgp'][name='bgp'][vrf='default']/frr-bgp:bgp/local-as".to_owned(),
                    Some("65000".to_owned()),
                ),
                ("/unrelated:module/leaf".to_owned(), None),
            ],
        }
    }

    #[test]
    fn stages_only_subscribed_paths_in_order() {
        let adapter = test_adapter();
        adapter.set_id(ClientId::Bgpd);
        let subs = SubscriptionTable::with_defaults();

        snapshot_config(&adapter, &test_db(), &subs);

        let pending = adapter.pending_changes();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].xpath.starts_with("/frr-interface:lib"));
        assert!(pending[1].xpath.starts_with("/frr-routing:routing"));
        assert_eq!(pending[0].seq, 0);
        assert_eq!(pending[1].seq, 1);
        assert!(pending.iter().all(|c| c.op == ChangeOp::Created));
    }

    #[test]
    fn snapshot_is_built_once() {
        let adapter = test_adapter();
        adapter.set_id(ClientId::Staticd);
        let subs = SubscriptionTable::with_defaults();

        snapshot_config(&adapter, &test_db(), &subs);
        let first = adapter.pending_changes().clone();
        snapshot_config(&adapter, &test_db(), &subs);
        assert_eq!(*adapter.pending_changes(), first);
    }

    #[test]
    fn unidentified_adapter_is_skipped() {
        let adapter = test_adapter();
        let subs = SubscriptionTable::with_defaults();
        snapshot_config(&adapter, &test_db(), &subs);
        assert!(adapter.pending_changes().is_empty());
    }

    #[test]
    fn empty_db_stages_nothing() {
        let adapter = test_adapter();
        adapter.set_id(ClientId::Staticd);
        snapshot_config(&adapter, &EmptyDb, &SubscriptionTable::with_defaults());
        assert!(adapter.pending_changes().is_empty());
    }
}
