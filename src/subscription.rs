//! Path-pattern subscription registry.
//!
//! Maps hierarchical configuration paths to the set of backend clients
//! interested in them. The table is built once at startup from a static
//! pattern list and is read-only afterwards, so it can be consulted from any
//! dispatch context without locking.

use std::fmt::{self, Write as _};

use bitflags::bitflags;
use thiserror::Error;

use crate::client::ClientId;

/// Capacity of the pattern table.
pub const MAX_PATTERNS: usize = 256;

bitflags! {
    /// Capabilities a backend client asserts over a path subtree.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SubscriptionCaps: u8 {
        /// The client validates configuration under the path.
        const VALIDATE_CONFIG = 1 << 0;
        /// The client wants change notifications under the path.
        const NOTIFY_CONFIG = 1 << 1;
        /// The client owns operational data under the path.
        const OWN_OPER_DATA = 1 << 2;
    }
}

impl SubscriptionCaps {
    /// Whether any capability bit is set.
    #[must_use]
    pub const fn subscribed(self) -> bool { !self.is_empty() }
}

/// Per-client capabilities resolved for one concrete path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberInfo {
    caps: [SubscriptionCaps; ClientId::COUNT],
}

impl SubscriberInfo {
    /// Capabilities of `id` for the queried path (empty when unsubscribed).
    #[must_use]
    pub fn caps(&self, id: ClientId) -> SubscriptionCaps { self.caps[id.index()] }

    /// Whether `id` holds any capability for the queried path.
    #[must_use]
    pub fn is_subscribed(&self, id: ClientId) -> bool { self.caps(id).subscribed() }

    /// Clients holding at least one capability, in id order.
    pub fn clients(&self) -> impl Iterator<Item = ClientId> + '_ {
        ClientId::ALL.into_iter().filter(|id| self.is_subscribed(*id))
    }

    fn grant(&mut self, id: ClientId, caps: SubscriptionCaps) {
        self.caps[id.index()] |= caps;
    }

    fn merge(&mut self, other: &Self) {
        for id in ClientId::ALL {
            self.caps[id.index()] |= other.caps[id.index()];
        }
    }
}

/// Static mapping of path patterns to the backend clients interested in
/// them. Each listed client gets all three capabilities for the pattern.
///
/// TODO(registration): fold the `xpath_reg` list carried by the registration
/// message into this table instead of keeping it compile-time only.
const DEFAULT_PATTERNS: &[(&str, &[ClientId])] = &[
    ("/frr-interface:lib/*", &[ClientId::Staticd, ClientId::Bgpd]),
    (
        "/frr-routing:routing/control-plane-protocols/control-plane-protocol[type='frr-staticd:staticd'][name='staticd'][vrf='default']/frr-staticd:staticd/*",
        &[ClientId::Staticd],
    ),
    (
        "/frr-routing:routing/control-plane-protocols/control-plane-protocol[type='frr-bgp:bgp'][name='bgp'][vrf='default']/frr-bgp:bgp/*",
        &[ClientId::Bgpd],
    ),
];

/// Error raised when building a subscription table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// More patterns than the table can hold.
    #[error("pattern table overflow: {0} entries exceed the capacity of {MAX_PATTERNS}")]
    TableFull(usize),
}

struct PatternEntry {
    pattern: String,
    subs: SubscriberInfo,
}

/// Read-only pattern table answering longest-match subscriber queries.
pub struct SubscriptionTable {
    entries: Vec<PatternEntry>,
}

impl SubscriptionTable {
    /// Build the table from the compile-time default pattern list.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            entries: DEFAULT_PATTERNS.iter().map(|e| Self::entry(e)).collect(),
        }
    }

    /// Build a table from an explicit pattern list.
    ///
    /// # Errors
    /// Returns [`SubscriptionError::TableFull`] when `patterns` exceeds
    /// [`MAX_PATTERNS`].
    pub fn from_patterns(
        patterns: &[(&str, &[ClientId])],
    ) -> Result<Self, SubscriptionError> {
        if patterns.len() > MAX_PATTERNS {
            return Err(SubscriptionError::TableFull(patterns.len()));
        }
        Ok(Self {
            entries: patterns.iter().map(|e| Self::entry(e)).collect(),
        })
    }

    fn entry((pattern, clients): &(&str, &[ClientId])) -> PatternEntry {
        let mut subs = SubscriberInfo::default();
        for id in *clients {
            subs.grant(*id, SubscriptionCaps::all());
        }
        PatternEntry {
            pattern: (*pattern).to_owned(),
            subs,
        }
    }

    /// Number of patterns in the table.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the table holds no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Patterns and their per-client capabilities, in table order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &SubscriberInfo)> {
        self.entries.iter().map(|e| (e.pattern.as_str(), &e.subs))
    }

    /// Resolve the clients subscribed to a concrete path.
    ///
    /// Every pattern is scored against `path` with [`match_score`]; the
    /// capabilities of all patterns tying for the highest non-zero score are
    /// unioned into the result. The function is pure: the table is immutable
    /// after construction.
    #[must_use]
    pub fn subscribers_for(&self, path: &str) -> SubscriberInfo {
        let mut best = 0usize;
        let mut winners: Vec<&SubscriberInfo> = Vec::new();
        for entry in &self.entries {
            let score = match_score(&entry.pattern, path);
            if score == 0 || score < best {
                continue;
            }
            if score > best {
                winners.clear();
                best = score;
            }
            winners.push(&entry.subs);
        }
        let mut info = SubscriberInfo::default();
        for subs in winners {
            info.merge(subs);
        }
        info
    }

    /// Render the pattern table into `out`.
    ///
    /// # Errors
    /// Propagates formatter errors from `out`.
    pub fn write_registry(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "Backend subscription registry")?;
        for entry in &self.entries {
            writeln!(out, " - Pattern: '{}'", entry.pattern)?;
            for id in entry.subs.clients() {
                write_caps(out, id, entry.subs.caps(id))?;
            }
        }
        writeln!(out, "Total patterns: {}", self.entries.len())
    }
}

fn write_caps(out: &mut dyn fmt::Write, id: ClientId, caps: SubscriptionCaps) -> fmt::Result {
    writeln!(
        out,
        "   -- Client: '{id}'  Validate:{} Notify:{} Own:{}",
        flag(caps.contains(SubscriptionCaps::VALIDATE_CONFIG)),
        flag(caps.contains(SubscriptionCaps::NOTIFY_CONFIG)),
        flag(caps.contains(SubscriptionCaps::OWN_OPER_DATA)),
    )
}

const fn flag(set: bool) -> char {
    if set { 'T' } else { 'F' }
}

/// Score how deeply `pattern` structurally matches `path`.
///
/// The scan walks both strings in lock step and counts a point whenever the
/// current characters match and the preceding characters form a boundary pair
/// (`/`–`/`, `[`–`[`, or `]`–`[`), plus one point when the scan ends with the
/// strings still in agreement. Once the scan has seen an apostrophe on both
/// sides it is inside key-predicate territory; from then on a `*` on either
/// side consumes characters of the other side up to (but not including) the
/// character preceding that side's next apostrophe. A score of zero means no
/// structural agreement at all.
#[must_use]
pub fn match_score(pattern: &str, path: &str) -> usize {
    let re = pattern.as_bytes();
    let xp = path.as_bytes();
    if re.is_empty() || xp.is_empty() {
        return 0;
    }

    let mut score = 0usize;
    let mut ri = 0usize;
    let mut xi = 0usize;
    let mut matched = true;
    let mut re_wild = false;
    let mut xp_wild = false;
    let mut key = false;

    while matched && ri < re.len() && xi < xp.len() {
        let mut incr_re = true;
        let mut incr_xp = true;

        if !key && re[ri] == b'\'' && xp[xi] == b'\'' {
            key = true;
        }
        if key && re[ri] == b'*' && xp[xi] != b'*' {
            incr_re = false;
            re_wild = true;
        } else if key && re[ri] != b'*' && xp[xi] == b'*' {
            incr_xp = false;
            xp_wild = true;
        }

        matched = re_wild || xp_wild || re[ri] == xp[xi];

        if matched && ri > 0 && xi > 0 {
            let boundary = (re[ri - 1] == b'/' && xp[xi - 1] == b'/')
                || (re[ri - 1] == b'[' && xp[xi - 1] == b'[')
                || (re[ri - 1] == b']' && xp[xi - 1] == b'[');
            if boundary {
                score += 1;
            }
        }

        if key && re_wild && xp.get(xi + 1).copied() == Some(b'\'') {
            re_wild = false;
            incr_re = true;
        }
        if key && xp_wild && re.get(ri + 1).copied() == Some(b'\'') {
            xp_wild = false;
            incr_xp = true;
        }

        if incr_re {
            ri += 1;
        }
        if incr_xp {
            xi += 1;
        }
    }

    if matched {
        score += 1;
    }
    score
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    const BGP_PATTERN: &str = "/frr-routing:routing/control-plane-protocols/control-plane-protocol[type='frr-bgp:bgp'][name='bgp'][vrf='default']/frr-bgp:bgp/*";
    const BGP_NEIGHBOR: &str = "/frr-routing:routing/control-plane-protocols/control-plane-protocol[type='frr-bgp:bgp'][name='bgp'][vrf='default']/frr-bgp:bgp/neighbors/neighbor[address='1.2.3.4']";

    #[test]
    fn caps_subscribed_tracks_any_bit() {
        assert!(!SubscriptionCaps::default().subscribed());
        assert!(SubscriptionCaps::NOTIFY_CONFIG.subscribed());
        assert!(SubscriptionCaps::all().subscribed());
    }

    #[rstest]
    #[case(SubscriptionCaps::VALIDATE_CONFIG, 0)]
    #[case(SubscriptionCaps::NOTIFY_CONFIG, 1)]
    #[case(SubscriptionCaps::OWN_OPER_DATA, 2)]
    fn cap_bit_positions(#[case] cap: SubscriptionCaps, #[case] bit: u32) {
        assert_eq!(cap.bits(), 1u8 << bit);
    }

    #[rstest]
    #[case("", "/a", 0)]
    #[case("/a", "", 0)]
    #[case("/a/b", "/a/b", 3)] // boundaries at 'a' and 'b', plus the end bonus
    #[case("/a/b", "/a/c", 1)] // the leaf mismatch forfeits the end bonus
    #[case("/x", "/y", 0)] // no agreement beyond position zero
    fn scorer_counts_structural_anchors(
        #[case] pattern: &str,
        #[case] path: &str,
        #[case] score: usize,
    ) {
        assert_eq!(match_score(pattern, path), score);
    }

    #[test]
    fn scorer_wildcard_consumes_key_values() {
        let pattern = "/p/list[name='*']/leaf";
        let path = "/p/list[name='eth0']/leaf";
        let exact = match_score(pattern, path);
        assert!(exact > 0);
        // The wildcard side must not outscore a literal match of itself.
        assert_eq!(exact, match_score(path, path));
    }

    #[test]
    fn deeper_pattern_wins_longest_match() {
        let table = SubscriptionTable::from_patterns(&[
            ("/frr-interface:lib/*", &[ClientId::Staticd, ClientId::Bgpd]),
            (BGP_PATTERN, &[ClientId::Bgpd]),
        ])
        .unwrap();

        let info = table.subscribers_for(BGP_NEIGHBOR);
        let clients: Vec<_> = info.clients().collect();
        assert_eq!(clients, vec![ClientId::Bgpd]);
        assert_eq!(info.caps(ClientId::Bgpd), SubscriptionCaps::all());
        assert!(!info.is_subscribed(ClientId::Staticd));
    }

    #[test]
    fn tied_patterns_union_their_clients() {
        let table = SubscriptionTable::from_patterns(&[
            ("/a/b", &[ClientId::Staticd]),
            ("/a/b", &[ClientId::Bgpd]),
        ])
        .unwrap();
        let info = table.subscribers_for("/a/b");
        assert!(info.is_subscribed(ClientId::Staticd));
        assert!(info.is_subscribed(ClientId::Bgpd));
    }

    #[test]
    fn zero_score_patterns_are_ignored() {
        let table = SubscriptionTable::from_patterns(&[("xyz", &[ClientId::Staticd])]).unwrap();
        let info = table.subscribers_for("/a/b");
        assert_eq!(info, SubscriberInfo::default());
    }

    #[test]
    fn table_capacity_is_enforced() {
        let clients: &[ClientId] = &[ClientId::Staticd];
        let patterns: Vec<(&str, &[ClientId])> =
            (0..=MAX_PATTERNS).map(|_| ("/a", clients)).collect();
        let err = SubscriptionTable::from_patterns(&patterns).err().unwrap();
        assert_eq!(err, SubscriptionError::TableFull(MAX_PATTERNS + 1));
    }

    #[test]
    fn default_table_maps_interface_paths_to_both_clients() {
        let table = SubscriptionTable::with_defaults();
        let info = table.subscribers_for("/frr-interface:lib/interface[name='eth0']");
        assert!(info.is_subscribed(ClientId::Staticd));
        assert!(info.is_subscribed(ClientId::Bgpd));
    }

    #[test]
    fn registry_dump_lists_patterns_and_caps() {
        let table = SubscriptionTable::with_defaults();
        let mut out = String::new();
        table.write_registry(&mut out).unwrap();
        assert!(out.contains("/frr-interface:lib/*"));
        assert!(out.contains("Client: 'bgpd'"));
        assert!(out.contains("Total patterns: 3"));
    }

    proptest! {
        // subscribers_for is a pure function of the table and the path.
        #[test]
        fn query_is_deterministic(path in "[/a-z:'\\[\\]*=0-9-]{0,64}") {
            let table = SubscriptionTable::with_defaults();
            prop_assert_eq!(table.subscribers_for(&path), table.subscribers_for(&path));
        }

        // The winning set is exactly the union over max-scoring patterns.
        #[test]
        fn winners_are_the_max_scoring_union(path in "[/a-z:'\\[\\]*=0-9-]{0,64}") {
            let table = SubscriptionTable::with_defaults();
            let max = table
                .entries()
                .map(|(pattern, _)| match_score(pattern, &path))
                .max()
                .unwrap_or(0);
            let mut expect = SubscriberInfo::default();
            if max > 0 {
                for (pattern, subs) in table.entries() {
                    if match_score(pattern, &path) == max {
                        expect.merge(subs);
                    }
                }
            }
            prop_assert_eq!(table.subscribers_for(&path), expect);
        }
    }
}
