//! Identities of the backend clients known to the daemon.

use std::fmt;

/// Closed enumeration of backend routing engines that may connect.
///
/// An adapter that has not yet identified itself carries no id at all
/// (`Option<ClientId>`); identity is bound when the client registers with its
/// well-known name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientId {
    /// Static-routes engine.
    Staticd,
    /// BGP routing engine.
    Bgpd,
}

impl ClientId {
    /// Number of known backend clients.
    pub const COUNT: usize = 2;

    /// All known client ids, in id order.
    pub const ALL: [Self; Self::COUNT] = [Self::Staticd, Self::Bgpd];

    /// Resolve a client's self-identifying registration name to its id.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "staticd" => Some(Self::Staticd),
            "bgpd" => Some(Self::Bgpd),
            _ => None,
        }
    }

    /// The client's well-known registration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Staticd => "staticd",
            Self::Bgpd => "bgpd",
        }
    }

    /// Index into per-client tables.
    #[must_use]
    pub const fn index(self) -> usize { self as usize }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
