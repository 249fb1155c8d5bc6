//! Identity types for peers and input commands

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a peer in a session
///
/// Peer ids are ordinary strings chosen by the embedding application, but
/// their `Ord` impl matters: the per-tick input sort keys on peer id, which
/// is what gives every peer the same total order over commands regardless
/// of arrival sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a new peer ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for one input command
///
/// Formatted as `"{peer}:{tick}:{seq}"`. The sequence number is
/// zero-padded to the full `u32` width so lexicographic order matches
/// issue order within a peer and tick for every possible sequence value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputId(pub String);

impl InputId {
    /// Build an input ID from its parts
    pub fn new(peer: &PeerId, tick: u64, seq: u32) -> Self {
        Self(format!("{}:{}:{:010}", peer, tick, seq))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_ordering() {
        let a = PeerId::new("alice");
        let b = PeerId::new("bob");
        assert!(a < b);
        assert_eq!(a.as_str(), "alice");
    }

    #[test]
    fn test_input_id_format() {
        let id = InputId::new(&PeerId::new("p1"), 42, 7);
        assert_eq!(id.as_str(), "p1:42:0000000007");
    }

    #[test]
    fn test_input_id_seq_order() {
        let peer = PeerId::new("p1");
        let a = InputId::new(&peer, 5, 2);
        let b = InputId::new(&peer, 5, 10);
        // Zero padding keeps lexicographic order equal to numeric order
        assert!(a < b);

        // Holds across digit-count boundaries and at the u32 extremes
        let c = InputId::new(&peer, 5, 9_999);
        let d = InputId::new(&peer, 5, 10_000);
        assert!(c < d);
        let e = InputId::new(&peer, 5, u32::MAX - 1);
        let f = InputId::new(&peer, 5, u32::MAX);
        assert!(e < f);
    }
}
