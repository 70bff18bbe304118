//! Per-day snapshot manifest.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::timestamp::UnixTimestamp;

/// Ordered, duplicate-free set of snapshot timestamps of one realm-day.
///
/// Serialized as a plain JSON array. Duplicates present in a stored
/// array are collapsed on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuctionManifest(BTreeSet<UnixTimestamp>);

impl AuctionManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a timestamp; returns false when it was already listed.
    pub fn append(&mut self, ts: UnixTimestamp) -> bool {
        self.0.insert(ts)
    }

    pub fn contains(&self, ts: UnixTimestamp) -> bool {
        self.0.contains(&ts)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = UnixTimestamp> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<UnixTimestamp> for AuctionManifest {
    fn from_iter<I: IntoIterator<Item = UnixTimestamp>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_idempotent() {
        let mut m = AuctionManifest::new();
        assert!(m.append(1_700_000_000));
        assert!(!m.append(1_700_000_000));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_json_array_shape_with_duplicates() {
        let m: AuctionManifest = serde_json::from_str("[1700003600,1700000000,1700000000]").unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(serde_json::to_string(&m).unwrap(), "[1700000000,1700003600]");
    }
}
