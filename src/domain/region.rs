//! Regions, realms and the realm whitelist.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::timestamp::UnixTimestamp;

/// Region name, e.g. `us`.
pub type RegionName = String;

/// Realm slug, unique within a region.
pub type RealmSlug = String;

/// Geographic grouping of realms sharing one upstream API host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub name: RegionName,
    pub hostname: String,
    #[serde(default)]
    pub primary: bool,
}

/// Realm as listed by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmRecord {
    pub slug: RealmSlug,
    pub name: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub population: String,
}

/// A realm as tracked by the pipeline.
///
/// Wraps the upstream record and adds the owning region plus the highest
/// snapshot timestamp observed so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    pub record: RealmRecord,
    pub region_name: RegionName,
    #[serde(default)]
    pub last_modified: UnixTimestamp,
}

impl Realm {
    pub fn new(record: RealmRecord, region_name: impl Into<RegionName>) -> Self {
        Self {
            record,
            region_name: region_name.into(),
            last_modified: 0,
        }
    }

    pub fn slug(&self) -> &str {
        &self.record.slug
    }

    pub fn display_name(&self) -> &str {
        &self.record.name
    }
}

/// Realms of one region plus their last observed snapshot timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStatus {
    pub region: Option<Region>,
    pub realms: Vec<Realm>,
}

/// Per-region set of realm slugs to include.
///
/// `None` (or a region absent from the map) means every realm; an empty
/// set means none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealmWhitelist(pub HashMap<RegionName, Option<BTreeSet<RealmSlug>>>);

impl RealmWhitelist {
    pub fn allows(&self, region: &str, slug: &str) -> bool {
        match self.0.get(region) {
            None | Some(None) => true,
            Some(Some(slugs)) => slugs.contains(slug),
        }
    }

    /// Retain only the whitelisted realms of a region.
    pub fn filter<'a>(&self, region: &str, realms: impl IntoIterator<Item = &'a Realm>) -> Vec<Realm> {
        realms
            .into_iter()
            .filter(|r| self.allows(region, r.slug()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm(slug: &str) -> Realm {
        Realm::new(
            RealmRecord {
                slug: slug.to_string(),
                name: slug.to_uppercase(),
                locale: "en_US".to_string(),
                timezone: String::new(),
                population: String::new(),
            },
            "us",
        )
    }

    #[test]
    fn test_whitelist_null_means_all() {
        let mut map = HashMap::new();
        map.insert("us".to_string(), None);
        let wl = RealmWhitelist(map);
        assert!(wl.allows("us", "earthen-ring"));
        assert!(wl.allows("eu", "anything"));
    }

    #[test]
    fn test_whitelist_empty_means_none() {
        let mut map = HashMap::new();
        map.insert("us".to_string(), Some(BTreeSet::new()));
        let wl = RealmWhitelist(map);
        assert!(!wl.allows("us", "earthen-ring"));
    }

    #[test]
    fn test_whitelist_filter() {
        let mut map = HashMap::new();
        map.insert(
            "us".to_string(),
            Some(BTreeSet::from(["earthen-ring".to_string()])),
        );
        let wl = RealmWhitelist(map);
        let realms = [realm("earthen-ring"), realm("stormrage")];
        let kept = wl.filter("us", &realms);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].slug(), "earthen-ring");
    }

    #[test]
    fn test_whitelist_json_shape() {
        let wl: RealmWhitelist =
            serde_json::from_str(r#"{"us": ["earthen-ring"], "eu": null}"#).unwrap();
        assert!(wl.allows("us", "earthen-ring"));
        assert!(!wl.allows("us", "stormrage"));
        assert!(wl.allows("eu", "silvermoon"));
    }
}
