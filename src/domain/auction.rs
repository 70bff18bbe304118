//! Raw auctions and their deduplicated mini-auction projection.
//!
//! A snapshot commonly contains many listings with identical commercial
//! terms (same item, seller, prices, stack size and time left). These are
//! folded into one `MiniAuction` that remembers every contributing
//! listing id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Upstream item identifier.
pub type ItemId = u64;

/// Upstream listing identifier; unique within one snapshot only.
pub type ListingId = u64;

/// Remaining duration bucket reported by the upstream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeLeft {
    Short,
    Medium,
    Long,
    VeryLong,
}

/// One listing exactly as delivered by upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAuction {
    #[serde(rename = "auc")]
    pub listing_id: ListingId,
    #[serde(rename = "item")]
    pub item_id: ItemId,
    #[serde(rename = "owner")]
    pub owner_name: String,
    #[serde(rename = "ownerRealm")]
    pub owner_realm: String,
    pub bid: u64,
    pub buyout: u64,
    pub quantity: u64,
    #[serde(rename = "timeLeft")]
    pub time_left: TimeLeft,
}

/// Upstream snapshot body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionsBody {
    #[serde(default)]
    pub auctions: Vec<RawAuction>,
}

/// Identity of a group of listings with identical terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    pub item_id: ItemId,
    pub owner_name: String,
    pub owner_realm: String,
    pub bid: u64,
    pub buyout: u64,
    pub quantity: u64,
    pub time_left: TimeLeft,
}

impl From<&RawAuction> for Fingerprint {
    fn from(a: &RawAuction) -> Self {
        Self {
            item_id: a.item_id,
            owner_name: a.owner_name.clone(),
            owner_realm: a.owner_realm.clone(),
            bid: a.bid,
            buyout: a.buyout,
            quantity: a.quantity,
            time_left: a.time_left,
        }
    }
}

/// Deduplicated listing group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniAuction {
    #[serde(rename = "itemId")]
    pub item_id: ItemId,
    #[serde(rename = "owner")]
    pub owner_name: String,
    #[serde(rename = "ownerRealm")]
    pub owner_realm: String,
    pub bid: u64,
    pub buyout: u64,
    #[serde(rename = "buyoutPer")]
    pub buyout_per_unit: f64,
    pub quantity: u64,
    #[serde(rename = "timeLeft")]
    pub time_left: TimeLeft,
    #[serde(rename = "aucList")]
    pub listing_ids: Vec<ListingId>,
}

impl MiniAuction {
    fn seed(a: &RawAuction) -> Self {
        Self {
            item_id: a.item_id,
            owner_name: a.owner_name.clone(),
            owner_realm: a.owner_realm.clone(),
            bid: a.bid,
            buyout: a.buyout,
            buyout_per_unit: buyout_per_unit(a.buyout, a.quantity),
            quantity: a.quantity,
            time_left: a.time_left,
            listing_ids: Vec::new(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            item_id: self.item_id,
            owner_name: self.owner_name.clone(),
            owner_realm: self.owner_realm.clone(),
            bid: self.bid,
            buyout: self.buyout,
            quantity: self.quantity,
            time_left: self.time_left,
        }
    }

    pub fn listing_count(&self) -> usize {
        self.listing_ids.len()
    }
}

/// `buyout / quantity`, or 0 when there is no buyout.
#[allow(clippy::cast_precision_loss)]
pub fn buyout_per_unit(buyout: u64, quantity: u64) -> f64 {
    if buyout == 0 || quantity == 0 {
        return 0.0;
    }
    buyout as f64 / quantity as f64
}

/// Fold raw listings into mini-auctions keyed by fingerprint.
///
/// The output is ordered by ascending fingerprint, and the listing ids of
/// each group keep their input order. `Σ listing_count` equals the input
/// length.
pub fn dedupe(auctions: &[RawAuction]) -> Vec<MiniAuction> {
    let mut groups: HashMap<Fingerprint, MiniAuction> = HashMap::with_capacity(auctions.len());
    for auction in auctions {
        groups
            .entry(Fingerprint::from(auction))
            .or_insert_with(|| MiniAuction::seed(auction))
            .listing_ids
            .push(auction.listing_id);
    }

    let mut entries: Vec<(Fingerprint, MiniAuction)> = groups.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, mini)| mini).collect()
}

/// Distinct item ids in a mini-auction list, ascending.
pub fn item_ids(minis: &[MiniAuction]) -> Vec<ItemId> {
    let mut ids: Vec<ItemId> = minis.iter().map(|m| m.item_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Total listings represented by a mini-auction list.
pub fn total_listings(minis: &[MiniAuction]) -> usize {
    minis.iter().map(MiniAuction::listing_count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(listing_id: ListingId, item_id: ItemId, buyout: u64, quantity: u64) -> RawAuction {
        RawAuction {
            listing_id,
            item_id,
            owner_name: "Lokien".to_string(),
            owner_realm: "Earthen Ring".to_string(),
            bid: 10,
            buyout,
            quantity,
            time_left: TimeLeft::Long,
        }
    }

    #[test]
    fn test_dedupe_groups_identical_terms() {
        let auctions = vec![raw(100, 25, 500, 5), raw(101, 25, 500, 5), raw(102, 30, 90, 1)];
        let minis = dedupe(&auctions);

        assert_eq!(minis.len(), 2);
        assert_eq!(minis[0].item_id, 25);
        assert_eq!(minis[0].listing_ids, vec![100, 101]);
        assert!((minis[0].buyout_per_unit - 100.0).abs() < f64::EPSILON);
        assert_eq!(minis[1].listing_ids, vec![102]);
        assert_eq!(total_listings(&minis), auctions.len());
    }

    #[test]
    fn test_dedupe_empty_snapshot() {
        assert!(dedupe(&[]).is_empty());
    }

    #[test]
    fn test_dedupe_is_order_insensitive() {
        let forward = vec![raw(1, 25, 500, 5), raw(2, 30, 90, 1), raw(3, 25, 500, 5)];
        let mut backward = forward.clone();
        backward.reverse();

        let a = dedupe(&forward);
        let b = dedupe(&backward);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.fingerprint(), y.fingerprint());
            let mut xs = x.listing_ids.clone();
            let mut ys = y.listing_ids.clone();
            xs.sort_unstable();
            ys.sort_unstable();
            assert_eq!(xs, ys);
        }
    }

    #[test]
    fn test_buyout_per_unit_zero_buyout() {
        assert!(buyout_per_unit(0, 20).abs() < f64::EPSILON);
        assert!((buyout_per_unit(300, 4) - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_raw_auction_upstream_json() {
        let json = r#"{"auc":100,"item":25,"owner":"Lokien","ownerRealm":"Earthen Ring",
            "bid":10,"buyout":500,"quantity":5,"timeLeft":"VERY_LONG","rand":0,"seed":0}"#;
        let a: RawAuction = serde_json::from_str(json).unwrap();
        assert_eq!(a.listing_id, 100);
        assert_eq!(a.time_left, TimeLeft::VeryLong);
    }

    #[test]
    fn test_item_ids_unique_sorted() {
        let minis = dedupe(&[raw(1, 30, 1, 1), raw(2, 25, 1, 1), raw(3, 30, 2, 1)]);
        assert_eq!(item_ids(&minis), vec![25, 30]);
    }
}
