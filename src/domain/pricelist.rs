//! Per-item price statistics and their time series.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::auction::{ItemId, MiniAuction};
use super::timestamp::UnixTimestamp;

/// Summary statistics for one item at one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub min_buyout_per: f64,
    pub max_buyout_per: f64,
    #[serde(rename = "average_buyout_per")]
    pub avg_buyout_per: f64,
    pub median_buyout_per: f64,
    pub volume: u64,
}

/// Item id to price point, for one snapshot.
pub type PriceList = HashMap<ItemId, PricePoint>;

/// One item's time series: snapshot timestamp to price point.
pub type PriceHistory = BTreeMap<UnixTimestamp, PricePoint>;

/// Histories of many items; the payload of one history shard.
pub type ItemPriceHistories = HashMap<ItemId, PriceHistory>;

impl PricePoint {
    /// Build statistics from one item's mini-auctions.
    ///
    /// Only listings with a buyout contribute to the buyout statistics;
    /// every listing contributes `quantity` to the volume.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_minis<'a>(minis: impl IntoIterator<Item = &'a MiniAuction>) -> Self {
        let mut per_unit: Vec<f64> = Vec::new();
        let mut volume = 0u64;

        for mini in minis {
            let listings = mini.listing_count() as u64;
            volume += mini.quantity * listings;
            if mini.buyout > 0 {
                per_unit.extend(std::iter::repeat_n(mini.buyout_per_unit, mini.listing_count()));
            }
        }

        if per_unit.is_empty() {
            return Self {
                volume,
                ..Self::default()
            };
        }

        per_unit.sort_by(f64::total_cmp);
        let min = per_unit[0];
        let max = per_unit[per_unit.len() - 1];
        let avg = per_unit.iter().sum::<f64>() / per_unit.len() as f64;
        let mid = per_unit.len() / 2;
        let median = if per_unit.len() % 2 == 0 {
            (per_unit[mid - 1] + per_unit[mid]) / 2.0
        } else {
            per_unit[mid]
        };

        Self {
            min_buyout_per: min,
            max_buyout_per: max,
            avg_buyout_per: avg,
            median_buyout_per: median,
            volume,
        }
    }
}

/// Compute a price point per item present in the mini-auction list.
pub fn price_list(minis: &[MiniAuction]) -> PriceList {
    let mut by_item: HashMap<ItemId, Vec<&MiniAuction>> = HashMap::new();
    for mini in minis {
        by_item.entry(mini.item_id).or_default().push(mini);
    }

    by_item
        .into_iter()
        .map(|(item_id, group)| (item_id, PricePoint::from_minis(group)))
        .collect()
}

/// Restrict a price list to a set of items.
pub fn price_list_for(minis: &[MiniAuction], item_ids: &HashSet<ItemId>) -> PriceList {
    let relevant: Vec<MiniAuction> = minis
        .iter()
        .filter(|m| item_ids.contains(&m.item_id))
        .cloned()
        .collect();
    price_list(&relevant)
}

/// Merge one snapshot's price list into a shard's histories.
///
/// Existing points are retained; a point for the same timestamp is replaced.
pub fn merge_snapshot(histories: &mut ItemPriceHistories, ts: UnixTimestamp, prices: &PriceList) {
    for (item_id, point) in prices {
        histories.entry(*item_id).or_default().insert(ts, *point);
    }
}

/// Keep only the points within `[lower, upper]`.
pub fn window(history: &PriceHistory, lower: UnixTimestamp, upper: UnixTimestamp) -> PriceHistory {
    if lower > upper {
        return PriceHistory::new();
    }
    history
        .range(lower..=upper)
        .map(|(ts, p)| (*ts, *p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auction::{dedupe, RawAuction, TimeLeft};

    fn raw(listing_id: u64, item_id: ItemId, buyout: u64, quantity: u64) -> RawAuction {
        RawAuction {
            listing_id,
            item_id,
            owner_name: format!("owner-{listing_id}"),
            owner_realm: "Earthen Ring".to_string(),
            bid: 1,
            buyout,
            quantity,
            time_left: TimeLeft::Medium,
        }
    }

    #[test]
    fn test_price_point_statistics() {
        let minis = dedupe(&[
            raw(1, 25, 100, 1),
            raw(2, 25, 300, 1),
            raw(3, 25, 400, 2),
            raw(4, 25, 0, 7),
        ]);
        let list = price_list(&minis);
        let p = list[&25];

        assert!((p.min_buyout_per - 100.0).abs() < f64::EPSILON);
        assert!((p.max_buyout_per - 300.0).abs() < f64::EPSILON);
        assert!((p.median_buyout_per - 200.0).abs() < f64::EPSILON);
        assert!((p.avg_buyout_per - 200.0).abs() < f64::EPSILON);
        assert_eq!(p.volume, 1 + 1 + 2 + 7);
    }

    #[test]
    fn test_volume_counts_listing_multiplicity() {
        let mut a = raw(1, 30, 50, 3);
        let mut b = raw(2, 30, 50, 3);
        a.owner_name = "same".into();
        b.owner_name = "same".into();
        let minis = dedupe(&[a, b]);
        assert_eq!(minis.len(), 1);
        assert_eq!(price_list(&minis)[&30].volume, 6);
    }

    #[test]
    fn test_merge_retains_prior_points() {
        let mut histories = ItemPriceHistories::new();
        let first: PriceList = [(25, PricePoint { volume: 1, ..PricePoint::default() })].into();
        let second: PriceList = [(25, PricePoint { volume: 2, ..PricePoint::default() })].into();
        merge_snapshot(&mut histories, 100, &first);
        merge_snapshot(&mut histories, 200, &second);

        assert_eq!(histories[&25].len(), 2);
        assert_eq!(histories[&25][&100].volume, 1);
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let history: PriceHistory = [(10, PricePoint::default()), (20, PricePoint::default()), (30, PricePoint::default())].into();
        let w = window(&history, 10, 20);
        assert_eq!(w.keys().copied().collect::<Vec<_>>(), vec![10, 20]);
    }

    #[test]
    fn test_price_point_json_names() {
        let json = serde_json::to_string(&PricePoint::default()).unwrap();
        assert!(json.contains("average_buyout_per"));
        assert!(json.contains("median_buyout_per"));
    }
}
