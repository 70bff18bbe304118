//! Query shapes and the pure parts of the query engines.
//!
//! Validation, filtering, sorting and paging operate on an in-memory
//! mini-auction list; loading that list is the query use case's job.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::auction::{ItemId, MiniAuction};
use super::error::{PipelineError, Result};
use super::item::{fuzzy_rank, normalize_name, Item};
use super::pricelist::{ItemPriceHistories, PriceList};
use super::region::{RealmSlug, RegionName};
use super::timestamp::UnixTimestamp;

/// Largest accepted page size.
pub const MAX_PAGE_COUNT: usize = 1000;

/// Result cap for owner and item name searches.
pub const SEARCH_LIMIT: usize = 10;

/// Column to sort auctions by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKind {
    #[default]
    None,
    Item,
    Quantity,
    Bid,
    Buyout,
    BuyoutPer,
    Owner,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    None,
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAuctionsRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub page: usize,
    pub count: usize,
    #[serde(default)]
    pub sort_kind: SortKind,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub owner_filters: Vec<String>,
    #[serde(default)]
    pub item_filters: Vec<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAuctionsResponse {
    pub auctions: Vec<MiniAuction>,
    pub total: usize,
    pub total_count: usize,
}

impl QueryAuctionsRequest {
    /// Check paging parameters.
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 || self.count > MAX_PAGE_COUNT {
            return Err(PipelineError::UserInput(format!(
                "count must be in [1, {MAX_PAGE_COUNT}]"
            )));
        }
        Ok(())
    }

    /// Filter, sort and page a realm's mini-auctions.
    pub fn apply(&self, mut auctions: Vec<MiniAuction>) -> Result<QueryAuctionsResponse> {
        self.validate()?;

        if !self.owner_filters.is_empty() {
            let owners: HashSet<&str> = self.owner_filters.iter().map(String::as_str).collect();
            auctions.retain(|a| owners.contains(a.owner_name.as_str()));
        }
        if !self.item_filters.is_empty() {
            let items: HashSet<ItemId> = self.item_filters.iter().copied().collect();
            auctions.retain(|a| items.contains(&a.item_id));
        }

        let total = auctions.len();
        let total_count = auctions.iter().map(MiniAuction::listing_count).sum();

        if self.sort_kind != SortKind::None && self.sort_direction != SortDirection::None {
            sort_auctions(&mut auctions, self.sort_kind, self.sort_direction);
        }

        let auctions = page(auctions, self.page, self.count)?;

        Ok(QueryAuctionsResponse {
            auctions,
            total,
            total_count,
        })
    }
}

/// Stable sort; equal keys keep their incoming order.
pub fn sort_auctions(auctions: &mut [MiniAuction], kind: SortKind, direction: SortDirection) {
    let compare = |a: &MiniAuction, b: &MiniAuction| -> Ordering {
        match kind {
            SortKind::None => Ordering::Equal,
            SortKind::Item => a.item_id.cmp(&b.item_id),
            SortKind::Quantity => a.quantity.cmp(&b.quantity),
            SortKind::Bid => a.bid.cmp(&b.bid),
            SortKind::Buyout => a.buyout.cmp(&b.buyout),
            SortKind::BuyoutPer => a.buyout_per_unit.total_cmp(&b.buyout_per_unit),
            SortKind::Owner => a.owner_name.cmp(&b.owner_name),
        }
    };

    match direction {
        SortDirection::None => {}
        SortDirection::Asc => auctions.sort_by(compare),
        SortDirection::Desc => auctions.sort_by(|a, b| compare(b, a)),
    }
}

/// Slice `[page * count, page * count + count)` out of a list.
///
/// A start exactly at the end yields an empty page; past the end is an error.
pub fn page<T>(mut items: Vec<T>, page: usize, count: usize) -> Result<Vec<T>> {
    let start = page
        .checked_mul(count)
        .ok_or_else(|| PipelineError::UserInput("page out of range".to_string()))?;
    if start > items.len() {
        return Err(PipelineError::UserInput(format!(
            "page {page} starts past the end of {} results",
            items.len()
        )));
    }
    let end = start.saturating_add(count).min(items.len());
    items.truncate(end);
    Ok(items.split_off(start))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnersRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnersResponse {
    pub owners: Vec<String>,
}

/// Unique owner names, optionally filtered by case-insensitive substring.
///
/// Sorted ascending; `limit` caps the result when given.
pub fn owners(auctions: &[MiniAuction], query: &str, limit: Option<usize>) -> Vec<String> {
    let needle = query.to_lowercase();
    let mut names: Vec<String> = auctions
        .iter()
        .map(|a| a.owner_name.as_str())
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|name| needle.is_empty() || name.to_lowercase().contains(&needle))
        .map(str::to_string)
        .collect();
    names.sort();
    if let Some(limit) = limit {
        names.truncate(limit);
    }
    names
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsQueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsQueryResponse {
    pub items: Vec<Item>,
}

/// Rank catalog items against a query.
///
/// An empty query lists items by normalized name; otherwise items that do
/// not match are dropped and the rest are ordered by rank, then name.
pub fn rank_items<'a>(items: impl IntoIterator<Item = &'a Item>, query: &str) -> Vec<Item> {
    let needle = normalize_name(query);

    let mut ranked: Vec<(i64, String, &Item)> = items
        .into_iter()
        .map(|item| {
            let name = item.normalized_name();
            let rank = if needle.is_empty() { 0 } else { fuzzy_rank(&needle, &name) };
            (rank, name, item)
        })
        .filter(|(rank, _, _)| *rank != -1)
        .collect();

    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)).then_with(|| a.2.id.cmp(&b.2.id)));
    ranked
        .into_iter()
        .take(SEARCH_LIMIT)
        .map(|(_, _, item)| item.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub item_ids: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceListResponse {
    pub price_list: PriceList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceHistoryRequest {
    pub region_name: RegionName,
    pub realm_slug: RealmSlug,
    pub item_ids: Vec<ItemId>,
    pub lower_bounds: UnixTimestamp,
    pub upper_bounds: UnixTimestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryResponse {
    pub history: ItemPriceHistories,
}

impl PriceHistoryRequest {
    pub fn validate(&self) -> Result<()> {
        if self.item_ids.is_empty() {
            return Err(PipelineError::UserInput("item_ids must not be empty".to_string()));
        }
        if self.lower_bounds > self.upper_bounds {
            return Err(PipelineError::UserInput(
                "lower bound must not exceed upper bound".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsRequest {
    pub item_ids: Vec<ItemId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auction::{dedupe, RawAuction, TimeLeft};

    fn raw(listing_id: u64, item_id: ItemId, owner: &str, buyout: u64) -> RawAuction {
        RawAuction {
            listing_id,
            item_id,
            owner_name: owner.to_string(),
            owner_realm: "Earthen Ring".to_string(),
            bid: buyout / 2,
            buyout,
            quantity: 1,
            time_left: TimeLeft::Long,
        }
    }

    fn sample() -> Vec<MiniAuction> {
        dedupe(&[
            raw(100, 25, "Lokien", 500),
            raw(101, 25, "Lokien", 500),
            raw(102, 30, "Aeridya", 90),
            raw(103, 31, "bazz", 1200),
        ])
    }

    fn request(page: usize, count: usize) -> QueryAuctionsRequest {
        QueryAuctionsRequest {
            region_name: "us".into(),
            realm_slug: "earthen-ring".into(),
            page,
            count,
            sort_kind: SortKind::None,
            sort_direction: SortDirection::None,
            owner_filters: vec![],
            item_filters: vec![],
        }
    }

    #[test]
    fn test_item_filter_totals() {
        let mut req = request(0, 10);
        req.sort_kind = SortKind::Item;
        req.sort_direction = SortDirection::Asc;
        req.item_filters = vec![25];

        let resp = req.apply(sample()).unwrap();
        assert_eq!(resp.auctions.len(), 1);
        assert_eq!(resp.total, 1);
        assert_eq!(resp.total_count, 2);
    }

    #[test]
    fn test_owner_filter_exact() {
        let mut req = request(0, 10);
        req.owner_filters = vec!["Aeridya".into(), "lokien".into()];
        let resp = req.apply(sample()).unwrap();
        assert_eq!(resp.total, 1);
        assert_eq!(resp.auctions[0].owner_name, "Aeridya");
    }

    #[test]
    fn test_sort_desc_by_buyout() {
        let mut req = request(0, 10);
        req.sort_kind = SortKind::Buyout;
        req.sort_direction = SortDirection::Desc;
        let resp = req.apply(sample()).unwrap();
        let buyouts: Vec<u64> = resp.auctions.iter().map(|a| a.buyout).collect();
        assert_eq!(buyouts, vec![1200, 500, 90]);
    }

    #[test]
    fn test_page_at_end_is_empty() {
        let resp = request(1, 3).apply(sample()).unwrap();
        assert!(resp.auctions.is_empty());
        assert_eq!(resp.total, 3);
    }

    #[test]
    fn test_page_past_end_is_user_error() {
        let err = request(2, 2).apply(sample()).unwrap_err();
        assert!(matches!(err, PipelineError::UserInput(_)));
    }

    #[test]
    fn test_count_zero_and_too_large_rejected() {
        assert!(request(0, 0).apply(sample()).is_err());
        assert!(request(0, 1001).apply(sample()).is_err());
    }

    #[test]
    fn test_partial_last_page() {
        let resp = request(1, 2).apply(sample()).unwrap();
        assert_eq!(resp.auctions.len(), 1);
    }

    #[test]
    fn test_owners_case_insensitive_sorted() {
        let names = owners(&sample(), "A", Some(SEARCH_LIMIT));
        assert_eq!(names, vec!["Aeridya".to_string(), "bazz".to_string()]);
        assert_eq!(owners(&sample(), "", None).len(), 3);
    }

    #[test]
    fn test_rank_items() {
        let items = vec![
            Item { id: 2589, name: "Linen Cloth".into(), icon: String::new(), item_class: 7, item_sub_class: 5, item_level: 5, quality: 1 },
            Item { id: 2592, name: "Wool Cloth".into(), icon: String::new(), item_class: 7, item_sub_class: 5, item_level: 15, quality: 1 },
            Item { id: 12359, name: "Thorium Bar".into(), icon: String::new(), item_class: 7, item_sub_class: 7, item_level: 50, quality: 1 },
        ];

        let all = rank_items(&items, "");
        assert_eq!(all.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2589, 12359, 2592]);

        let cloth = rank_items(&items, "Cloth");
        assert_eq!(cloth.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2592, 2589]);
    }

    #[test]
    fn test_price_history_request_validation() {
        let req = PriceHistoryRequest {
            region_name: "us".into(),
            realm_slug: "earthen-ring".into(),
            item_ids: vec![25],
            lower_bounds: 20,
            upper_bounds: 10,
        };
        assert!(req.validate().is_err());
    }
}
