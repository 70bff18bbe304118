//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify deduplication, day normalization, paging,
//! price statistics and the storage codecs across random inputs.

use std::collections::HashSet;

use proptest::prelude::*;

use sotah_pipeline::adapters::storage::codec;
use sotah_pipeline::adapters::storage::pricelist_histories::{encode_shard, Shard};
use sotah_pipeline::domain::auction::{buyout_per_unit, dedupe, total_listings, MiniAuction, RawAuction, TimeLeft};
use sotah_pipeline::domain::manifest::AuctionManifest;
use sotah_pipeline::domain::pricelist::{price_list, window, ItemPriceHistories, PriceHistory, PricePoint};
use sotah_pipeline::domain::query::{page, MAX_PAGE_COUNT};
use sotah_pipeline::domain::timestamp::{day_span, normalize, SECONDS_PER_DAY};
use sotah_pipeline::ports::object_store::StoredObject;

fn time_left() -> impl Strategy<Value = TimeLeft> {
    prop_oneof![
        Just(TimeLeft::Short),
        Just(TimeLeft::Medium),
        Just(TimeLeft::Long),
        Just(TimeLeft::VeryLong),
    ]
}

/// Small value pools so identical terms actually collide.
fn raw_auction() -> impl Strategy<Value = RawAuction> {
    (
        any::<u64>(),
        1u64..6,
        prop::sample::select(vec!["Thrall", "Jaina", "Anduin"]),
        prop::sample::select(vec![0u64, 100, 250]),
        prop::sample::select(vec![0u64, 1_000, 2_500]),
        1u64..4,
        time_left(),
    )
        .prop_map(|(listing_id, item_id, owner, bid, buyout, quantity, time_left)| RawAuction {
            listing_id,
            item_id,
            owner_name: owner.to_string(),
            owner_realm: "earthen-ring".to_string(),
            bid,
            buyout,
            quantity,
            time_left,
        })
}

// ── Deduplication ───────────────────────────────────────────

proptest! {
    /// Every raw listing lands in exactly one mini-auction.
    #[test]
    fn dedupe_preserves_listing_count(auctions in prop::collection::vec(raw_auction(), 0..200)) {
        let minis = dedupe(&auctions);
        prop_assert_eq!(total_listings(&minis), auctions.len());
    }

    /// No two mini-auctions share a fingerprint.
    #[test]
    fn dedupe_fingerprints_unique(auctions in prop::collection::vec(raw_auction(), 0..200)) {
        let minis = dedupe(&auctions);
        let fingerprints: HashSet<_> = minis.iter().map(|m| m.fingerprint()).collect();
        prop_assert_eq!(fingerprints.len(), minis.len());
    }

    /// Output is ordered by ascending fingerprint.
    #[test]
    fn dedupe_sorted_by_fingerprint(auctions in prop::collection::vec(raw_auction(), 0..100)) {
        let minis = dedupe(&auctions);
        prop_assert!(minis.windows(2).all(|w| w[0].fingerprint() < w[1].fingerprint()));
    }

    /// Zero buyout iff zero per-unit buyout.
    #[test]
    fn buyout_per_unit_zero_iff_no_buyout(buyout in 0u64..1_000_000, quantity in 1u64..1_000) {
        let per = buyout_per_unit(buyout, quantity);
        prop_assert_eq!(per == 0.0, buyout == 0);
        if buyout > 0 {
            prop_assert!((per - buyout as f64 / quantity as f64).abs() < 1e-9);
        }
    }
}

// ── Day normalization ───────────────────────────────────────

proptest! {
    #[test]
    fn normalize_idempotent(t in 0i64..4_000_000_000) {
        prop_assert_eq!(normalize(normalize(t)), normalize(t));
    }

    #[test]
    fn normalize_is_midnight_at_or_before(t in 0i64..4_000_000_000) {
        let day = normalize(t);
        prop_assert_eq!(day % SECONDS_PER_DAY, 0);
        prop_assert!(day <= t && t - day < SECONDS_PER_DAY);
    }

    /// Both ends of a window fall inside its day span, and the span never
    /// overflows, even at the top of the timestamp range.
    #[test]
    fn day_span_covers_window(lower in 0i64..i64::MAX, span in 0i64..(400 * SECONDS_PER_DAY)) {
        let upper = lower.saturating_add(span);
        let (first, last) = day_span(lower, upper).unwrap();
        prop_assert_eq!(first, normalize(lower));
        prop_assert_eq!(last, normalize(upper));
        prop_assert!(first <= lower && lower - first < SECONDS_PER_DAY);
        prop_assert!(last <= upper && upper - last < SECONDS_PER_DAY);
        prop_assert_eq!((last - first) % SECONDS_PER_DAY, 0);
    }

    /// Re-appending the same snapshot never grows a manifest.
    #[test]
    fn manifest_append_idempotent(ts in prop::collection::vec(0i64..1_000, 0..50)) {
        let mut manifest = AuctionManifest::new();
        for &t in &ts {
            manifest.append(t);
        }
        let len = manifest.len();
        for &t in &ts {
            prop_assert!(!manifest.append(t));
        }
        prop_assert_eq!(manifest.len(), len);
    }
}

// ── Paging and statistics ───────────────────────────────────

proptest! {
    /// A page never holds more than `count` entries; past-the-end fails.
    #[test]
    fn page_length_bounded(len in 0usize..300, p in 0usize..50, count in 1usize..=MAX_PAGE_COUNT) {
        let items: Vec<usize> = (0..len).collect();
        match page(items, p, count) {
            Ok(slice) => {
                prop_assert!(slice.len() <= count);
                prop_assert!(p * count <= len);
                prop_assert_eq!(slice.first().copied(), (p * count < len).then_some(p * count));
            }
            Err(_) => prop_assert!(p * count > len),
        }
    }

    /// Min ≤ median ≤ max, and volume sums every quantity.
    #[test]
    fn price_point_ordered(auctions in prop::collection::vec(raw_auction(), 1..100)) {
        let minis = dedupe(&auctions);
        for (item_id, point) in price_list(&minis) {
            let volume: u64 = auctions
                .iter()
                .filter(|a| a.item_id == item_id)
                .map(|a| a.quantity)
                .sum();
            prop_assert_eq!(point.volume, volume);
            prop_assert!(point.min_buyout_per <= point.median_buyout_per);
            prop_assert!(point.median_buyout_per <= point.max_buyout_per);
        }
    }

    /// A history window only keeps timestamps inside the bounds.
    #[test]
    fn window_respects_bounds(
        stamps in prop::collection::btree_set(0i64..10_000, 0..40),
        lower in 0i64..5_000,
        span in 0i64..5_000,
    ) {
        let upper = lower + span;
        let history: PriceHistory = stamps.iter().map(|&t| (t, PricePoint::default())).collect();
        let clipped = window(&history, lower, upper);
        prop_assert!(clipped.keys().all(|&t| t >= lower && t <= upper));
        prop_assert_eq!(
            clipped.len(),
            stamps.iter().filter(|&&t| t >= lower && t <= upper).count()
        );
    }
}

// ── Codec round trips ───────────────────────────────────────

/// Prices that are exact in short decimal form.
fn price() -> impl Strategy<Value = f64> {
    (0u32..4_000_000).prop_map(|n| f64::from(n) / 4.0)
}

fn price_point() -> impl Strategy<Value = PricePoint> {
    (price(), price(), price(), price(), any::<u32>()).prop_map(|(a, b, avg, median, volume)| PricePoint {
        min_buyout_per: a.min(b),
        max_buyout_per: a.max(b),
        avg_buyout_per: avg,
        median_buyout_per: median,
        volume: u64::from(volume),
    })
}

fn item_price_histories() -> impl Strategy<Value = ItemPriceHistories> {
    prop::collection::hash_map(
        1u64..100_000,
        prop::collection::btree_map(1_700_000_000i64..1_700_086_400, price_point(), 1..12),
        0..30,
    )
}

/// Listings whose per-unit buyout divides exactly.
fn exact_auction() -> impl Strategy<Value = RawAuction> {
    (
        raw_auction(),
        prop::sample::select(vec![1u64, 2, 4, 8]),
        "[A-Za-z' -]{0,16}",
    )
        .prop_map(|(mut a, quantity, owner)| {
            a.quantity = quantity;
            a.owner_name = owner;
            a
        })
}

proptest! {
    /// An upstream listing survives JSON encoding unchanged.
    #[test]
    fn raw_auction_json_round_trip(auction in exact_auction()) {
        let json = serde_json::to_string(&auction).unwrap();
        let back: RawAuction = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, auction);
    }

    /// A live-auction object decodes to the exact list that was stored.
    #[test]
    fn live_auctions_round_trip(auctions in prop::collection::vec(exact_auction(), 0..120)) {
        let minis = dedupe(&auctions);
        let object = StoredObject::gzip_json(codec::encode_json(&minis).unwrap());
        let back: Vec<MiniAuction> = codec::decode_json(&object).unwrap();
        prop_assert_eq!(back, minis);
    }

    /// A history shard decodes back to every item it was built from.
    #[test]
    fn history_shard_round_trip(histories in item_price_histories()) {
        let gzipped = codec::gzip(&encode_shard(&histories).unwrap()).unwrap();
        let shard = Shard::parse(&codec::gunzip(&gzipped).unwrap(), None).unwrap();
        prop_assert_eq!(shard.rows.len(), histories.len());
        prop_assert_eq!(shard.decode(None).unwrap(), histories);
    }
}
