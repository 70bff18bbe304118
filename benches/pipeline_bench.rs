//! Pipeline Benchmarks — Per-Snapshot Hot Paths
//!
//! Benchmarks the work done for every realm on every cycle: folding a
//! snapshot into mini-auctions, computing its price list and encoding a
//! history shard.
//!
//! Run with: cargo bench --bench pipeline_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sotah_pipeline::adapters::storage::pricelist_histories::{encode_shard, Shard};
use sotah_pipeline::domain::auction::{dedupe, RawAuction, TimeLeft};
use sotah_pipeline::domain::pricelist::{merge_snapshot, price_list, ItemPriceHistories};

/// A realistic snapshot: 50k listings over 2k items, heavy duplication.
fn snapshot() -> Vec<RawAuction> {
    (0..50_000u64)
        .map(|i| RawAuction {
            listing_id: i,
            item_id: i % 2_000,
            owner_name: format!("owner-{}", i % 300),
            owner_realm: "earthen-ring".to_string(),
            bid: 100 * (i % 7),
            buyout: 1_000 * (i % 11),
            quantity: 1 + i % 20,
            time_left: if i % 2 == 0 { TimeLeft::Long } else { TimeLeft::VeryLong },
        })
        .collect()
}

/// Benchmark snapshot deduplication.
fn bench_dedupe(c: &mut Criterion) {
    let auctions = snapshot();

    c.bench_function("dedupe_50k_listings", |b| {
        b.iter(|| {
            let _minis = dedupe(black_box(&auctions));
        });
    });
}

/// Benchmark price list computation over deduplicated listings.
fn bench_price_list(c: &mut Criterion) {
    let minis = dedupe(&snapshot());

    c.bench_function("price_list_2k_items", |b| {
        b.iter(|| {
            let _prices = price_list(black_box(&minis));
        });
    });
}

/// Benchmark a day shard of 24 snapshots: encode, then parse and decode.
fn bench_shard(c: &mut Criterion) {
    let prices = price_list(&dedupe(&snapshot()));
    let mut histories = ItemPriceHistories::new();
    for hour in 0..24 {
        merge_snapshot(&mut histories, 1_700_000_000 + hour * 3_600, &prices);
    }
    let encoded = encode_shard(&histories).unwrap_or_default();

    c.bench_function("shard_encode_24_snapshots", |b| {
        b.iter(|| {
            let _body = encode_shard(black_box(&histories));
        });
    });

    c.bench_function("shard_decode_24_snapshots", |b| {
        b.iter(|| {
            let shard = Shard::parse(black_box(&encoded), None);
            let _histories = shard.map(|s| s.decode(None));
        });
    });
}

criterion_group!(benches, bench_dedupe, bench_price_list, bench_shard);
criterion_main!(benches);
