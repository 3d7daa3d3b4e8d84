// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the escrow engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Purchase throughput on unlimited-stock listings
//! - The full escrow lifecycle (purchase -> paid -> delivered -> complete)
//! - Concurrent purchases across many buyers
//! - Gateway initiation + callback verification

use bazaar_escrow_rs::config::SwiftPayConfig;
use bazaar_escrow_rs::{
    Delivery, Engine, GatewayCallback, ListingId, NewListing, Stock, SwiftPayGateway, UserId,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal_macros::dec;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn make_market(buyer_count: usize) -> (Arc<Engine>, UserId, ListingId, Vec<UserId>) {
    let engine = Arc::new(Engine::new());
    let seller = engine.create_user("seller", "seller@example.com", true);
    let listing = engine
        .create_listing(
            seller,
            NewListing {
                title: "1000 gold coins".to_string(),
                price: dec!(2500),
                commission_rate: dec!(8),
                stock: Stock::Unlimited,
                delivery: Delivery::Manual,
            },
        )
        .expect("listing");
    let buyers = (0..buyer_count)
        .map(|i| engine.create_user(format!("buyer{i}"), format!("b{i}@example.com"), false))
        .collect();
    (engine, seller, listing, buyers)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_purchase(c: &mut Criterion) {
    let mut group = c.benchmark_group("purchase");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_buyer", |b| {
        let (engine, _, listing, buyers) = make_market(1);
        let buyer = buyers[0];
        b.iter(|| {
            let receipt = engine.purchase(black_box(buyer), listing, None).unwrap();
            black_box(receipt.amount);
        });
    });

    group.finish();
}

fn bench_full_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_lifecycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("purchase_to_complete", |b| {
        let (engine, seller, listing, buyers) = make_market(1);
        let buyer = buyers[0];
        b.iter(|| {
            let order = engine.purchase(buyer, listing, None).unwrap().order;
            engine.mark_paid(seller, order.id).unwrap();
            engine.mark_delivered(seller, order.id, None).unwrap();
            engine.complete(buyer, order.id, None).unwrap();
        });
    });

    group.finish();
}

fn bench_concurrent_purchases(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_purchases");

    for buyer_count in [4usize, 16, 64] {
        group.throughput(Throughput::Elements(buyer_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(buyer_count),
            &buyer_count,
            |b, &buyer_count| {
                let (engine, _, listing, buyers) = make_market(buyer_count);
                b.iter(|| {
                    buyers.par_iter().for_each(|&buyer| {
                        engine.purchase(buyer, listing, None).unwrap();
                    });
                });
            },
        );
    }

    group.finish();
}

fn bench_gateway_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("gateway");
    group.throughput(Throughput::Elements(1));

    group.bench_function("initiate_and_callback", |b| {
        let (engine, _, listing, buyers) = make_market(1);
        let buyer = buyers[0];
        let gateway = SwiftPayGateway::new(SwiftPayConfig::for_tests(false));
        b.iter(|| {
            let order = engine.purchase(buyer, listing, None).unwrap().order;
            let txn = engine.initiate_payment(&gateway, buyer, order.id).unwrap();
            let callback = GatewayCallback {
                txn_ref: txn.txn_ref,
                status: "000".to_string(),
                supplied_hash: txn.fields["sp_secure_hash"].clone(),
            };
            engine.handle_gateway_callback(&gateway, &callback).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_purchase,
    bench_full_lifecycle,
    bench_concurrent_purchases,
    bench_gateway_roundtrip
);
criterion_main!(benches);
