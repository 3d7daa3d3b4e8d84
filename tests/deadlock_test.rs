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

//! Deadlock detection tests using parking_lot's built-in deadlock detector.
//!
//! The engine's nested lock acquisitions are always `order -> listing` or
//! `order -> user`, with the ledger and message log taken last. These tests
//! hammer those paths from many threads and assert the detector never finds
//! a cycle.

use bazaar_escrow_rs::{
    Delivery, Engine, EscrowError, ListingId, NewListing, Stock, UserId,
};
use parking_lot::deadlock;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Background thread polling parking_lot's deadlock detector.
fn spawn_detector(stop: Arc<AtomicBool>, found: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(50));
            if !deadlock::check_deadlock().is_empty() {
                found.store(true, Ordering::Relaxed);
                return;
            }
        }
    })
}

fn make_engine_with_sellers(seller_count: usize) -> (Arc<Engine>, Vec<(UserId, ListingId)>) {
    let engine = Arc::new(Engine::new());
    let markets = (0..seller_count)
        .map(|i| {
            let seller =
                engine.create_user(format!("seller{i}"), format!("s{i}@example.com"), i % 2 == 0);
            let listing = engine
                .create_listing(
                    seller,
                    NewListing {
                        title: format!("asset {i}"),
                        price: dec!(100),
                        commission_rate: dec!(10),
                        stock: Stock::Unlimited,
                        delivery: Delivery::Manual,
                    },
                )
                .unwrap();
            (seller, listing)
        })
        .collect();
    (engine, markets)
}

#[test]
fn concurrent_full_lifecycles_do_not_deadlock() {
    let stop = Arc::new(AtomicBool::new(false));
    let found = Arc::new(AtomicBool::new(false));
    let detector = spawn_detector(Arc::clone(&stop), Arc::clone(&found));

    let (engine, markets) = make_engine_with_sellers(4);
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let markets = markets.clone();
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                let buyer =
                    engine.create_user(format!("buyer{t}"), format!("b{t}@example.com"), false);
                for i in 0..25 {
                    let (seller, listing) = markets[(t + i) % markets.len()];
                    let order = engine.purchase(buyer, listing, None).unwrap().order;
                    engine.mark_paid(seller, order.id).unwrap();
                    engine.mark_delivered(seller, order.id, None).unwrap();
                    engine.complete(buyer, order.id, None).unwrap();
                    completed.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    detector.join().unwrap();

    assert!(!found.load(Ordering::Relaxed), "deadlock detected");
    assert_eq!(completed.load(Ordering::Relaxed), 200);

    // All projections stayed consistent under contention.
    for (seller, _) in markets {
        assert_eq!(engine.audit_user_balance(seller), Some(true));
    }
}

#[test]
fn mixed_operations_do_not_deadlock() {
    let stop = Arc::new(AtomicBool::new(false));
    let found = Arc::new(AtomicBool::new(false));
    let detector = spawn_detector(Arc::clone(&stop), Arc::clone(&found));

    let (engine, markets) = make_engine_with_sellers(2);
    let admin = engine.create_admin("admin", "admin@example.com");
    let (seller, listing) = markets[0];

    let buyers: Vec<UserId> = (0..4)
        .map(|i| engine.create_user(format!("buyer{i}"), format!("b{i}@example.com"), false))
        .collect();

    // Pre-create a pile of orders the threads will fight over.
    let mut orders = Vec::new();
    for &buyer in &buyers {
        for _ in 0..10 {
            let order = engine.purchase(buyer, listing, None).unwrap().order;
            orders.push((buyer, order.id));
        }
    }

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let orders = orders.clone();
            thread::spawn(move || {
                for (i, &(buyer, order_id)) in orders.iter().enumerate() {
                    // Interleave transitions, chat, disputes and admin
                    // actions; invalid transitions are expected and must
                    // fail cleanly without wedging any lock.
                    let result: Result<(), EscrowError> = match (t + i) % 5 {
                        0 => engine.mark_paid(seller, order_id).map(|_| ()),
                        1 => engine.mark_delivered(seller, order_id, None),
                        2 => engine.complete(buyer, order_id, None).map(|_| ()),
                        3 => engine
                            .post_message(buyer, order_id, "status update please")
                            .map(|_| ()),
                        _ => engine.force_complete(admin, order_id, None).map(|_| ()),
                    };
                    match result {
                        Ok(())
                        | Err(EscrowError::StateConflict { .. })
                        | Err(EscrowError::Forbidden(_)) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    detector.join().unwrap();

    assert!(!found.load(Ordering::Relaxed), "deadlock detected");
    assert_eq!(engine.audit_user_balance(seller), Some(true));
    for buyer in buyers {
        assert_eq!(engine.audit_user_balance(buyer), Some(true));
    }
}
