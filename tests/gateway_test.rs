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

//! Payment flow integration tests: initiation, callback verification,
//! idempotent replay and interleaving with manual transitions.

use bazaar_escrow_rs::config::{PayFastConfig, SwiftPayConfig};
use bazaar_escrow_rs::{
    CallbackOutcome, Delivery, Engine, EscrowError, GatewayCallback, ListingId, MessageKind,
    NewListing, OrderId, OrderStatus, PayFastGateway, PaymentMethod, Stock, SwiftPayGateway,
    UserId, VerifyFailure,
};
use rust_decimal_macros::dec;

// === Helper Functions ===

fn setup_pending_order(delivery: Delivery) -> (Engine, UserId, UserId, ListingId, OrderId) {
    let engine = Engine::new();
    let seller = engine.create_user("seller", "seller@example.com", true);
    let buyer = engine.create_user("buyer", "buyer@example.com", false);
    let listing = engine
        .create_listing(
            seller,
            NewListing {
                title: "1000 gold coins".to_string(),
                price: dec!(2500),
                commission_rate: dec!(8),
                stock: Stock::Unlimited,
                delivery,
            },
        )
        .unwrap();
    let order = engine.purchase(buyer, listing, None).unwrap().order;
    (engine, seller, buyer, listing, order.id)
}

fn production_swiftpay() -> SwiftPayGateway {
    SwiftPayGateway::new(SwiftPayConfig::for_tests(false))
}

fn production_payfast() -> PayFastGateway {
    PayFastGateway::new(PayFastConfig::for_tests(false))
}

fn success_callback(txn_fields: &std::collections::BTreeMap<String, String>) -> GatewayCallback {
    GatewayCallback {
        txn_ref: txn_fields["sp_txn_ref"].as_str().into(),
        status: "000".to_string(),
        supplied_hash: txn_fields["sp_secure_hash"].clone(),
    }
}

// === Initiation ===

#[test]
fn initiation_signs_the_order_amount() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();

    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();
    // 2700.00 in minor units.
    assert_eq!(txn.fields["sp_amount"], "270000");
    assert_eq!(txn.fields["sp_bill_reference"], order_id.to_string());
    assert!(txn.txn_ref.0.starts_with("SP"));
    assert!(txn.redirect_url.contains(&txn.txn_ref.0));

    // The chosen method is recorded on the order while it stays pending.
    let order = engine.order(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_method, Some(PaymentMethod::SwiftPay));
}

#[test]
fn only_the_buyer_may_initiate() {
    let (engine, seller, _, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();

    let result = engine.initiate_payment(&gateway, seller, order_id);
    assert_eq!(
        result.err(),
        Some(EscrowError::Forbidden("only the buyer can initiate payment"))
    );
}

#[test]
fn initiation_requires_pending_status() {
    let (engine, seller, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    engine.mark_paid(seller, order_id).unwrap();

    let gateway = production_swiftpay();
    let result = engine.initiate_payment(&gateway, buyer, order_id);
    assert_eq!(
        result.err(),
        Some(EscrowError::StateConflict {
            action: "initiate payment",
            status: OrderStatus::Paid,
        })
    );
}

// === Callback verification ===

#[test]
fn valid_swiftpay_callback_applies_paid_transition() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();

    let outcome = engine
        .handle_gateway_callback(&gateway, &success_callback(&txn.fields))
        .unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Applied {
            auto_delivered: false
        }
    );

    let order = engine.order(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_method, Some(PaymentMethod::SwiftPay));
}

#[test]
fn valid_payfast_callback_applies_paid_transition() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_payfast();
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();

    assert_eq!(txn.fields["transaction_amount"], "2700.00");
    let callback = GatewayCallback {
        txn_ref: txn.txn_ref.clone(),
        status: "PAID".to_string(),
        supplied_hash: txn.fields["hash_value"].clone(),
    };
    let outcome = engine.handle_gateway_callback(&gateway, &callback).unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Applied {
            auto_delivered: false
        }
    );
    assert_eq!(
        engine.order(order_id).unwrap().payment_method,
        Some(PaymentMethod::PayFast)
    );
}

#[test]
fn tampered_hash_is_rejected_and_order_stays_pending() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();

    let callback = GatewayCallback {
        txn_ref: txn.txn_ref.clone(),
        status: "000".to_string(),
        supplied_hash: "0000DEADBEEF".to_string(),
    };
    let result = engine.handle_gateway_callback(&gateway, &callback);
    assert_eq!(
        result.err(),
        Some(EscrowError::GatewayVerificationFailed(
            VerifyFailure::SignatureMismatch
        ))
    );
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Pending);
}

#[test]
fn unknown_transaction_reference_is_rejected() {
    let (engine, _, _, _, _) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();

    let callback = GatewayCallback {
        txn_ref: "SP0000000".into(),
        status: "000".to_string(),
        supplied_hash: "ABCD".to_string(),
    };
    let result = engine.handle_gateway_callback(&gateway, &callback);
    assert_eq!(
        result.err(),
        Some(EscrowError::GatewayVerificationFailed(
            VerifyFailure::UnknownTransaction
        ))
    );
}

#[test]
fn provider_failure_code_leaves_order_retriable() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();

    let failed = GatewayCallback {
        txn_ref: txn.txn_ref.clone(),
        status: "101".to_string(),
        supplied_hash: txn.fields["sp_secure_hash"].clone(),
    };
    let result = engine.handle_gateway_callback(&gateway, &failed);
    assert_eq!(
        result.err(),
        Some(EscrowError::GatewayVerificationFailed(
            VerifyFailure::ProviderFailure("101".to_string())
        ))
    );
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Pending);

    // The provider later reports success for the same transaction.
    let outcome = engine
        .handle_gateway_callback(&gateway, &success_callback(&txn.fields))
        .unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Applied {
            auto_delivered: false
        }
    );
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Paid);
}

#[test]
fn sandbox_mode_short_circuits_verification() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = SwiftPayGateway::new(SwiftPayConfig::for_tests(true));
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();

    let callback = GatewayCallback {
        txn_ref: txn.txn_ref,
        status: "000".to_string(),
        supplied_hash: "anything-goes".to_string(),
    };
    let outcome = engine.handle_gateway_callback(&gateway, &callback).unwrap();
    assert!(matches!(outcome, CallbackOutcome::Applied { .. }));
}

// === Idempotency ===

#[test]
fn replayed_callback_settles_exactly_once() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();
    let callback = success_callback(&txn.fields);

    let first = engine.handle_gateway_callback(&gateway, &callback).unwrap();
    assert!(matches!(first, CallbackOutcome::Applied { .. }));

    for _ in 0..3 {
        let replay = engine.handle_gateway_callback(&gateway, &callback).unwrap();
        assert_eq!(replay, CallbackOutcome::AlreadySettled);
    }

    // Exactly one PAID transition: one payment system message exists.
    let system_messages = engine
        .messages_for(buyer, order_id)
        .unwrap()
        .into_iter()
        .filter(|m| m.kind == MessageKind::System)
        .count();
    assert_eq!(system_messages, 1);
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Paid);
}

#[test]
fn concurrent_callback_replays_yield_one_transition() {
    use std::sync::Arc;
    use std::thread;

    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let engine = Arc::new(engine);
    let gateway = Arc::new(production_swiftpay());
    let txn = engine.initiate_payment(gateway.as_ref(), buyer, order_id).unwrap();
    let callback = success_callback(&txn.fields);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let gateway = Arc::clone(&gateway);
            let callback = callback.clone();
            thread::spawn(move || engine.handle_gateway_callback(gateway.as_ref(), &callback))
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    let applied = outcomes
        .iter()
        .filter(|o| matches!(o, CallbackOutcome::Applied { .. }))
        .count();
    assert_eq!(applied, 1, "exactly one callback may apply the transition");
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Paid);
}

#[test]
fn callback_after_manual_paid_is_a_noop() {
    let (engine, seller, buyer, _, order_id) = setup_pending_order(Delivery::Manual);
    let gateway = production_swiftpay();
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();

    // Seller confirms out of band before the webhook lands.
    engine.mark_paid(seller, order_id).unwrap();

    let outcome = engine
        .handle_gateway_callback(&gateway, &success_callback(&txn.fields))
        .unwrap();
    assert_eq!(outcome, CallbackOutcome::AlreadySettled);
    assert_eq!(
        engine.order(order_id).unwrap().payment_method,
        Some(PaymentMethod::Manual)
    );
}

// === Automated delivery via callbacks ===

#[test]
fn gateway_payment_triggers_automated_delivery() {
    let (engine, _, buyer, _, order_id) = setup_pending_order(Delivery::Instant {
        content: "KEY-AAAA-BBBB-CCCC".to_string(),
    });
    let gateway = production_swiftpay();
    let txn = engine.initiate_payment(&gateway, buyer, order_id).unwrap();

    let outcome = engine
        .handle_gateway_callback(&gateway, &success_callback(&txn.fields))
        .unwrap();
    assert_eq!(
        outcome,
        CallbackOutcome::Applied {
            auto_delivered: true
        }
    );
    assert_eq!(engine.order(order_id).unwrap().status, OrderStatus::Delivered);

    let messages = engine.messages_for(buyer, order_id).unwrap();
    let delivered: Vec<_> = messages
        .iter()
        .filter(|m| m.kind == MessageKind::Delivery)
        .collect();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].automated);
    assert_eq!(delivered[0].content, "KEY-AAAA-BBBB-CCCC");
}
