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

//! Order state machine and escrow orchestrator.
//!
//! The [`Engine`] owns every shared mutable resource of the escrow core:
//! user balances, listing stock, order status, the message log, the ledger
//! and the gateway transaction registry. Rows are indexed by [`DashMap`]
//! and serialized by a per-row [`parking_lot::Mutex`], so independent
//! orders process in parallel while each order's transitions linearize.
//!
//! # Locking
//!
//! Every guard-then-write sequence holds the owning row lock for the whole
//! read-check-write. Nested acquisition is always `order -> listing` or
//! `order -> user`, with the ledger and message log taken last; the
//! ordering is acyclic, so the engine cannot deadlock.
//!
//! # Invariants
//!
//! - `amount = item_price + commission`, frozen at order creation.
//! - Every balance change appends exactly one ledger entry in the same
//!   critical section.
//! - Stock never goes negative; a limited listing deactivates exactly when
//!   its quantity reaches zero.
//! - A replayed gateway callback never produces a second PAID transition.

use crate::base::{ListingId, MessageId, OrderId, TxnRef, UserId};
use crate::delivery::{DeliveryOutcome, validate_delivery_content};
use crate::error::{EscrowError, VerifyFailure};
use crate::events::{EventSink, NullSink, OrderEvent};
use crate::gateway::{InitiateRequest, InitiatedTxn, PaymentGateway};
use crate::ledger::{EntryKind, EntryMethod, Ledger};
use crate::listing::{Delivery, Listing, Stock};
use crate::message::{MAX_CHAT_LEN, Message, MessageKind};
use crate::order::{Order, OrderStatus, PaymentMethod, commission_for};
use crate::txn_registry::{TxnRecord, TxnRegistry};
use crate::user::{Role, User};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Disputes shorter than this are rejected as malformed.
pub const MIN_DISPUTE_REASON_LEN: usize = 10;

/// Parameters for creating a listing.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub price: Decimal,
    /// Commission rate (percent) snapshotted into each order.
    pub commission_rate: Decimal,
    pub stock: Stock,
    pub delivery: Delivery,
}

/// Returned from a successful purchase: the new order plus its cost
/// breakdown.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub order: Order,
    pub item_price: Decimal,
    pub commission: Decimal,
    pub amount: Decimal,
}

/// Result of a PENDING -> PAID transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaidOutcome {
    /// True when the automated delivery engine also ran PAID -> DELIVERED.
    pub auto_delivered: bool,
}

/// Result of releasing escrow to the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionReceipt {
    pub seller_earnings: Decimal,
    /// Present when the seller is unverified; funds stay held until then.
    pub hold_until: Option<DateTime<Utc>>,
}

/// Data a provider posts back after the buyer authorizes (or fails) a
/// payment.
#[derive(Debug, Clone)]
pub struct GatewayCallback {
    pub txn_ref: TxnRef,
    /// Provider status/response code.
    pub status: String,
    pub supplied_hash: String,
}

/// Outcome of an inbound gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The PENDING -> PAID transition was applied.
    Applied { auto_delivered: bool },
    /// Replayed or raced callback; everything already happened, nothing
    /// changed.
    AlreadySettled,
}

/// Escrow engine managing users, listings, orders, messages and the
/// ledger.
pub struct Engine {
    pub(crate) users: DashMap<UserId, Mutex<User>>,
    pub(crate) listings: DashMap<ListingId, Mutex<Listing>>,
    pub(crate) orders: DashMap<OrderId, Mutex<Order>>,
    pub(crate) messages: Mutex<Vec<Message>>,
    pub(crate) ledger: Ledger,
    pub(crate) registry: TxnRegistry,
    pub(crate) events: Arc<dyn EventSink>,
    next_user_id: AtomicU64,
    next_listing_id: AtomicU64,
    next_order_id: AtomicU64,
    next_message_id: AtomicU64,
}

impl Engine {
    /// Creates an engine that discards real-time events.
    pub fn new() -> Self {
        Self::with_events(Arc::new(NullSink))
    }

    /// Creates an engine publishing events through the given sink.
    pub fn with_events(events: Arc<dyn EventSink>) -> Self {
        Engine {
            users: DashMap::new(),
            listings: DashMap::new(),
            orders: DashMap::new(),
            messages: Mutex::new(Vec::new()),
            ledger: Ledger::new(),
            registry: TxnRegistry::new(),
            events,
            next_user_id: AtomicU64::new(1),
            next_listing_id: AtomicU64::new(1),
            next_order_id: AtomicU64::new(1),
            next_message_id: AtomicU64::new(1),
        }
    }

    // === Users ===

    pub fn create_user(
        &self,
        username: impl Into<String>,
        email: impl Into<String>,
        verified: bool,
    ) -> UserId {
        let id = UserId(self.next_user_id.fetch_add(1, Ordering::Relaxed));
        let mut user = User::new(id, username, email);
        user.verified = verified;
        self.users.insert(id, Mutex::new(user));
        id
    }

    pub fn create_admin(&self, username: impl Into<String>, email: impl Into<String>) -> UserId {
        let id = self.create_user(username, email, true);
        if let Some(row) = self.users.get(&id) {
            row.lock().role = Role::Admin;
        }
        id
    }

    /// Admin action: ban or unban a user.
    pub fn set_banned(
        &self,
        admin: UserId,
        target: UserId,
        banned: bool,
    ) -> Result<(), EscrowError> {
        self.require_admin(admin)?;
        let row = self.users.get(&target).ok_or(EscrowError::NotFound("user"))?;
        row.lock().banned = banned;
        info!(%target, banned, "user ban status updated");
        Ok(())
    }

    /// Snapshot of a user.
    pub fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|row| row.lock().clone())
    }

    /// Cached balance projection for a user.
    pub fn balance_of(&self, id: UserId) -> Option<Decimal> {
        self.user(id).map(|u| u.balance)
    }

    /// True when the cached balance equals the authoritative ledger sum.
    pub fn audit_user_balance(&self, id: UserId) -> Option<bool> {
        self.balance_of(id)
            .map(|cached| cached == self.ledger.balance_of(id))
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // === Listings ===

    pub fn create_listing(
        &self,
        seller: UserId,
        new: NewListing,
    ) -> Result<ListingId, EscrowError> {
        let seller_user = self.user(seller).ok_or(EscrowError::Unauthorized)?;
        if seller_user.banned {
            return Err(EscrowError::Forbidden("account is banned"));
        }
        if new.title.trim().is_empty() {
            return Err(EscrowError::InvalidInput("title is required".to_string()));
        }
        if new.price <= Decimal::ZERO {
            return Err(EscrowError::InvalidInput(
                "price must be positive".to_string(),
            ));
        }
        if new.commission_rate < Decimal::ZERO || new.commission_rate > Decimal::ONE_HUNDRED {
            return Err(EscrowError::InvalidInput(
                "commission rate must be between 0 and 100".to_string(),
            ));
        }
        if let Delivery::Instant { content } = &new.delivery {
            validate_delivery_content(content)?;
        }

        let id = ListingId(self.next_listing_id.fetch_add(1, Ordering::Relaxed));
        let listing = Listing {
            id,
            seller,
            title: new.title,
            price: new.price,
            commission_rate: new.commission_rate,
            stock: new.stock,
            delivery: new.delivery,
            active: true,
            hidden: false,
        };
        self.listings.insert(id, Mutex::new(listing));
        info!(listing_id = %id, %seller, "listing created");
        Ok(id)
    }

    /// Seller action: hide or unhide a listing.
    pub fn set_listing_hidden(
        &self,
        actor: UserId,
        listing_id: ListingId,
        hidden: bool,
    ) -> Result<(), EscrowError> {
        let row = self
            .listings
            .get(&listing_id)
            .ok_or(EscrowError::NotFound("listing"))?;
        let mut listing = row.lock();
        if listing.seller != actor {
            return Err(EscrowError::Forbidden("only the seller can edit a listing"));
        }
        listing.hidden = hidden;
        Ok(())
    }

    /// Removes a listing. Only allowed while it has no open orders.
    pub fn delete_listing(&self, actor: UserId, listing_id: ListingId) -> Result<(), EscrowError> {
        let seller = {
            let row = self
                .listings
                .get(&listing_id)
                .ok_or(EscrowError::NotFound("listing"))?;
            row.lock().seller
        };
        let actor_user = self.user(actor).ok_or(EscrowError::Unauthorized)?;
        if seller != actor && !actor_user.is_admin() {
            return Err(EscrowError::Forbidden(
                "only the seller can delete a listing",
            ));
        }
        let has_open_orders = self.orders.iter().any(|entry| {
            let order = entry.lock();
            order.listing_id == listing_id && !order.status.is_terminal()
        });
        if has_open_orders {
            return Err(EscrowError::Unavailable("listing has open orders"));
        }
        self.listings.remove(&listing_id);
        Ok(())
    }

    /// Snapshot of a listing.
    pub fn listing(&self, id: ListingId) -> Option<Listing> {
        self.listings.get(&id).map(|row| row.lock().clone())
    }

    // === Orders ===

    /// Creates an order in escrow, decrementing limited stock atomically.
    pub fn purchase(
        &self,
        buyer: UserId,
        listing_id: ListingId,
        payment_method: Option<PaymentMethod>,
    ) -> Result<PurchaseReceipt, EscrowError> {
        let buyer_user = self.user(buyer).ok_or(EscrowError::Unauthorized)?;
        if buyer_user.banned {
            return Err(EscrowError::Forbidden("account is banned"));
        }

        let (item_price, commission, seller) = {
            let row = self
                .listings
                .get(&listing_id)
                .ok_or(EscrowError::NotFound("listing"))?;
            // The listing lock spans the availability check and the
            // decrement: concurrent buyers of the last unit serialize here.
            let mut listing = row.lock();
            if listing.seller == buyer {
                return Err(EscrowError::Forbidden("cannot buy your own listing"));
            }
            listing.ensure_purchasable()?;
            listing.take_unit()?;
            (
                listing.price,
                commission_for(listing.price, listing.commission_rate),
                listing.seller,
            )
        };

        let amount = item_price + commission;
        let id = OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed));
        let order = Order {
            id,
            listing_id,
            buyer,
            seller,
            item_price,
            commission,
            amount,
            status: OrderStatus::Pending,
            payment_method,
            created_at: Utc::now(),
        };
        self.orders.insert(id, Mutex::new(order.clone()));
        info!(order_id = %id, %listing_id, %buyer, %amount, "order created in escrow");

        Ok(PurchaseReceipt {
            order,
            item_price,
            commission,
            amount,
        })
    }

    /// Snapshot of an order.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|row| row.lock().clone())
    }

    /// Seller confirms payment received out of band.
    pub fn mark_paid(&self, actor: UserId, order_id: OrderId) -> Result<PaidOutcome, EscrowError> {
        self.user(actor).ok_or(EscrowError::Unauthorized)?;
        {
            let row = self
                .orders
                .get(&order_id)
                .ok_or(EscrowError::NotFound("order"))?;
            let mut order = row.lock();
            if order.seller != actor {
                return Err(EscrowError::Forbidden(
                    "only the seller can mark order as paid",
                ));
            }
            order.transition(OrderStatus::Paid, "mark paid")?;
            if order.payment_method.is_none() {
                order.payment_method = Some(PaymentMethod::Manual);
            }
            let buyer = order.buyer;
            self.push_message(
                order_id,
                actor,
                buyer,
                "Order marked as PAID by seller. Awaiting delivery.".to_string(),
                MessageKind::System,
                false,
            );
            self.publish_status(order_id, OrderStatus::Paid, false);
        }
        info!(%order_id, "order marked paid by seller");

        let auto_delivered =
            self.process_automated_delivery(order_id) == DeliveryOutcome::Delivered;
        Ok(PaidOutcome { auto_delivered })
    }

    /// Gateway-confirmed payment. No actor: the caller has already verified
    /// the provider callback.
    pub(crate) fn gateway_paid(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        txn_ref: &TxnRef,
    ) -> Result<(), EscrowError> {
        let row = self
            .orders
            .get(&order_id)
            .ok_or(EscrowError::NotFound("order"))?;
        let mut order = row.lock();
        order.transition(OrderStatus::Paid, "mark paid")?;
        order.payment_method = Some(method);
        let (buyer, seller) = (order.buyer, order.seller);
        self.push_message(
            order_id,
            buyer,
            seller,
            format!("Payment completed via {method}. Transaction {txn_ref}."),
            MessageKind::System,
            false,
        );
        self.publish_status(order_id, OrderStatus::Paid, false);
        info!(%order_id, %method, %txn_ref, "order paid via gateway");
        Ok(())
    }

    /// Seller hands over the goods.
    pub fn mark_delivered(
        &self,
        actor: UserId,
        order_id: OrderId,
        note: Option<String>,
    ) -> Result<(), EscrowError> {
        self.user(actor).ok_or(EscrowError::Unauthorized)?;
        let row = self
            .orders
            .get(&order_id)
            .ok_or(EscrowError::NotFound("order"))?;
        let mut order = row.lock();
        if order.seller != actor {
            return Err(EscrowError::Forbidden(
                "only the seller can mark order as delivered",
            ));
        }
        order.transition(OrderStatus::Delivered, "deliver")?;

        let instant = self
            .listings
            .get(&order.listing_id)
            .map(|l| l.lock().delivery.is_instant())
            .unwrap_or(false);
        let buyer = order.buyer;
        let content = note.unwrap_or_else(|| {
            "Order has been delivered! Please confirm receipt to complete the transaction."
                .to_string()
        });
        self.push_message(
            order_id,
            actor,
            buyer,
            content,
            MessageKind::Delivery,
            instant,
        );
        self.publish_status(order_id, OrderStatus::Delivered, false);
        info!(%order_id, "order delivered by seller");
        Ok(())
    }

    /// Buyer confirms receipt: releases escrow to the seller.
    ///
    /// The status flip, the ledger entry, the balance increment and the
    /// completion message commit as one atomic unit under the order and
    /// seller row locks.
    pub fn complete(
        &self,
        actor: UserId,
        order_id: OrderId,
        note: Option<String>,
    ) -> Result<CompletionReceipt, EscrowError> {
        self.user(actor).ok_or(EscrowError::Unauthorized)?;
        let row = self
            .orders
            .get(&order_id)
            .ok_or(EscrowError::NotFound("order"))?;
        let mut order = row.lock();
        if order.buyer != actor {
            return Err(EscrowError::Forbidden(
                "only the buyer can complete the order",
            ));
        }
        let seller = order.seller;
        let seller_row = self
            .users
            .get(&seller)
            .ok_or(EscrowError::NotFound("user"))?;

        order.transition(OrderStatus::Completed, "complete")?;
        let earnings = order.seller_earnings();
        let hold_until = self.release_to_seller(
            &seller_row,
            order_id,
            earnings,
            EntryMethod::EscrowRelease,
        );

        let content = note.unwrap_or_else(|| {
            let hold_notice = if hold_until.is_some() {
                " (48-hour hold applies)"
            } else {
                ""
            };
            format!("Order completed! Payment of PKR {earnings} has been released to the seller{hold_notice}.")
        });
        self.push_message(
            order_id,
            actor,
            seller,
            content,
            MessageKind::Completion,
            false,
        );
        self.publish_status(order_id, OrderStatus::Completed, false);
        info!(%order_id, %seller, %earnings, "escrow released");

        Ok(CompletionReceipt {
            seller_earnings: earnings,
            hold_until,
        })
    }

    /// Buyer or seller opens a dispute.
    pub fn dispute(
        &self,
        actor: UserId,
        order_id: OrderId,
        reason: &str,
    ) -> Result<(), EscrowError> {
        let reason = reason.trim();
        if reason.chars().count() < MIN_DISPUTE_REASON_LEN {
            return Err(EscrowError::InvalidInput(format!(
                "dispute reason must be at least {MIN_DISPUTE_REASON_LEN} characters"
            )));
        }
        self.user(actor).ok_or(EscrowError::Unauthorized)?;
        let row = self
            .orders
            .get(&order_id)
            .ok_or(EscrowError::NotFound("order"))?;
        let mut order = row.lock();
        if order.buyer != actor && order.seller != actor {
            return Err(EscrowError::Forbidden(
                "only buyer or seller can dispute this order",
            ));
        }
        order.transition(OrderStatus::Disputed, "dispute")?;

        let initiated_by_buyer = order.buyer == actor;
        let role = if initiated_by_buyer { "buyer" } else { "seller" };
        let other_party = if initiated_by_buyer {
            order.seller
        } else {
            order.buyer
        };
        self.push_message(
            order_id,
            actor,
            other_party,
            format!("Dispute initiated by {role}: {reason}"),
            MessageKind::Dispute,
            false,
        );
        self.publish_status(order_id, OrderStatus::Disputed, false);
        warn!(%order_id, initiator = role, "order disputed");
        Ok(())
    }

    /// Admin override: completes the order from any non-terminal state with
    /// the normal ledger effect, tagged as an admin action.
    pub fn force_complete(
        &self,
        admin: UserId,
        order_id: OrderId,
        note: Option<String>,
    ) -> Result<CompletionReceipt, EscrowError> {
        self.require_admin(admin)?;
        let row = self
            .orders
            .get(&order_id)
            .ok_or(EscrowError::NotFound("order"))?;
        let mut order = row.lock();
        let seller = order.seller;
        let seller_row = self
            .users
            .get(&seller)
            .ok_or(EscrowError::NotFound("user"))?;

        order.force_complete()?;
        let earnings = order.seller_earnings();
        let hold_until = self.release_to_seller(
            &seller_row,
            order_id,
            earnings,
            EntryMethod::AdminOverride,
        );

        let buyer = order.buyer;
        let content = match note {
            Some(note) => format!("Order force-completed by admin: {note}. Payment released to seller."),
            None => "Order force-completed by admin. Payment released to seller.".to_string(),
        };
        self.push_message(order_id, admin, buyer, content, MessageKind::System, false);
        self.publish_status(order_id, OrderStatus::Completed, false);
        warn!(%order_id, %admin, %earnings, "order force-completed by admin");

        Ok(CompletionReceipt {
            seller_earnings: earnings,
            hold_until,
        })
    }

    /// Admin resolution of a dispute in the buyer's favour: refunds the
    /// full order amount.
    pub fn refund(
        &self,
        admin: UserId,
        order_id: OrderId,
        note: Option<String>,
    ) -> Result<(), EscrowError> {
        self.require_admin(admin)?;
        let row = self
            .orders
            .get(&order_id)
            .ok_or(EscrowError::NotFound("order"))?;
        let mut order = row.lock();
        let buyer = order.buyer;
        let buyer_row = self
            .users
            .get(&buyer)
            .ok_or(EscrowError::NotFound("user"))?;

        order.transition(OrderStatus::Refunded, "refund")?;
        let amount = order.amount;
        {
            let mut buyer_user = buyer_row.lock();
            self.ledger.append(
                buyer,
                order_id,
                EntryKind::Credit,
                amount,
                EntryMethod::DisputeRefund,
                None,
            );
            buyer_user.balance += amount;
        }

        let content = match note {
            Some(note) => format!("Dispute resolved: order refunded ({note}). PKR {amount} returned to buyer."),
            None => format!("Dispute resolved: order refunded. PKR {amount} returned to buyer."),
        };
        self.push_message(order_id, admin, buyer, content, MessageKind::System, false);
        self.publish_status(order_id, OrderStatus::Refunded, false);
        warn!(%order_id, %buyer, %amount, "order refunded to buyer");
        Ok(())
    }

    // === Payments ===

    /// Buyer starts a wallet payment for a pending order.
    pub fn initiate_payment(
        &self,
        gateway: &dyn PaymentGateway,
        actor: UserId,
        order_id: OrderId,
    ) -> Result<InitiatedTxn, EscrowError> {
        let buyer = self.user(actor).ok_or(EscrowError::Unauthorized)?;
        let order = self.order(order_id).ok_or(EscrowError::NotFound("order"))?;
        if order.buyer != actor {
            return Err(EscrowError::Forbidden(
                "only the buyer can initiate payment",
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(EscrowError::StateConflict {
                action: "initiate payment",
                status: order.status,
            });
        }

        let title = self
            .listings
            .get(&order.listing_id)
            .map(|l| l.lock().title.clone())
            .unwrap_or_default();
        let request = InitiateRequest {
            order_id,
            amount: order.amount,
            buyer_email: buyer.email,
            buyer_phone: None,
            description: format!("Payment for {title} - order #{order_id}"),
        };
        let txn = gateway.initiate(&request)?;
        self.registry.register(TxnRecord {
            txn_ref: txn.txn_ref.clone(),
            order_id,
            method: gateway.method(),
            amount: order.amount,
            fields: txn.fields.clone(),
            initiated_at: Utc::now(),
            settled: false,
        })?;
        if let Some(row) = self.orders.get(&order_id) {
            row.lock().payment_method = Some(gateway.method());
        }
        info!(%order_id, method = %gateway.method(), txn_ref = %txn.txn_ref, "payment initiated");
        Ok(txn)
    }

    /// Applies a provider callback: verify, then PENDING -> PAID exactly
    /// once. Safe to replay; a duplicate callback no-ops.
    pub fn handle_gateway_callback(
        &self,
        gateway: &dyn PaymentGateway,
        callback: &GatewayCallback,
    ) -> Result<CallbackOutcome, EscrowError> {
        let record = self.registry.get(&callback.txn_ref).ok_or(
            EscrowError::GatewayVerificationFailed(VerifyFailure::UnknownTransaction),
        )?;
        if record.settled {
            info!(txn_ref = %callback.txn_ref, "replayed callback for settled transaction");
            return Ok(CallbackOutcome::AlreadySettled);
        }
        if record.expired_at(Utc::now()) {
            return Err(VerifyFailure::Expired.into());
        }
        gateway.verify(&record.fields, &callback.supplied_hash)?;
        if !gateway.callback_succeeded(&callback.status) {
            warn!(
                txn_ref = %callback.txn_ref,
                status = %callback.status,
                "provider reported payment failure; order stays pending"
            );
            return Err(VerifyFailure::ProviderFailure(callback.status.clone()).into());
        }

        if !self.registry.try_settle(&callback.txn_ref) {
            return Ok(CallbackOutcome::AlreadySettled);
        }
        match self.gateway_paid(record.order_id, record.method, &callback.txn_ref) {
            Ok(()) => {
                let auto_delivered =
                    self.process_automated_delivery(record.order_id) == DeliveryOutcome::Delivered;
                Ok(CallbackOutcome::Applied { auto_delivered })
            }
            // The order was paid through another path (e.g. the seller
            // confirmed manually); the callback has nothing left to do.
            Err(EscrowError::StateConflict { .. }) => {
                info!(order_id = %record.order_id, "order already paid; callback is a no-op");
                Ok(CallbackOutcome::AlreadySettled)
            }
            Err(other) => Err(other),
        }
    }

    // === Messages ===

    /// Participant posts a chat message to the order conversation.
    pub fn post_message(
        &self,
        actor: UserId,
        order_id: OrderId,
        content: &str,
    ) -> Result<Message, EscrowError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EscrowError::InvalidInput(
                "message content is required".to_string(),
            ));
        }
        if content.chars().count() > MAX_CHAT_LEN {
            return Err(EscrowError::InvalidInput(format!(
                "message content cannot exceed {MAX_CHAT_LEN} characters"
            )));
        }
        self.user(actor).ok_or(EscrowError::Unauthorized)?;
        let order = self.order(order_id).ok_or(EscrowError::NotFound("order"))?;
        if order.buyer != actor && order.seller != actor {
            return Err(EscrowError::Forbidden("access denied"));
        }
        let receiver = if order.buyer == actor {
            order.seller
        } else {
            order.buyer
        };
        Ok(self.push_message(
            order_id,
            actor,
            receiver,
            content.to_string(),
            MessageKind::Text,
            false,
        ))
    }

    /// Fetches an order's conversation, marking messages addressed to the
    /// reader as read.
    pub fn messages_for(
        &self,
        actor: UserId,
        order_id: OrderId,
    ) -> Result<Vec<Message>, EscrowError> {
        self.user(actor).ok_or(EscrowError::Unauthorized)?;
        let order = self.order(order_id).ok_or(EscrowError::NotFound("order"))?;
        if order.buyer != actor && order.seller != actor {
            return Err(EscrowError::Forbidden("access denied"));
        }
        let now = Utc::now();
        let mut log = self.messages.lock();
        let mut result = Vec::new();
        for message in log.iter_mut().filter(|m| m.order_id == order_id) {
            if message.receiver == actor && message.read_at.is_none() {
                message.read_at = Some(now);
            }
            result.push(message.clone());
        }
        Ok(result)
    }

    // === Internals ===

    /// Appends a message to the log and publishes `new-message`.
    pub(crate) fn push_message(
        &self,
        order_id: OrderId,
        sender: UserId,
        receiver: UserId,
        content: String,
        kind: MessageKind,
        automated: bool,
    ) -> Message {
        let id = MessageId(self.next_message_id.fetch_add(1, Ordering::Relaxed));
        let message = Message {
            id,
            order_id,
            sender,
            receiver,
            content,
            kind,
            automated,
            read_at: None,
            created_at: Utc::now(),
        };
        self.messages.lock().push(message.clone());
        self.events.publish(OrderEvent::NewMessage {
            order_id,
            message: message.clone(),
        });
        message
    }

    /// Publishes `order-status-updated`.
    pub(crate) fn publish_status(&self, order_id: OrderId, status: OrderStatus, automated: bool) {
        self.events.publish(OrderEvent::OrderStatusUpdated {
            order_id,
            status,
            automated,
        });
    }

    /// Credits a seller in the same critical section as the caller's status
    /// transition: ledger entry and balance projection move together.
    fn release_to_seller(
        &self,
        seller_row: &dashmap::mapref::one::Ref<'_, UserId, Mutex<User>>,
        order_id: OrderId,
        earnings: Decimal,
        method: EntryMethod,
    ) -> Option<DateTime<Utc>> {
        let mut seller = seller_row.lock();
        let hold_until = Ledger::hold_for(seller.verified, Utc::now());
        self.ledger.append(
            seller.id,
            order_id,
            EntryKind::Credit,
            earnings,
            method,
            hold_until,
        );
        seller.balance += earnings;
        hold_until
    }

    fn require_admin(&self, actor: UserId) -> Result<(), EscrowError> {
        let user = self.user(actor).ok_or(EscrowError::Unauthorized)?;
        if user.banned {
            return Err(EscrowError::Forbidden("account is banned"));
        }
        if !user.is_admin() {
            return Err(EscrowError::Forbidden("admin access required"));
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
