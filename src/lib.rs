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

//! # Bazaar Escrow
//!
//! This library provides the order escrow and settlement engine for a
//! digital-goods marketplace: buyers purchase listings, the platform holds
//! the funds, and the escrow is released to the seller once delivery is
//! confirmed — with dispute and automated-delivery paths.
//!
//! ## Core Components
//!
//! - [`Engine`]: the order state machine and orchestrator
//! - [`Ledger`]: append-only record of every balance-affecting event
//! - [`PaymentGateway`]: the wallet-gateway contract, implemented by
//!   [`SwiftPayGateway`] and [`PayFastGateway`]
//! - [`EventSink`]: port for `new-message` / `order-status-updated` events
//!
//! ## Example
//!
//! ```
//! use bazaar_escrow_rs::{Delivery, Engine, NewListing, OrderStatus, Stock};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let seller = engine.create_user("seller", "seller@example.com", true);
//! let buyer = engine.create_user("buyer", "buyer@example.com", false);
//!
//! let listing = engine
//!     .create_listing(
//!         seller,
//!         NewListing {
//!             title: "1000 gold coins".to_string(),
//!             price: dec!(2500),
//!             commission_rate: dec!(8),
//!             stock: Stock::Limited { quantity: 5 },
//!             delivery: Delivery::Manual,
//!         },
//!     )
//!     .unwrap();
//!
//! let receipt = engine.purchase(buyer, listing, None).unwrap();
//! assert_eq!(receipt.amount, dec!(2700));
//! assert_eq!(receipt.order.status, OrderStatus::Pending);
//! ```
//!
//! ## Thread Safety
//!
//! The engine serves independent orders concurrently; within one order all
//! transitions are linearized on the order's row lock, so guard checks and
//! their effects are atomic even under concurrent requests.

pub mod api;
mod base;
pub mod config;
pub mod delivery;
mod engine;
pub mod error;
pub mod events;
pub mod gateway;
mod ledger;
mod listing;
mod message;
mod order;
mod txn_registry;
mod user;

pub use base::{EntryId, ListingId, MessageId, OrderId, TxnRef, UserId};
pub use delivery::{DeliveryOutcome, MAX_CONTENT_LEN, validate_delivery_content};
pub use engine::{
    CallbackOutcome, CompletionReceipt, Engine, GatewayCallback, MIN_DISPUTE_REASON_LEN,
    NewListing, PaidOutcome, PurchaseReceipt,
};
pub use error::{EscrowError, VerifyFailure};
pub use events::{ChannelSink, EventSink, NullSink, OrderEvent, RecordingSink};
pub use gateway::payfast::PayFastGateway;
pub use gateway::swiftpay::SwiftPayGateway;
pub use gateway::{InitiateRequest, InitiatedTxn, PaymentGateway};
pub use ledger::{
    EntryKind, EntryMethod, EntryStatus, Ledger, LedgerEntry, UNVERIFIED_HOLD_HOURS,
};
pub use listing::{Delivery, Listing, Stock};
pub use message::{MAX_CHAT_LEN, Message, MessageKind};
pub use order::{Order, OrderStatus, PaymentMethod, commission_for};
pub use txn_registry::{TXN_EXPIRY_MINUTES, TxnRecord, TxnRegistry};
pub use user::{Role, User};
