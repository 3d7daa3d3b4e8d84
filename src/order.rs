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

//! Orders and the escrow state machine.
//!
//! Orders follow a fixed lifecycle:
//!
//! ```text
//! PENDING ──paid──► PAID ──delivered──► DELIVERED ──completed──► COMPLETED
//!    │                │                     │
//!    └────────────────┴──────dispute────────┘──► DISPUTED ──► COMPLETED | REFUNDED
//! ```
//!
//! `COMPLETED` and `REFUNDED` are terminal. The monetary fields of an order
//! are frozen at creation: `amount = item_price + commission`, where the
//! commission is a snapshot of the listing's rate at purchase time. Later
//! rate changes never affect existing orders.

use crate::base::{ListingId, OrderId, UserId};
use crate::error::EscrowError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Created, awaiting payment.
    Pending,
    /// Funds confirmed, held in escrow.
    Paid,
    /// Seller (or the delivery engine) handed over the goods.
    Delivered,
    /// Buyer confirmed receipt; funds released to the seller.
    Completed,
    /// Under dispute; resolves to Completed or Refunded.
    Disputed,
    /// Funds returned to the buyer after dispute resolution.
    Refunded,
}

impl OrderStatus {
    /// Checks whether a transition to the target state is valid.
    pub const fn can_transition_to(&self, target: Self) -> bool {
        use OrderStatus::{Completed, Delivered, Disputed, Paid, Pending, Refunded};

        matches!(
            (self, target),
            (Pending, Paid)
                | (Paid, Delivered)
                | (Delivered, Completed)
                | (Pending | Paid | Delivered, Disputed)
                | (Disputed, Completed | Refunded)
        )
    }

    /// Returns true for states with no outgoing transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Refunded)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Disputed => "DISPUTED",
            OrderStatus::Refunded => "REFUNDED",
        };
        write!(f, "{name}")
    }
}

/// How the buyer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// SwiftPay mobile wallet (gateway A).
    SwiftPay,
    /// PayFast mobile wallet (gateway B).
    PayFast,
    /// Direct bank transfer, confirmed manually by the seller.
    BankTransfer,
    /// Seller confirmed payment out of band.
    Manual,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::SwiftPay => "swiftpay",
            PaymentMethod::PayFast => "payfast",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Manual => "manual",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "swiftpay" => Ok(PaymentMethod::SwiftPay),
            "payfast" => Ok(PaymentMethod::PayFast),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "manual" => Ok(PaymentMethod::Manual),
            other => Err(EscrowError::InvalidInput(format!(
                "unsupported payment method: {other}"
            ))),
        }
    }
}

/// Commission owed to the platform for a sale.
///
/// Computed once at order creation from the listing's snapshot rate and
/// never recalculated.
pub fn commission_for(price: Decimal, rate_percent: Decimal) -> Decimal {
    price * rate_percent / Decimal::ONE_HUNDRED
}

/// An escrow-mediated order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub listing_id: ListingId,
    pub buyer: UserId,
    pub seller: UserId,
    /// Listing price at purchase time.
    pub item_price: Decimal,
    /// Platform commission, frozen at creation.
    pub commission: Decimal,
    /// Total charged to the buyer: `item_price + commission`.
    pub amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// What the seller receives when the order completes.
    pub fn seller_earnings(&self) -> Decimal {
        self.amount - self.commission
    }

    /// Attempts a state-machine transition, leaving the order unchanged on
    /// failure.
    pub(crate) fn transition(
        &mut self,
        target: OrderStatus,
        action: &'static str,
    ) -> Result<(), EscrowError> {
        if self.status.can_transition_to(target) {
            self.status = target;
            Ok(())
        } else {
            Err(EscrowError::StateConflict {
                action,
                status: self.status,
            })
        }
    }

    /// Admin override: completes from any non-terminal state.
    pub(crate) fn force_complete(&mut self) -> Result<(), EscrowError> {
        if self.status.is_terminal() {
            return Err(EscrowError::StateConflict {
                action: "force-complete",
                status: self.status,
            });
        }
        self.status = OrderStatus::Completed;
        Ok(())
    }
}
