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

//! Listings: the sellable units of the marketplace.
//!
//! The engine only mutates listings in two ways: the seller toggles
//! visibility, and purchases decrement limited stock. A limited listing
//! deactivates exactly when its quantity reaches zero.

use crate::base::{ListingId, UserId};
use crate::error::EscrowError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stock model for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Stock {
    /// Sellable any number of times.
    Unlimited,
    /// Fixed quantity; the listing deactivates at zero.
    Limited { quantity: u32 },
}

impl Stock {
    pub const fn available(&self) -> bool {
        match self {
            Stock::Unlimited => true,
            Stock::Limited { quantity } => *quantity > 0,
        }
    }
}

/// How the goods reach the buyer after payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delivery {
    /// Seller hands over the goods themselves.
    Manual,
    /// Content is released automatically on payment.
    Instant { content: String },
}

impl Delivery {
    pub const fn is_instant(&self) -> bool {
        matches!(self, Delivery::Instant { .. })
    }

    /// The automated-delivery payload, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Delivery::Manual => None,
            Delivery::Instant { content } => Some(content),
        }
    }
}

/// A seller's listing.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller: UserId,
    pub title: String,
    /// Price in currency units with minor-unit precision.
    pub price: Decimal,
    /// Commission rate (percent) snapshot applied to new orders.
    pub commission_rate: Decimal,
    pub stock: Stock,
    pub delivery: Delivery,
    pub active: bool,
    pub hidden: bool,
}

impl Listing {
    /// Guard for order creation: active, visible and in stock.
    pub fn ensure_purchasable(&self) -> Result<(), EscrowError> {
        if !self.active || self.hidden {
            return Err(EscrowError::Unavailable(
                "listing is not available for purchase",
            ));
        }
        if !self.stock.available() {
            return Err(EscrowError::Unavailable("item is out of stock"));
        }
        Ok(())
    }

    /// Consumes one unit of limited stock, deactivating at zero.
    ///
    /// Must be called while holding the listing's row lock so the check and
    /// the decrement form one atomic step.
    pub(crate) fn take_unit(&mut self) -> Result<(), EscrowError> {
        match &mut self.stock {
            Stock::Unlimited => Ok(()),
            Stock::Limited { quantity } => {
                if *quantity == 0 {
                    return Err(EscrowError::Unavailable("item is out of stock"));
                }
                *quantity -= 1;
                if *quantity == 0 {
                    self.active = false;
                }
                Ok(())
            }
        }
    }
}
