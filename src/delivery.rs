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

//! Automated delivery of instant listings.
//!
//! Runs immediately after every successful PENDING -> PAID transition. An
//! order qualifies when its listing is instant-delivery with non-empty
//! content and the order is still PAID at execution time — the status is
//! re-checked under the order lock because a manual seller delivery or a
//! retried webhook may race this call. A second invocation finds the order
//! no longer PAID and reports [`DeliveryOutcome::NotEligible`], which is an
//! expected no-op, not an error.

use crate::base::OrderId;
use crate::engine::Engine;
use crate::error::EscrowError;
use crate::message::MessageKind;
use crate::order::OrderStatus;
use tracing::{debug, info};

/// Maximum length of instant-delivery content.
pub const MAX_CONTENT_LEN: usize = 5000;

/// Markup fragments that must never appear in delivery content.
const FORBIDDEN_PATTERNS: [&str; 4] = ["<script", "javascript:", "onload=", "onerror="];

/// Result of an automated delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Content was delivered and the order moved to DELIVERED.
    Delivered,
    /// The order did not qualify; nothing changed.
    NotEligible,
}

/// Validates content before it can be attached to an instant listing.
pub fn validate_delivery_content(content: &str) -> Result<(), EscrowError> {
    if content.trim().is_empty() {
        return Err(EscrowError::InvalidInput(
            "delivery content is required for instant delivery items".to_string(),
        ));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(EscrowError::InvalidInput(format!(
            "delivery content cannot exceed {MAX_CONTENT_LEN} characters"
        )));
    }
    let lowered = content.to_lowercase();
    if FORBIDDEN_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(pattern))
    {
        return Err(EscrowError::InvalidInput(
            "delivery content contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

impl Engine {
    /// Delivers an instant listing's content if the order qualifies.
    ///
    /// Idempotent: invoking this twice for the same order leaves the second
    /// call with [`DeliveryOutcome::NotEligible`] and no side effects.
    pub fn process_automated_delivery(&self, order_id: OrderId) -> DeliveryOutcome {
        let Some(row) = self.orders.get(&order_id) else {
            debug!(%order_id, "automated delivery skipped: order not found");
            return DeliveryOutcome::NotEligible;
        };
        let mut order = row.lock();

        // Re-check under the lock: a concurrent manual delivery or webhook
        // retry may already have moved the order on.
        if order.status != OrderStatus::Paid {
            debug!(%order_id, status = %order.status, "automated delivery skipped: order not PAID");
            return DeliveryOutcome::NotEligible;
        }

        let content = match self
            .listings
            .get(&order.listing_id)
            .and_then(|l| l.lock().delivery.content().map(str::to_string))
        {
            Some(content) if !content.trim().is_empty() => content,
            _ => {
                debug!(%order_id, "automated delivery skipped: listing not instant or has no content");
                return DeliveryOutcome::NotEligible;
            }
        };

        // Stock was already decremented at order creation; only the
        // messages and the status change happen here.
        let (buyer, seller) = (order.buyer, order.seller);
        self.push_message(
            order_id,
            seller,
            buyer,
            content,
            MessageKind::Delivery,
            true,
        );
        self.push_message(
            order_id,
            seller,
            buyer,
            "Item has been automatically delivered. Please confirm receipt when you have received your item."
                .to_string(),
            MessageKind::System,
            false,
        );
        order.status = OrderStatus::Delivered;
        self.publish_status(order_id, OrderStatus::Delivered, true);
        info!(%order_id, "automated delivery completed");

        DeliveryOutcome::Delivered
    }
}
