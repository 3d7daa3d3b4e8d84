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

//! Per-order message log.
//!
//! Messages are append-only: they are created by state-machine transitions
//! or by participants chatting, and the only field that ever mutates is
//! `read_at`.

use crate::base::{MessageId, OrderId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a user chat message.
pub const MAX_CHAT_LEN: usize = 1000;

/// What produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary chat between buyer and seller.
    Text,
    /// Engine-generated status note.
    System,
    /// Goods handed over (manually or automatically).
    Delivery,
    /// Dispute opened.
    Dispute,
    /// Escrow released.
    Completion,
}

/// A single message in an order's conversation.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub order_id: OrderId,
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub kind: MessageKind,
    /// True only for the delivery message produced by the automated
    /// delivery engine.
    pub automated: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_starts_unread() {
        let message = Message {
            id: MessageId(1),
            order_id: OrderId(1),
            sender: UserId(1),
            receiver: UserId(2),
            content: "hello".to_string(),
            kind: MessageKind::Text,
            automated: false,
            read_at: None,
            created_at: Utc::now(),
        };
        assert!(message.read_at.is_none());
        assert!(!message.automated);
    }
}
