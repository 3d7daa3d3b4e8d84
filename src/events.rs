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

//! Event port for real-time notification.
//!
//! The engine publishes two logical events per transition, scoped to the
//! order: `new-message` and `order-status-updated`. The transport that
//! fans these out to connected parties is external; the engine only
//! guarantees each event is published exactly once per transition.

use crate::base::OrderId;
use crate::message::Message;
use crate::order::OrderStatus;
use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde::Serialize;

/// A real-time event emitted by the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OrderEvent {
    /// A message was appended to the order's conversation.
    NewMessage { order_id: OrderId, message: Message },
    /// The order moved to a new status.
    OrderStatusUpdated {
        order_id: OrderId,
        status: OrderStatus,
        automated: bool,
    },
}

impl OrderEvent {
    pub const fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::NewMessage { order_id, .. }
            | OrderEvent::OrderStatusUpdated { order_id, .. } => *order_id,
        }
    }
}

/// Sink the engine publishes events through.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: OrderEvent);
}

/// Discards all events. Default for embedders that don't need real-time
/// notification.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: OrderEvent) {}
}

/// Forwards events into an unbounded channel for an external consumer
/// (the server binary drains this into its transport).
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<OrderEvent>,
}

impl ChannelSink {
    /// Creates a sink plus the receiving end the transport drains.
    pub fn unbounded() -> (Self, Receiver<OrderEvent>) {
        let (tx, rx) = unbounded();
        (ChannelSink { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: OrderEvent) {
        // Receiver may have gone away during shutdown; events are
        // best-effort notifications, never load-bearing state.
        let _ = self.tx.send(event);
    }
}

/// Captures events for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OrderEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<OrderEvent> {
        self.events.lock().clone()
    }

    /// Drains and returns the captured events.
    pub fn take(&self) -> Vec<OrderEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: OrderEvent) {
        self.events.lock().push(event);
    }
}
