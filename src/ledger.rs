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

//! Append-only ledger of balance-affecting events.
//!
//! Every fund movement creates exactly one entry; entries are immutable
//! once appended. The authoritative balance of a user is the sum of their
//! COMPLETED credits minus debits — the `balance` field on [`crate::User`]
//! is only a projection of that sum.
//!
//! Released funds for unverified sellers carry a `hold_until` timestamp.
//! The hold does not delay the ledger entry itself; it is a contract for
//! downstream withdrawal consumers, exposed via
//! [`Ledger::withdrawable_balance_of`].

use crate::base::{EntryId, OrderId, UserId};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hold applied to escrow releases for unverified sellers.
pub const UNVERIFIED_HOLD_HOURS: i64 = 48;

/// Direction of a fund movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryKind {
    Credit,
    Debit,
}

/// Settlement state of an entry. Only COMPLETED entries count toward the
/// authoritative balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Completed,
    Pending,
}

/// Why the funds moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMethod {
    /// Buyer confirmed delivery; escrow released to the seller.
    EscrowRelease,
    /// Admin force-completed the order.
    AdminOverride,
    /// Dispute resolved in the buyer's favour.
    DisputeRefund,
}

impl EntryMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntryMethod::EscrowRelease => "escrow_release",
            EntryMethod::AdminOverride => "admin_override",
            EntryMethod::DisputeRefund => "dispute_refund",
        }
    }
}

/// One immutable fund movement.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user: UserId,
    pub order: OrderId,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub status: EntryStatus,
    pub method: EntryMethod,
    /// Withdrawal consumers must not release these funds before this time.
    pub hold_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed contribution of this entry to the authoritative balance.
    fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Credit => self.amount,
            EntryKind::Debit => -self.amount,
        }
    }

    /// True while the entry's funds are still held.
    pub fn held_at(&self, now: DateTime<Utc>) -> bool {
        self.hold_until.is_some_and(|until| until > now)
    }
}

/// Append-only ledger store.
#[derive(Debug)]
pub struct Ledger {
    entries: Mutex<Vec<LedgerEntry>>,
    next_id: AtomicU64,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Computes the hold expiry for a release to the given seller.
    pub fn hold_for(seller_verified: bool, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if seller_verified {
            None
        } else {
            Some(now + Duration::hours(UNVERIFIED_HOLD_HOURS))
        }
    }

    /// Appends one entry. Callers are responsible for mutating the user's
    /// balance projection in the same critical section.
    pub fn append(
        &self,
        user: UserId,
        order: OrderId,
        kind: EntryKind,
        amount: Decimal,
        method: EntryMethod,
        hold_until: Option<DateTime<Utc>>,
    ) -> EntryId {
        debug_assert!(
            amount >= Decimal::ZERO,
            "ledger amounts are unsigned; kind encodes direction"
        );
        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = LedgerEntry {
            id,
            user,
            order,
            kind,
            amount,
            status: EntryStatus::Completed,
            method,
            hold_until,
            created_at: Utc::now(),
        };
        self.entries.lock().push(entry);
        id
    }

    /// Authoritative balance: sum of COMPLETED credits minus debits.
    pub fn balance_of(&self, user: UserId) -> Decimal {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.user == user && e.status == EntryStatus::Completed)
            .map(LedgerEntry::signed_amount)
            .sum()
    }

    /// Balance excluding funds still under hold at `now`. This is the
    /// contract withdrawal consumers must read.
    pub fn withdrawable_balance_of(&self, user: UserId, now: DateTime<Utc>) -> Decimal {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.user == user && e.status == EntryStatus::Completed && !e.held_at(now))
            .map(LedgerEntry::signed_amount)
            .sum()
    }

    /// All entries for a user, in append order.
    pub fn entries_for(&self, user: UserId) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.user == user)
            .cloned()
            .collect()
    }

    /// All entries touching an order, in append order.
    pub fn entries_for_order(&self, order: OrderId) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.order == order)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
