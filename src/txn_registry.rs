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

//! Registry of initiated gateway transactions.
//!
//! Each initiation registers its transaction reference together with the
//! exact field map that was signed, so callbacks can be re-verified
//! server-side. Duplicate detection uses the map's entry API so the
//! check-and-insert is atomic, and settling a reference is a one-way flip:
//! a replayed callback finds the reference already settled and no-ops.

use crate::base::{OrderId, TxnRef};
use crate::error::EscrowError;
use crate::order::PaymentMethod;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Initiated transactions expire after this window; the order stays
/// PENDING and remains payable via another attempt.
pub const TXN_EXPIRY_MINUTES: i64 = 30;

/// Context captured at initiation time.
#[derive(Debug, Clone)]
pub struct TxnRecord {
    pub txn_ref: TxnRef,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount: Decimal,
    /// The provider request fields that were signed, keyed by wire name.
    pub fields: BTreeMap<String, String>,
    pub initiated_at: DateTime<Utc>,
    pub settled: bool,
}

impl TxnRecord {
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.initiated_at > Duration::minutes(TXN_EXPIRY_MINUTES)
    }
}

/// Thread-safe registry with atomic duplicate detection.
#[derive(Debug, Default)]
pub struct TxnRegistry {
    records: DashMap<TxnRef, TxnRecord>,
}

impl TxnRegistry {
    pub fn new() -> Self {
        TxnRegistry {
            records: DashMap::new(),
        }
    }

    /// Registers an initiated transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::DuplicateTransaction`] if the reference is
    /// already registered.
    pub fn register(&self, record: TxnRecord) -> Result<(), EscrowError> {
        match self.records.entry(record.txn_ref.clone()) {
            Entry::Occupied(_) => Err(EscrowError::DuplicateTransaction),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    /// Snapshot of a registered transaction.
    pub fn get(&self, txn_ref: &TxnRef) -> Option<TxnRecord> {
        self.records.get(txn_ref).map(|r| r.clone())
    }

    /// Flips the reference to settled. Returns `false` if it was already
    /// settled (or unknown) — the caller must then treat the callback as a
    /// replay and change nothing.
    pub fn try_settle(&self, txn_ref: &TxnRef) -> bool {
        match self.records.get_mut(txn_ref) {
            Some(mut record) => {
                if record.settled {
                    false
                } else {
                    record.settled = true;
                    true
                }
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
