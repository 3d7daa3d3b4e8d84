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

//! Wallet payment-gateway adapters.
//!
//! Both supported gateways follow the same contract: build a SHA-256-signed
//! transaction-initiation request, and re-verify the integrity hash a
//! provider echoes back in its callback. They differ in signing rules and
//! amount formatting:
//!
//! - [`swiftpay`]: signs the salt plus every request field, alphabetically
//!   sorted, `&`-joined; amounts in minor currency units (×100 integer).
//! - [`payfast`]: signs a fixed field subset plus the stored key; amounts
//!   as decimal strings with exactly two fraction digits.
//!
//! Hash comparison is constant-time. A verification failure never changes
//! order state; the order stays PENDING and can be retried via another
//! method.

pub mod payfast;
pub mod swiftpay;

use crate::base::{OrderId, TxnRef};
use crate::error::{EscrowError, VerifyFailure};
use crate::order::PaymentMethod;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use subtle::ConstantTimeEq;

/// Providers cap the free-text description field at this length.
pub const MAX_DESCRIPTION_LEN: usize = 100;

/// What the engine hands an adapter to start a payment.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub buyer_email: String,
    pub buyer_phone: Option<String>,
    pub description: String,
}

/// Result of a successful initiation.
#[derive(Debug, Clone)]
pub struct InitiatedTxn {
    pub txn_ref: TxnRef,
    /// Where the buyer's client is sent to authorize the payment.
    pub redirect_url: String,
    /// The signed request fields, retained for callback re-verification.
    pub fields: BTreeMap<String, String>,
}

/// Common contract of the two wallet gateways.
pub trait PaymentGateway: Send + Sync {
    /// The payment method this adapter settles.
    fn method(&self) -> PaymentMethod;

    /// Builds the signed provider request for one order payment.
    fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedTxn, EscrowError>;

    /// Recomputes the integrity hash over the stored initiation fields and
    /// compares it against the hash supplied in a callback.
    ///
    /// Sandbox mode short-circuits to accepted for test flows; production
    /// rejects any mismatch.
    fn verify(
        &self,
        fields: &BTreeMap<String, String>,
        supplied_hash: &str,
    ) -> Result<(), VerifyFailure>;

    /// Whether a callback status/response code means the payment went
    /// through on the provider side.
    fn callback_succeeded(&self, status: &str) -> bool;
}

/// SHA-256 of `input`, uppercase hex — the encoding both providers use.
pub(crate) fn sha256_upper_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode_upper(hasher.finalize())
}

/// Constant-time hash comparison. Unequal lengths compare unequal.
pub(crate) fn hashes_match(expected: &str, supplied: &str) -> bool {
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}

/// Mints a provider transaction reference: prefix, unix millis, a
/// three-digit random component and a rolling sequence so references stay
/// unique even within one millisecond.
pub(crate) fn mint_txn_ref(prefix: &str) -> TxnRef {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let millis = Utc::now().timestamp_millis();
    let random: u16 = rand::thread_rng().gen_range(0..1000);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed) % 1000;
    TxnRef(format!("{prefix}{millis}{random:03}{seq:03}"))
}

/// Truncates a description to the provider limit at a char boundary.
pub(crate) fn clamp_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_LEN).collect()
}
