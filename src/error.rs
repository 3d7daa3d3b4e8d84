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

//! Error types for the escrow engine.
//!
//! Every failure is scoped to a single order or request; nothing here is
//! fatal to the process. Each variant carries a stable code used by the
//! HTTP layer.

use crate::order::OrderStatus;
use thiserror::Error;

/// Escrow engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Malformed request or out-of-range field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A transition guard failed; the order is left unchanged.
    #[error("cannot {action} order in {status} status")]
    StateConflict {
        action: &'static str,
        status: OrderStatus,
    },

    /// The acting user is unknown.
    #[error("unknown user")]
    Unauthorized,

    /// The acting user is not permitted to perform this action.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The listing cannot be purchased (inactive, hidden or out of stock).
    #[error("unavailable: {0}")]
    Unavailable(&'static str),

    /// Gateway callback verification failed; the order stays pending.
    #[error("gateway verification failed: {0}")]
    GatewayVerificationFailed(#[from] VerifyFailure),

    /// Referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Gateway transaction reference already registered.
    #[error("duplicate transaction reference")]
    DuplicateTransaction,
}

impl EscrowError {
    /// Stable machine-readable code for the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            EscrowError::InvalidInput(_) => "INVALID_INPUT",
            EscrowError::StateConflict { .. } => "STATE_CONFLICT",
            EscrowError::Unauthorized => "UNAUTHORIZED",
            EscrowError::Forbidden(_) => "FORBIDDEN",
            EscrowError::Unavailable(_) => "UNAVAILABLE",
            EscrowError::GatewayVerificationFailed(_) => "GATEWAY_VERIFICATION_FAILED",
            EscrowError::NotFound(_) => "NOT_FOUND",
            EscrowError::DuplicateTransaction => "DUPLICATE_TRANSACTION",
        }
    }
}

/// Structured reason for a gateway verification failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// Recomputed hash does not match the supplied one.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Transaction reference was never initiated here.
    #[error("unknown transaction")]
    UnknownTransaction,

    /// Initiated transaction is past its expiry window.
    #[error("transaction expired")]
    Expired,

    /// Provider reported a failure code for the transaction.
    #[error("provider reported failure: {0}")]
    ProviderFailure(String),
}
