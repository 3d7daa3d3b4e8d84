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

//! User accounts, as far as the escrow core needs them.
//!
//! `balance` is a denormalized projection of the ledger: it must always
//! equal the sum of the user's COMPLETED credits minus debits. Role and ban
//! status are independent fields; a banned user keeps their role.

use crate::base::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Platform role. Orthogonal to ban status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// A marketplace user.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Cached ledger projection; audited against the ledger in tests.
    pub balance: Decimal,
    /// Verified sellers receive released funds without a hold.
    pub verified: bool,
    pub role: Role,
    pub banned: bool,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, email: impl Into<String>) -> Self {
        User {
            id,
            username: username.into(),
            email: email.into(),
            balance: Decimal::ZERO,
            verified: false,
            role: Role::User,
            banned: false,
        }
    }

    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
