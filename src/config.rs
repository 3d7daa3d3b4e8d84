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

//! Gateway credentials and endpoints, supplied via the environment.
//!
//! Sandbox mode (anything other than `ESCROW_ENV=production`) relaxes
//! callback verification for test flows; production mode rejects any hash
//! mismatch.

use std::env;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn is_production() -> bool {
    env::var("ESCROW_ENV").is_ok_and(|v| v == "production")
}

/// SwiftPay (gateway A) credentials.
#[derive(Debug, Clone)]
pub struct SwiftPayConfig {
    pub merchant_id: String,
    pub password: String,
    /// Shared secret prefixed to the signed field string.
    pub integrity_salt: String,
    pub return_url: String,
    pub api_url: String,
    pub sandbox: bool,
}

impl SwiftPayConfig {
    pub fn from_env() -> Self {
        SwiftPayConfig {
            merchant_id: env_or("SWIFTPAY_MERCHANT_ID", "MC123456"),
            password: env_or("SWIFTPAY_PASSWORD", "test123"),
            integrity_salt: env_or("SWIFTPAY_INTEGRITY_SALT", "salt123"),
            return_url: env_or(
                "SWIFTPAY_RETURN_URL",
                "http://localhost:3000/payments/swiftpay/callback",
            ),
            api_url: env_or(
                "SWIFTPAY_API_URL",
                "https://sandbox.swiftpay.example/api/payment/transact",
            ),
            sandbox: !is_production(),
        }
    }

    /// Fixed credentials for deterministic tests.
    pub fn for_tests(sandbox: bool) -> Self {
        SwiftPayConfig {
            merchant_id: "MC123456".to_string(),
            password: "test123".to_string(),
            integrity_salt: "salt123".to_string(),
            return_url: "http://localhost:3000/payments/swiftpay/callback".to_string(),
            api_url: "https://sandbox.swiftpay.example/api/payment/transact".to_string(),
            sandbox,
        }
    }
}

/// PayFast (gateway B) credentials.
#[derive(Debug, Clone)]
pub struct PayFastConfig {
    pub store_id: String,
    pub account_number: String,
    /// Shared secret appended to the signed field string.
    pub hash_key: String,
    pub callback_url: String,
    pub api_url: String,
    pub sandbox: bool,
}

impl PayFastConfig {
    pub fn from_env() -> Self {
        PayFastConfig {
            store_id: env_or("PAYFAST_STORE_ID", "STORE001"),
            account_number: env_or("PAYFAST_ACCOUNT_NUM", "1234567890"),
            hash_key: env_or("PAYFAST_HASH_KEY", "test_hash_key"),
            callback_url: env_or(
                "PAYFAST_CALLBACK_URL",
                "http://localhost:3000/payments/payfast/callback",
            ),
            api_url: env_or(
                "PAYFAST_API_URL",
                "https://sandbox.payfast.example/easypay/index",
            ),
            sandbox: !is_production(),
        }
    }

    /// Fixed credentials for deterministic tests.
    pub fn for_tests(sandbox: bool) -> Self {
        PayFastConfig {
            store_id: "STORE001".to_string(),
            account_number: "1234567890".to_string(),
            hash_key: "test_hash_key".to_string(),
            callback_url: "http://localhost:3000/payments/payfast/callback".to_string(),
            api_url: "https://sandbox.payfast.example/easypay/index".to_string(),
            sandbox,
        }
    }
}
