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

//! SwiftPay mobile-wallet adapter (gateway A).
//!
//! Signing rule: all request fields (minus the signature slot itself and
//! empty values) sorted alphabetically by key, joined with `&`, prefixed by
//! the integrity salt, hashed with SHA-256, uppercase hex. Amounts are
//! expressed in minor currency units (×100, integer).

use super::{
    InitiateRequest, InitiatedTxn, PaymentGateway, clamp_description, hashes_match, mint_txn_ref,
    sha256_upper_hex,
};
use crate::config::SwiftPayConfig;
use crate::error::{EscrowError, VerifyFailure};
use crate::order::PaymentMethod;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use tracing::debug;

/// Wire name of the signature slot; never part of its own hash input.
const SIGNATURE_FIELD: &str = "sp_secure_hash";

/// Provider response code for a successful payment.
const SUCCESS_CODE: &str = "000";

const DATETIME_FORMAT: &str = "%Y%m%d%H%M%S";

pub struct SwiftPayGateway {
    config: SwiftPayConfig,
}

impl SwiftPayGateway {
    pub fn new(config: SwiftPayConfig) -> Self {
        SwiftPayGateway { config }
    }

    pub fn from_env() -> Self {
        Self::new(SwiftPayConfig::from_env())
    }

    /// Salt-prefixed hash over the sorted, non-empty request fields.
    fn sign(&self, fields: &BTreeMap<String, String>) -> String {
        let mut input = self.config.integrity_salt.clone();
        for (key, value) in fields {
            if key == SIGNATURE_FIELD || value.is_empty() {
                continue;
            }
            input.push('&');
            input.push_str(value);
        }
        sha256_upper_hex(&input)
    }

    /// Amount in minor currency units (1 unit = 100 minor).
    fn format_amount(amount: Decimal) -> Result<String, EscrowError> {
        (amount * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .map(|minor| minor.to_string())
            .ok_or_else(|| EscrowError::InvalidInput("amount out of range".to_string()))
    }
}

impl PaymentGateway for SwiftPayGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::SwiftPay
    }

    fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedTxn, EscrowError> {
        let txn_ref = mint_txn_ref("SP");
        let now = Utc::now();
        let expiry = now + Duration::minutes(30);

        let mut fields = BTreeMap::new();
        fields.insert("sp_version".to_string(), "1.1".to_string());
        fields.insert("sp_txn_type".to_string(), "MWALLET".to_string());
        fields.insert("sp_language".to_string(), "EN".to_string());
        fields.insert(
            "sp_merchant_id".to_string(),
            self.config.merchant_id.clone(),
        );
        fields.insert("sp_password".to_string(), self.config.password.clone());
        fields.insert("sp_txn_ref".to_string(), txn_ref.0.clone());
        fields.insert(
            "sp_amount".to_string(),
            Self::format_amount(request.amount)?,
        );
        fields.insert("sp_currency".to_string(), "PKR".to_string());
        fields.insert(
            "sp_txn_datetime".to_string(),
            now.format(DATETIME_FORMAT).to_string(),
        );
        fields.insert(
            "sp_expiry_datetime".to_string(),
            expiry.format(DATETIME_FORMAT).to_string(),
        );
        fields.insert(
            "sp_bill_reference".to_string(),
            request.order_id.to_string(),
        );
        fields.insert(
            "sp_description".to_string(),
            clamp_description(&request.description),
        );
        fields.insert("sp_return_url".to_string(), self.config.return_url.clone());

        let signature = self.sign(&fields);
        fields.insert(SIGNATURE_FIELD.to_string(), signature);

        debug!(txn_ref = %txn_ref, order_id = %request.order_id, "swiftpay transaction initiated");

        let redirect_url = format!(
            "{}?txn_ref={}&bill_reference={}",
            self.config.api_url, txn_ref, request.order_id
        );
        Ok(InitiatedTxn {
            txn_ref,
            redirect_url,
            fields,
        })
    }

    fn verify(
        &self,
        fields: &BTreeMap<String, String>,
        supplied_hash: &str,
    ) -> Result<(), VerifyFailure> {
        if self.config.sandbox {
            debug!("swiftpay sandbox verification short-circuit");
            return Ok(());
        }
        let expected = self.sign(fields);
        if hashes_match(&expected, supplied_hash) {
            Ok(())
        } else {
            Err(VerifyFailure::SignatureMismatch)
        }
    }

    fn callback_succeeded(&self, status: &str) -> bool {
        status == SUCCESS_CODE
    }
}
