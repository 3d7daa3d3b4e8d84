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

//! PayFast mobile-wallet adapter (gateway B).
//!
//! Signing rule: `account_number + amount + txn_ref + description` with the
//! stored hash key appended, SHA-256, uppercase hex. Amounts are decimal
//! strings with exactly two fraction digits.

use super::{
    InitiateRequest, InitiatedTxn, PaymentGateway, clamp_description, hashes_match, mint_txn_ref,
    sha256_upper_hex,
};
use crate::config::PayFastConfig;
use crate::error::{EscrowError, VerifyFailure};
use crate::order::PaymentMethod;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

const SIGNATURE_FIELD: &str = "hash_value";

/// Fallback when the buyer has no phone on file; the provider requires the
/// field to be present.
const PLACEHOLDER_MOBILE: &str = "03000000000";

pub struct PayFastGateway {
    config: PayFastConfig,
}

impl PayFastGateway {
    pub fn new(config: PayFastConfig) -> Self {
        PayFastGateway { config }
    }

    pub fn from_env() -> Self {
        Self::new(PayFastConfig::from_env())
    }

    /// Exactly two fraction digits, per the provider's wire format.
    fn format_amount(amount: Decimal) -> String {
        format!("{:.2}", amount.round_dp(2))
    }

    /// Hash over the fixed field subset plus the stored key.
    fn sign(&self, amount: &str, txn_ref: &str, description: &str) -> String {
        let input = format!(
            "{}{}{}{}{}",
            self.config.account_number, amount, txn_ref, description, self.config.hash_key
        );
        sha256_upper_hex(&input)
    }
}

impl PaymentGateway for PayFastGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayFast
    }

    fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedTxn, EscrowError> {
        let txn_ref = mint_txn_ref("PF");
        let amount = Self::format_amount(request.amount);
        let description = clamp_description(&request.description);
        let expiry = Utc::now() + Duration::minutes(30);
        let signature = self.sign(&amount, &txn_ref.0, &description);

        let mut fields = BTreeMap::new();
        fields.insert("store_id".to_string(), self.config.store_id.clone());
        fields.insert(
            "account_number".to_string(),
            self.config.account_number.clone(),
        );
        fields.insert("transaction_amount".to_string(), amount);
        fields.insert("transaction_type".to_string(), "MA".to_string());
        fields.insert("token_expiry".to_string(), expiry.timestamp().to_string());
        fields.insert("bill_reference".to_string(), request.order_id.to_string());
        fields.insert("description".to_string(), description);
        fields.insert("transaction_id".to_string(), txn_ref.0.clone());
        fields.insert("email_address".to_string(), request.buyer_email.clone());
        fields.insert(
            "mobile_num".to_string(),
            request
                .buyer_phone
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_MOBILE.to_string()),
        );
        fields.insert(
            "postback_url".to_string(),
            self.config.callback_url.clone(),
        );
        fields.insert(SIGNATURE_FIELD.to_string(), signature);

        debug!(txn_ref = %txn_ref, order_id = %request.order_id, "payfast transaction initiated");

        let redirect_url = format!(
            "{}?transaction_id={}&bill_reference={}",
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
            debug!("payfast sandbox verification short-circuit");
            return Ok(());
        }
        let (Some(amount), Some(txn_ref), Some(description)) = (
            fields.get("transaction_amount"),
            fields.get("transaction_id"),
            fields.get("description"),
        ) else {
            return Err(VerifyFailure::SignatureMismatch);
        };
        let expected = self.sign(amount, txn_ref, description);
        if hashes_match(&expected, supplied_hash) {
            Ok(())
        } else {
            Err(VerifyFailure::SignatureMismatch)
        }
    }

    fn callback_succeeded(&self, status: &str) -> bool {
        status == "PAID" || status == "SUCCESS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::OrderId;
    use rust_decimal_macros::dec;

    fn make_gateway(sandbox: bool) -> PayFastGateway {
        PayFastGateway::new(PayFastConfig::for_tests(sandbox))
    }

    fn make_request() -> InitiateRequest {
        InitiateRequest {
            order_id: OrderId(7),
            amount: dec!(2700),
            buyer_email: "buyer@example.com".to_string(),
            buyer_phone: Some("03001234567".to_string()),
            description: "Payment for rare mount - order #7".to_string(),
        }
    }

    #[test]
    fn amounts_carry_exactly_two_fraction_digits() {
        assert_eq!(PayFastGateway::format_amount(dec!(2700)), "2700.00");
        assert_eq!(PayFastGateway::format_amount(dec!(19.9)), "19.90");
        assert_eq!(PayFastGateway::format_amount(dec!(0.555)), "0.56");
    }

    #[test]
    fn initiate_builds_signed_fields() {
        let txn = make_gateway(true).initiate(&make_request()).unwrap();
        assert!(txn.txn_ref.0.starts_with("PF"));
        assert_eq!(txn.fields["transaction_amount"], "2700.00");
        assert_eq!(txn.fields["mobile_num"], "03001234567");
        assert_eq!(txn.fields["bill_reference"], "7");
        assert!(txn.fields.contains_key(SIGNATURE_FIELD));
    }

    #[test]
    fn missing_phone_falls_back_to_placeholder() {
        let mut request = make_request();
        request.buyer_phone = None;
        let txn = make_gateway(true).initiate(&request).unwrap();
        assert_eq!(txn.fields["mobile_num"], PLACEHOLDER_MOBILE);
    }

    #[test]
    fn signature_covers_the_fixed_field_subset() {
        let gateway = make_gateway(false);
        let mut fields = BTreeMap::new();
        fields.insert("transaction_amount".to_string(), "2700.00".to_string());
        fields.insert("transaction_id".to_string(), "PF17000".to_string());
        fields.insert("description".to_string(), "test order".to_string());

        let expected =
            sha256_upper_hex("12345678902700.00PF17000test ordertest_hash_key");
        assert_eq!(gateway.verify(&fields, &expected), Ok(()));
    }

    #[test]
    fn own_signature_verifies_in_production_mode() {
        let gateway = make_gateway(false);
        let txn = gateway.initiate(&make_request()).unwrap();
        let supplied = txn.fields[SIGNATURE_FIELD].clone();
        assert_eq!(gateway.verify(&txn.fields, &supplied), Ok(()));
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let gateway = make_gateway(false);
        let mut txn = gateway.initiate(&make_request()).unwrap();
        let supplied = txn.fields[SIGNATURE_FIELD].clone();

        txn.fields
            .insert("transaction_amount".to_string(), "1.00".to_string());
        assert_eq!(
            gateway.verify(&txn.fields, &supplied),
            Err(VerifyFailure::SignatureMismatch)
        );
    }

    #[test]
    fn sandbox_mode_accepts_any_hash() {
        let gateway = make_gateway(true);
        let txn = gateway.initiate(&make_request()).unwrap();
        assert_eq!(gateway.verify(&txn.fields, "garbage"), Ok(()));
    }

    #[test]
    fn paid_and_success_statuses_count_as_success() {
        let gateway = make_gateway(true);
        assert!(gateway.callback_succeeded("PAID"));
        assert!(gateway.callback_succeeded("SUCCESS"));
        assert!(!gateway.callback_succeeded("FAILED"));
        assert!(!gateway.callback_succeeded("000"));
    }
}
