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

//! REST surface for the escrow engine.
//!
//! The acting user is taken from the `X-User-Id` header — authentication
//! itself is an external concern. Gateway callbacks are unauthenticated by
//! design (provider-originated) and tolerate retries.

use crate::base::{ListingId, OrderId, UserId};
use crate::engine::{CallbackOutcome, Engine, GatewayCallback, NewListing};
use crate::error::{EscrowError, VerifyFailure};
use crate::gateway::PaymentGateway;
use crate::gateway::payfast::PayFastGateway;
use crate::gateway::swiftpay::SwiftPayGateway;
use crate::listing::{Delivery, Stock};
use crate::message::Message;
use crate::order::{Order, PaymentMethod};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// === Application State ===

/// Shared state: the engine plus the two wallet gateway adapters.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub swiftpay: Arc<SwiftPayGateway>,
    pub payfast: Arc<PayFastGateway>,
}

impl ApiState {
    fn gateway(&self, name: &str) -> Result<&dyn PaymentGateway, AppError> {
        match name {
            "swiftpay" => Ok(self.swiftpay.as_ref()),
            "payfast" => Ok(self.payfast.as_ref()),
            other => Err(AppError(EscrowError::InvalidInput(format!(
                "unsupported payment gateway: {other}"
            )))),
        }
    }
}

// === Error Handling ===

/// Wrapper converting [`EscrowError`] into HTTP responses with stable
/// codes.
pub struct AppError(pub EscrowError);

impl From<EscrowError> for AppError {
    fn from(err: EscrowError) -> Self {
        AppError(err)
    }
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EscrowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EscrowError::StateConflict { .. } => StatusCode::CONFLICT,
            EscrowError::Unauthorized => StatusCode::UNAUTHORIZED,
            EscrowError::Forbidden(_) => StatusCode::FORBIDDEN,
            EscrowError::Unavailable(_) => StatusCode::BAD_REQUEST,
            EscrowError::GatewayVerificationFailed(_) => StatusCode::BAD_REQUEST,
            EscrowError::NotFound(_) => StatusCode::NOT_FOUND,
            EscrowError::DuplicateTransaction => StatusCode::CONFLICT,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.code().to_string(),
            }),
        )
            .into_response()
    }
}

/// Acting user from the `X-User-Id` header.
fn actor(headers: &HeaderMap) -> Result<UserId, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(UserId)
        .ok_or(AppError(EscrowError::Unauthorized))
}

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub title: String,
    pub price: Decimal,
    pub commission_rate: Decimal,
    pub stock: Stock,
    pub delivery: Delivery,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub listing_id: u64,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize)]
pub struct CostBreakdown {
    pub item_price: Decimal,
    pub commission: Decimal,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
    pub breakdown: CostBreakdown,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delivered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_earnings: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_notice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoteRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub order_id: u64,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub success: bool,
    pub txn_ref: String,
    pub redirect_url: String,
}

/// Callback shape posted by SwiftPay.
#[derive(Debug, Deserialize)]
pub struct SwiftPayCallback {
    pub sp_txn_ref: String,
    pub sp_response_code: String,
    #[serde(default)]
    pub sp_response_message: Option<String>,
    pub sp_secure_hash: String,
}

/// Callback shape posted by PayFast.
#[derive(Debug, Deserialize)]
pub struct PayFastCallback {
    pub transaction_id: String,
    pub status: String,
    pub hash_value: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user_id: u64,
    pub username: String,
    pub balance: Decimal,
    pub ledger_balance: Decimal,
    pub withdrawable_balance: Decimal,
    pub verified: bool,
}

// === Handlers ===

async fn create_user(
    State(state): State<ApiState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    if request.username.trim().is_empty() {
        return Err(AppError(EscrowError::InvalidInput(
            "username is required".to_string(),
        )));
    }
    let id = state
        .engine
        .create_user(request.username, request.email, request.verified);
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.0 })))
}

async fn create_listing(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let seller = actor(&headers)?;
    let id = state.engine.create_listing(
        seller,
        NewListing {
            title: request.title,
            price: request.price,
            commission_rate: request.commission_rate,
            stock: request.stock,
            delivery: request.delivery,
        },
    )?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: id.0 })))
}

async fn create_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let buyer = actor(&headers)?;
    let receipt = state.engine.purchase(
        buyer,
        ListingId(request.listing_id),
        request.payment_method,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(OrderResponse {
            order: receipt.order,
            breakdown: CostBreakdown {
                item_price: receipt.item_price,
                commission: receipt.commission,
                amount: receipt.amount,
            },
        }),
    ))
}

async fn get_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Order>, AppError> {
    let user = actor(&headers)?;
    let order = state
        .engine
        .order(OrderId(id))
        .ok_or(EscrowError::NotFound("order"))?;
    if order.buyer != user && order.seller != user {
        return Err(AppError(EscrowError::Forbidden("access denied")));
    }
    Ok(Json(order))
}

async fn mark_paid(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<TransitionResponse>, AppError> {
    let user = actor(&headers)?;
    let order_id = OrderId(id);
    let outcome = state.engine.mark_paid(user, order_id)?;
    let order = state
        .engine
        .order(order_id)
        .ok_or(EscrowError::NotFound("order"))?;
    Ok(Json(TransitionResponse {
        order,
        auto_delivered: Some(outcome.auto_delivered),
        seller_earnings: None,
        hold_notice: None,
    }))
}

async fn mark_delivered(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Option<Json<NoteRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let user = actor(&headers)?;
    let order_id = OrderId(id);
    let note = body.and_then(|Json(b)| b.note);
    state.engine.mark_delivered(user, order_id, note)?;
    let order = state
        .engine
        .order(order_id)
        .ok_or(EscrowError::NotFound("order"))?;
    Ok(Json(TransitionResponse {
        order,
        auto_delivered: None,
        seller_earnings: None,
        hold_notice: None,
    }))
}

async fn complete_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Option<Json<NoteRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let user = actor(&headers)?;
    let order_id = OrderId(id);
    let note = body.and_then(|Json(b)| b.note);
    let receipt = state.engine.complete(user, order_id, note)?;
    let order = state
        .engine
        .order(order_id)
        .ok_or(EscrowError::NotFound("order"))?;
    Ok(Json(TransitionResponse {
        order,
        auto_delivered: None,
        seller_earnings: Some(receipt.seller_earnings),
        hold_notice: receipt
            .hold_until
            .map(|until| format!("funds held until {until}")),
    }))
}

async fn dispute_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(request): Json<DisputeRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let user = actor(&headers)?;
    let order_id = OrderId(id);
    state.engine.dispute(user, order_id, &request.reason)?;
    let order = state
        .engine
        .order(order_id)
        .ok_or(EscrowError::NotFound("order"))?;
    Ok(Json(TransitionResponse {
        order,
        auto_delivered: None,
        seller_earnings: None,
        hold_notice: None,
    }))
}

async fn force_complete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Option<Json<NoteRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let admin = actor(&headers)?;
    let order_id = OrderId(id);
    let note = body.and_then(|Json(b)| b.note);
    let receipt = state.engine.force_complete(admin, order_id, note)?;
    let order = state
        .engine
        .order(order_id)
        .ok_or(EscrowError::NotFound("order"))?;
    Ok(Json(TransitionResponse {
        order,
        auto_delivered: None,
        seller_earnings: Some(receipt.seller_earnings),
        hold_notice: receipt
            .hold_until
            .map(|until| format!("funds held until {until}")),
    }))
}

async fn refund_order(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    body: Option<Json<NoteRequest>>,
) -> Result<Json<TransitionResponse>, AppError> {
    let admin = actor(&headers)?;
    let order_id = OrderId(id);
    let note = body.and_then(|Json(b)| b.note);
    state.engine.refund(admin, order_id, note)?;
    let order = state
        .engine
        .order(order_id)
        .ok_or(EscrowError::NotFound("order"))?;
    Ok(Json(TransitionResponse {
        order,
        auto_delivered: None,
        seller_earnings: None,
        hold_notice: None,
    }))
}

async fn initiate_payment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(gateway_name): Path<String>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<Json<InitiatePaymentResponse>, AppError> {
    let user = actor(&headers)?;
    let gateway = state.gateway(&gateway_name)?;
    let txn = state
        .engine
        .initiate_payment(gateway, user, OrderId(request.order_id))?;
    Ok(Json(InitiatePaymentResponse {
        success: true,
        txn_ref: txn.txn_ref.0,
        redirect_url: txn.redirect_url,
    }))
}

async fn gateway_callback(
    State(state): State<ApiState>,
    Path(gateway_name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<CallbackResponse>, AppError> {
    let gateway = state.gateway(&gateway_name)?;
    let callback = parse_callback(&gateway_name, body)?;

    match state.engine.handle_gateway_callback(gateway, &callback) {
        Ok(CallbackOutcome::Applied { .. }) => Ok(Json(CallbackResponse {
            success: true,
            message: "payment verified and order updated".to_string(),
        })),
        Ok(CallbackOutcome::AlreadySettled) => Ok(Json(CallbackResponse {
            success: true,
            message: "transaction already settled".to_string(),
        })),
        // The provider itself reported a failure: acknowledge the callback
        // but flag it; the order stays pending for another attempt.
        Err(EscrowError::GatewayVerificationFailed(VerifyFailure::ProviderFailure(code))) => {
            Ok(Json(CallbackResponse {
                success: false,
                message: format!("payment failed: {code}"),
            }))
        }
        Err(other) => Err(AppError(other)),
    }
}

fn parse_callback(
    gateway_name: &str,
    body: serde_json::Value,
) -> Result<GatewayCallback, AppError> {
    let malformed =
        |_| AppError(EscrowError::InvalidInput("malformed callback body".to_string()));
    match gateway_name {
        "swiftpay" => {
            let cb: SwiftPayCallback = serde_json::from_value(body).map_err(malformed)?;
            Ok(GatewayCallback {
                txn_ref: cb.sp_txn_ref.as_str().into(),
                status: cb.sp_response_code,
                supplied_hash: cb.sp_secure_hash,
            })
        }
        _ => {
            let cb: PayFastCallback = serde_json::from_value(body).map_err(malformed)?;
            Ok(GatewayCallback {
                txn_ref: cb.transaction_id.as_str().into(),
                status: cb.status,
                supplied_hash: cb.hash_value,
            })
        }
    }
}

async fn post_order_message(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(request): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let user = actor(&headers)?;
    let message = state
        .engine
        .post_message(user, OrderId(id), &request.content)?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_order_messages(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Message>>, AppError> {
    let user = actor(&headers)?;
    let messages = state.engine.messages_for(user, OrderId(id))?;
    Ok(Json(messages))
}

async fn get_account(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<AccountResponse>, AppError> {
    let user_id = UserId(id);
    let user = state
        .engine
        .user(user_id)
        .ok_or(EscrowError::NotFound("user"))?;
    let ledger = state.engine.ledger();
    Ok(Json(AccountResponse {
        user_id: user.id.0,
        username: user.username,
        balance: user.balance,
        ledger_balance: ledger.balance_of(user_id),
        withdrawable_balance: ledger.withdrawable_balance_of(user_id, Utc::now()),
        verified: user.verified,
    }))
}

// === Router ===

/// Builds the full REST router over the given state.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/users", post(create_user))
        .route("/listings", post(create_listing))
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/paid", patch(mark_paid))
        .route("/orders/{id}/delivered", patch(mark_delivered))
        .route("/orders/{id}/complete", patch(complete_order))
        .route("/orders/{id}/dispute", patch(dispute_order))
        .route(
            "/orders/{id}/messages",
            post(post_order_message).get(get_order_messages),
        )
        .route("/payments/{gateway}/initiate", post(initiate_payment))
        .route("/payments/{gateway}/callback", post(gateway_callback))
        .route("/admin/orders/{id}/force-complete", patch(force_complete))
        .route("/admin/orders/{id}/refund", patch(refund_order))
        .route("/accounts/{id}", get(get_account))
        .with_state(state)
}
