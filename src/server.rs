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

//! REST API for the storefront.
//!
//! Every handler delegates to exactly one storefront operation; request
//! parsing and error-to-status mapping are the only logic that lives
//! here.
//!
//! ## Endpoints
//!
//! - `GET  /api/plans` - List catalog plans
//! - `GET  /api/user?email=...` - Resolve a user (created on first reference)
//! - `POST /api/topup` - Create a topup invoice
//! - `POST /api/topup/mark-paid` - Settle an invoice (simulated gateway callback)
//! - `POST /api/buy` - Purchase a plan from the prepaid balance
//! - `GET  /api/admin/orders|topups|users` - Newest-first listings
//! - `POST /api/webhook/provider` - Record a provider webhook
//!
//! ## Example Usage
//!
//! ```bash
//! # Topup
//! curl -X POST http://localhost:3000/api/topup \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "alice@example.com", "amount": "15000"}'
//!
//! # Settle (the payment page posts the same thing as a form)
//! curl -X POST http://localhost:3000/api/topup/mark-paid \
//!   -H "Content-Type: application/json" \
//!   -d '{"invoiceId": "..."}'
//!
//! # Buy
//! curl -X POST http://localhost:3000/api/buy \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "alice@example.com", "planId": "p2", "useBalance": true}'
//! ```

use crate::base::{InvoiceId, OrderId};
use crate::error::ShopError;
use crate::invoice::Invoice;
use crate::order::Order;
use crate::plan::Plan;
use crate::storefront::Storefront;
use crate::user::User;
use axum::{
    Json, Router,
    extract::{Form, FromRequest, Query, Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Note returned with every created invoice.
const SETTLE_NOTE: &str = "Simulated payment link. Mark the invoice paid via POST /api/topup/mark-paid to complete the topup (simulated gateway callback).";

// === Request/Response DTOs ===

/// Request body for creating a topup invoice.
#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    #[serde(default)]
    pub email: String,
    /// Amounts travel as decimal strings; a missing amount is rejected
    /// like a non-positive one.
    pub amount: Option<Decimal>,
}

/// Response body for invoice creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopupResponse {
    pub ok: bool,
    pub invoice: Invoice,
    pub payment_link: String,
    pub note: String,
}

/// Settlement request. The simulated payment page posts `invoiceId` as an
/// urlencoded form; `id` is accepted as an alias.
#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    #[serde(rename = "invoiceId", alias = "id")]
    pub invoice_id: Option<String>,
}

/// Response body for settlement, idempotent across repeats.
#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub ok: bool,
    pub invoice: Invoice,
    pub user: User,
}

/// Request body for purchasing a plan.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub use_balance: bool,
}

/// Response body for a successful purchase.
#[derive(Debug, Serialize)]
pub struct BuyResponse {
    pub ok: bool,
    pub order: Order,
}

/// Query parameters for user lookup.
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub email: String,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Response body for provisioning failures. Carries the `{error,
/// details}` diagnostics recorded on the failed order.
#[derive(Debug, Serialize)]
pub struct GatewayErrorResponse {
    pub ok: bool,
    pub error: String,
    pub code: String,
    pub provider: Value,
}

// === Application State ===

/// Shared application state containing the storefront.
#[derive(Clone)]
pub struct AppState {
    pub shop: Arc<Storefront>,
    /// Base URL used to render payment links.
    pub base_url: String,
}

// === Error Handling ===

/// Wrapper for converting `ShopError` into HTTP responses.
pub struct AppError(ShopError);

impl From<ShopError> for AppError {
    fn from(err: ShopError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            ShopError::EmailRequired => (StatusCode::BAD_REQUEST, "EMAIL_REQUIRED"),
            ShopError::InvalidAmount => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
            ShopError::PlanRequired => (StatusCode::BAD_REQUEST, "PLAN_REQUIRED"),
            ShopError::InvoiceIdRequired => (StatusCode::BAD_REQUEST, "INVOICE_ID_REQUIRED"),
            ShopError::OrderRefRequired => (StatusCode::BAD_REQUEST, "ORDER_REF_MISSING"),
            ShopError::UnsupportedPayment => (StatusCode::BAD_REQUEST, "UNSUPPORTED_PAYMENT"),
            ShopError::InsufficientBalance => (StatusCode::BAD_REQUEST, "INSUFFICIENT_BALANCE"),
            ShopError::PlanNotFound => (StatusCode::NOT_FOUND, "PLAN_NOT_FOUND"),
            ShopError::InvoiceNotFound => (StatusCode::NOT_FOUND, "INVOICE_NOT_FOUND"),
            ShopError::OrderNotFound => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            ShopError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            ShopError::Gateway(failure) => {
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(GatewayErrorResponse {
                        ok: false,
                        error: self.0.to_string(),
                        code: "PROVIDER_FAILED".to_string(),
                        provider: failure.as_json(),
                    }),
                )
                    .into_response();
            }
            ShopError::Consistency(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONSISTENCY_FAULT"),
            ShopError::DuplicateRecord => (StatusCode::CONFLICT, "DUPLICATE_RECORD"),
            ShopError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Extractors ===

/// Extracts a body as JSON or an urlencoded form, by content type.
///
/// The simulated payment page posts a form; API clients send JSON. Both
/// land in the same handler.
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(payload) = Form::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Ok(Self(payload));
        }

        let Json(payload) = Json::<T>::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        Ok(Self(payload))
    }
}

// === Handlers ===

/// GET /api/plans - List catalog plans.
async fn list_plans(State(state): State<AppState>) -> Json<Vec<Plan>> {
    Json(state.shop.plans().to_vec())
}

/// GET /api/user - Resolve a user by email.
///
/// Not a pure read: the user record is created on first reference.
async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<User>, AppError> {
    let user = state.shop.user_for_email(&query.email)?;
    Ok(Json(user))
}

/// POST /api/topup - Create a topup invoice.
async fn create_topup(
    State(state): State<AppState>,
    Json(request): Json<TopupRequest>,
) -> Result<Json<TopupResponse>, AppError> {
    let invoice = state.shop.create_invoice(&request.email, request.amount)?;
    let payment_link = format!(
        "{}/pay/{}",
        state.base_url.trim_end_matches('/'),
        invoice.id
    );
    Ok(Json(TopupResponse {
        ok: true,
        invoice,
        payment_link,
        note: SETTLE_NOTE.to_string(),
    }))
}

/// POST /api/topup/mark-paid - Settle an invoice (simulated callback).
///
/// A malformed invoice id cannot belong to any invoice and maps to
/// not-found.
async fn settle_topup(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<SettleRequest>,
) -> Result<Json<SettleResponse>, AppError> {
    let raw = request.invoice_id.ok_or(ShopError::InvoiceIdRequired)?;
    let invoice_id = parse_invoice_id(&raw)?;
    let (invoice, user) = state.shop.settle_invoice(invoice_id)?;
    Ok(Json(SettleResponse {
        ok: true,
        invoice,
        user,
    }))
}

/// POST /api/buy - Purchase a plan from the prepaid balance.
async fn buy_plan(
    State(state): State<AppState>,
    Json(request): Json<BuyRequest>,
) -> Result<Json<BuyResponse>, AppError> {
    let order = state
        .shop
        .purchase(&request.email, &request.plan_id, request.use_balance)
        .await?;
    Ok(Json(BuyResponse { ok: true, order }))
}

/// GET /api/admin/orders - All orders, newest-first.
async fn admin_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.shop.list_orders()?))
}

/// GET /api/admin/topups - All invoices, newest-first.
async fn admin_topups(State(state): State<AppState>) -> Result<Json<Vec<Invoice>>, AppError> {
    Ok(Json(state.shop.list_invoices()?))
}

/// GET /api/admin/users - All users, newest-first.
async fn admin_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.shop.list_users()?))
}

/// POST /api/webhook/provider - Record a provider webhook.
///
/// The payload is arbitrary JSON; only `order_ref` is required.
async fn provider_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let order_ref = webhook_order_ref(&payload)?;
    state.shop.apply_webhook(order_ref, &payload)?;
    Ok(Json(json!({ "ok": true })))
}

fn parse_invoice_id(raw: &str) -> Result<InvoiceId, ShopError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ShopError::InvoiceIdRequired);
    }
    Uuid::parse_str(raw)
        .map(InvoiceId)
        .map_err(|_| ShopError::InvoiceNotFound)
}

fn webhook_order_ref(payload: &Value) -> Result<OrderId, ShopError> {
    match payload.get("order_ref") {
        None | Some(Value::Null) => Err(ShopError::OrderRefRequired),
        Some(Value::String(raw)) if raw.trim().is_empty() => Err(ShopError::OrderRefRequired),
        Some(value) => value
            .as_str()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(OrderId)
            .ok_or(ShopError::OrderNotFound),
    }
}

// === Router ===

/// Builds the API router with permissive CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/plans", get(list_plans))
        .route("/api/user", get(get_user))
        .route("/api/topup", post(create_topup))
        .route("/api/topup/mark-paid", post(settle_topup))
        .route("/api/buy", post(buy_plan))
        .route("/api/admin/orders", get(admin_orders))
        .route("/api/admin/topups", get(admin_topups))
        .route("/api/admin/users", get(admin_users))
        .route("/api/webhook/provider", post(provider_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
