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

//! Error types for storefront operations.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Diagnostic payload preserved from a failed provisioning call.
///
/// `error` is the transport or status message; `details` carries the
/// provider's response body when one was received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayFailure {
    pub error: String,
    pub details: Option<Value>,
}

impl GatewayFailure {
    pub fn new(error: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            error: error.into(),
            details,
        }
    }

    /// The `{error, details}` object recorded on a failed order.
    pub fn as_json(&self) -> Value {
        json!({ "error": self.error, "details": self.details })
    }
}

/// Storefront operation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShopError {
    /// Email is missing or empty after normalization
    #[error("email required")]
    EmailRequired,

    /// Topup amount is missing, zero, or negative
    #[error("positive amount required")]
    InvalidAmount,

    /// Plan id is missing or empty
    #[error("planId required")]
    PlanRequired,

    /// Invoice id is missing from a settlement request
    #[error("invoiceId required")]
    InvoiceIdRequired,

    /// Webhook payload carries no order_ref
    #[error("order_ref missing")]
    OrderRefRequired,

    /// Purchase requested without drawing on the prepaid balance
    #[error("purchase without balance is not supported (topup first and set useBalance=true)")]
    UnsupportedPayment,

    /// Balance is lower than the plan price
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Referenced plan id is not in the catalog
    #[error("plan not found")]
    PlanNotFound,

    /// Referenced invoice does not exist
    #[error("invoice not found")]
    InvoiceNotFound,

    /// Referenced order does not exist
    #[error("order not found")]
    OrderNotFound,

    /// Referenced user does not exist
    #[error("user not found")]
    UserNotFound,

    /// Provisioning call failed; the order is Failed and the debit refunded
    #[error("failed to create account on provider")]
    Gateway(GatewayFailure),

    /// An expected related record is missing
    #[error("ledger inconsistency: {0}")]
    Consistency(String),

    /// A record with this id already exists
    #[error("duplicate record id")]
    DuplicateRecord,

    /// The backing store cannot serve requests
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}
