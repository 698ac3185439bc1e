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

//! Purchase orders.

use crate::base::{OrderId, PlanId, UserId};
use crate::error::GatewayFailure;
use crate::plan::Plan;
use crate::user::User;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Lifecycle of a purchase order.
///
//  Creating ──provision ok───► Success
//      │
//      └────provision failed──► Failed  (+ compensating credit)
//
/// Provider webhooks may additionally overwrite the status with an
/// arbitrary reported string; those land in `External` verbatim and
/// never move balances.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Creating,
    Success,
    Failed,
    #[serde(untagged)]
    External(String),
}

impl OrderStatus {
    /// Maps a webhook-reported status onto the lifecycle. Sanctioned
    /// names land on the typed states; anything else is recorded as-is.
    pub fn from_webhook(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "creating" => Self::Creating,
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::External(raw.to_string()),
        }
    }
}

/// A purchase order for one catalog plan.
///
/// Plan name, price, and kind are copied at purchase time so later
/// catalog changes never rewrite order history. `provider_response` is
/// opaque: the provider payload on success, an `{error, details}` object
/// on failure, with webhook payloads merged under a `webhook` key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub email: String,
    pub plan_id: PlanId,
    pub plan_name: String,
    pub price: Decimal,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: OrderStatus,
    pub provider_response: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order in the Creating state with the plan snapshot.
    pub fn new(user: &User, plan: &Plan) -> Self {
        Self {
            id: OrderId(Uuid::new_v4()),
            user_id: user.id,
            email: user.email.clone(),
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            price: plan.price,
            kind: plan.kind.clone(),
            status: OrderStatus::Creating,
            provider_response: None,
            created_at: Utc::now(),
        }
    }

    fn assert_creating(&self) {
        debug_assert!(
            matches!(self.status, OrderStatus::Creating),
            "Invariant violated: terminal transition from non-creating status: {:?}",
            self.status
        );
    }

    /// Terminal transition: provisioning succeeded.
    pub fn complete(&mut self, provider_payload: Value) {
        self.assert_creating();
        self.status = OrderStatus::Success;
        self.provider_response = Some(provider_payload);
    }

    /// Terminal transition: provisioning failed. The caller owns the
    /// compensating credit.
    pub fn fail(&mut self, failure: &GatewayFailure) {
        self.assert_creating();
        self.status = OrderStatus::Failed;
        self.provider_response = Some(failure.as_json());
    }

    /// Records a provider webhook: overwrites the status when the payload
    /// names one and merges the whole payload under
    /// `providerResponse.webhook`. Never moves balances.
    pub fn apply_webhook(&mut self, payload: &Value) {
        if let Some(status) = payload.get("status").and_then(Value::as_str) {
            self.status = OrderStatus::from_webhook(status);
        }
        let mut merged = match self.provider_response.take() {
            Some(Value::Object(map)) => map,
            // non-object payloads are kept under "response"
            Some(other) => {
                let mut map = Map::new();
                map.insert("response".to_string(), other);
                map
            }
            None => Map::new(),
        };
        merged.insert("webhook".to_string(), payload.clone());
        self.provider_response = Some(Value::Object(merged));
    }
}
