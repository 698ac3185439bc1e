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

//! Provider gateway adapter.
//!
//! The provisioning provider is an untrusted RPC boundary: slow, failing,
//! or absent. Every failure is terminal for the calling purchase; no
//! retries happen at this layer.

use crate::base::OrderId;
use crate::error::GatewayFailure;
use crate::plan::Plan;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Wire payload for a provisioning call.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_days: u32,
    pub order_ref: OrderId,
}

impl ProvisionRequest {
    pub fn new(plan: &Plan, order_ref: OrderId) -> Self {
        Self {
            kind: plan.kind.clone(),
            duration_days: plan.duration_days,
            order_ref,
        }
    }
}

/// Outbound boundary to the provisioning provider.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Asks the provider to create the account described by `request`.
    /// Returns the provider's response payload on success.
    async fn provision(&self, request: &ProvisionRequest) -> Result<Value, GatewayFailure>;
}

/// HTTP implementation posting JSON with bearer authentication.
///
/// The timeout is enforced client-side; a timed-out call is reported the
/// same way as any other transport failure.
pub struct HttpProviderGateway {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpProviderGateway {
    /// Default bound on a provisioning call.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ProviderGateway for HttpProviderGateway {
    async fn provision(&self, request: &ProvisionRequest) -> Result<Value, GatewayFailure> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| GatewayFailure::new(err.to_string(), None))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GatewayFailure::new(err.to_string(), None))?;
        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            // Keep whatever body the provider sent as the diagnostic.
            let details = parsed.or_else(|| (!body.is_empty()).then(|| Value::String(body)));
            return Err(GatewayFailure::new(
                format!("provider returned status {status}"),
                details,
            ));
        }

        Ok(parsed.unwrap_or(Value::String(body)))
    }
}
