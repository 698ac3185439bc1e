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

//! Order fulfillment: balance reservation, provisioning, reconciliation.
//!
//! A purchase debits the buyer's prepaid balance, records an order in the
//! Creating state, and asks the provider to provision the plan. Success
//! and failure both terminalize the order exactly once; a failure also
//! refunds the debit, so a failed purchase leaves the balance where it
//! started.
//!
//! The debit commits before the provider call begins and no store lock is
//! held while the call is in flight. Two windows follow from the lack of
//! cross-record atomicity and are accepted: a crash between the debit and
//! the order insert, and a crash between marking an order Failed and the
//! refund landing.

use crate::base::{OrderId, PlanId};
use crate::directory::UserDirectory;
use crate::error::ShopError;
use crate::gateway::{ProviderGateway, ProvisionRequest};
use crate::order::Order;
use crate::plan::PlanCatalog;
use crate::store::LedgerStore;
use serde_json::Value;
use std::sync::Arc;

/// Executes purchases against the prepaid balance and applies provider
/// webhooks to existing orders.
#[derive(Clone)]
pub struct FulfillmentService {
    store: Arc<dyn LedgerStore>,
    directory: UserDirectory,
    catalog: Arc<PlanCatalog>,
    gateway: Arc<dyn ProviderGateway>,
}

impl FulfillmentService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        catalog: Arc<PlanCatalog>,
        gateway: Arc<dyn ProviderGateway>,
    ) -> Self {
        let directory = UserDirectory::new(Arc::clone(&store));
        Self {
            store,
            directory,
            catalog,
            gateway,
        }
    }

    /// Purchases `plan_id` for `email` from the prepaid balance.
    ///
    /// The balance check and debit are one record transaction, so racing
    /// purchases cannot both spend the same funds. The prepaid balance is
    /// the only funding source; `use_balance == false` is rejected before
    /// any money moves, though the user record may already have been
    /// created by then.
    pub async fn purchase(
        &self,
        email: &str,
        plan_id: &str,
        use_balance: bool,
    ) -> Result<Order, ShopError> {
        if email.trim().is_empty() {
            return Err(ShopError::EmailRequired);
        }
        if plan_id.trim().is_empty() {
            return Err(ShopError::PlanRequired);
        }
        let plan = self
            .catalog
            .find(&PlanId(plan_id.to_string()))
            .ok_or(ShopError::PlanNotFound)?
            .clone();

        let user = self.directory.get_or_create(email)?;

        if !use_balance {
            return Err(ShopError::UnsupportedPayment);
        }

        let price = plan.price;
        let mut debit = Ok(());
        self.store
            .update_user(&user.id, &mut |user| debit = user.debit(price))?
            .ok_or_else(|| {
                ShopError::Consistency(format!("user {} vanished during purchase", user.id))
            })?;
        debit?;

        // The committed debit is the reservation; the order records it.
        let order = Order::new(&user, &plan);
        self.store.insert_order(order.clone())?;

        let request = ProvisionRequest::new(&plan, order.id);
        tracing::info!(order = %order.id, plan = %plan.id, user = %user.id, "provisioning plan");

        match self.gateway.provision(&request).await {
            Ok(payload) => {
                let completed = self
                    .store
                    .update_order(&order.id, &mut |order| order.complete(payload.clone()))?
                    .ok_or_else(|| {
                        ShopError::Consistency(format!(
                            "order {} vanished after provisioning",
                            order.id
                        ))
                    })?;
                tracing::info!(order = %order.id, "provisioned");
                Ok(completed)
            }
            Err(failure) => {
                tracing::warn!(order = %order.id, error = %failure.error, "provisioning failed; refunding debit");
                let failed = self
                    .store
                    .update_order(&order.id, &mut |order| order.fail(&failure))?;
                if failed.is_none() {
                    tracing::error!(order = %order.id, "failed order is missing from the store");
                }

                // Refund onto the current balance so credits that landed
                // while the call was in flight are preserved.
                let mut refund = Ok(());
                let refunded = self
                    .store
                    .update_user(&user.id, &mut |user| refund = user.credit(price))?;
                if refunded.is_none() {
                    return Err(ShopError::Consistency(format!(
                        "user {} missing during refund of order {}",
                        user.id, order.id
                    )));
                }
                refund?;

                Err(ShopError::Gateway(failure))
            }
        }
    }

    /// Records a provider webhook against an existing order.
    ///
    /// The payload is trusted only as data: the reported status is
    /// recorded (typed when it names a sanctioned state, verbatim
    /// otherwise) and the payload is merged into the order's provider
    /// response. Webhooks never move balances.
    pub fn apply_webhook(&self, order_ref: OrderId, payload: &Value) -> Result<Order, ShopError> {
        let updated = self
            .store
            .update_order(&order_ref, &mut |order| order.apply_webhook(payload))?
            .ok_or(ShopError::OrderNotFound)?;
        tracing::info!(order = %order_ref, status = ?updated.status, "webhook applied");
        Ok(updated)
    }
}
