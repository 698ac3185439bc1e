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

//! Storefront facade wiring the subsystems together.

use crate::base::{InvoiceId, OrderId};
use crate::directory::UserDirectory;
use crate::error::ShopError;
use crate::fulfillment::FulfillmentService;
use crate::gateway::ProviderGateway;
use crate::invoice::Invoice;
use crate::order::Order;
use crate::plan::{Plan, PlanCatalog};
use crate::store::LedgerStore;
use crate::topup::TopupService;
use crate::user::User;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

/// The assembled storefront: one store, one catalog, one gateway, and
/// the services operating them. This is the single entry point handed to
/// the HTTP layer.
#[derive(Clone)]
pub struct Storefront {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<PlanCatalog>,
    directory: UserDirectory,
    topup: TopupService,
    fulfillment: FulfillmentService,
}

impl Storefront {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        catalog: PlanCatalog,
        gateway: Arc<dyn ProviderGateway>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            directory: UserDirectory::new(Arc::clone(&store)),
            topup: TopupService::new(Arc::clone(&store)),
            fulfillment: FulfillmentService::new(
                Arc::clone(&store),
                Arc::clone(&catalog),
                gateway,
            ),
            store,
            catalog,
        }
    }

    /// All plans in catalog order.
    pub fn plans(&self) -> &[Plan] {
        self.catalog.list()
    }

    /// Resolves a user by email, creating it on first reference.
    pub fn user_for_email(&self, email: &str) -> Result<User, ShopError> {
        self.directory.get_or_create(email)
    }

    pub fn create_invoice(
        &self,
        email: &str,
        amount: Option<Decimal>,
    ) -> Result<Invoice, ShopError> {
        self.topup.create_invoice(email, amount)
    }

    pub fn settle_invoice(&self, invoice_id: InvoiceId) -> Result<(Invoice, User), ShopError> {
        self.topup.settle(invoice_id)
    }

    pub async fn purchase(
        &self,
        email: &str,
        plan_id: &str,
        use_balance: bool,
    ) -> Result<Order, ShopError> {
        self.fulfillment.purchase(email, plan_id, use_balance).await
    }

    pub fn apply_webhook(&self, order_ref: OrderId, payload: &Value) -> Result<Order, ShopError> {
        self.fulfillment.apply_webhook(order_ref, payload)
    }

    /// Admin listing, newest-first.
    pub fn list_users(&self) -> Result<Vec<User>, ShopError> {
        self.store.list_users()
    }

    /// Admin listing, newest-first.
    pub fn list_invoices(&self) -> Result<Vec<Invoice>, ShopError> {
        self.store.list_invoices()
    }

    /// Admin listing, newest-first.
    pub fn list_orders(&self) -> Result<Vec<Order>, ShopError> {
        self.store.list_orders()
    }
}
