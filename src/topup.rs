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

//! Topup subsystem: invoice creation and idempotent settlement.

use crate::base::InvoiceId;
use crate::directory::UserDirectory;
use crate::error::ShopError;
use crate::invoice::Invoice;
use crate::store::LedgerStore;
use crate::user::User;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Creates topup invoices and settles them onto user balances.
///
/// Settlement is the only credit path in the system and is idempotent:
/// however many times an invoice is settled, its amount lands on the
/// owner's balance exactly once.
#[derive(Clone)]
pub struct TopupService {
    store: Arc<dyn LedgerStore>,
    directory: UserDirectory,
}

impl TopupService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        let directory = UserDirectory::new(Arc::clone(&store));
        Self { store, directory }
    }

    /// Creates a Pending invoice for `email`.
    ///
    /// A missing amount is treated like a non-positive one. The balance
    /// is untouched until settlement; validation runs before the user is
    /// resolved, so a rejected request creates nothing.
    pub fn create_invoice(
        &self,
        email: &str,
        amount: Option<Decimal>,
    ) -> Result<Invoice, ShopError> {
        let amount = amount
            .filter(|amount| *amount > Decimal::ZERO)
            .ok_or(ShopError::InvalidAmount)?;
        let user = self.directory.get_or_create(email)?;

        let invoice = Invoice::new(&user, amount);
        self.store.insert_invoice(invoice.clone())?;
        tracing::info!(invoice = %invoice.id, user = %user.id, amount = %amount, "invoice created");
        Ok(invoice)
    }

    /// Settles an invoice onto its owner's balance and returns both
    /// updated records.
    ///
    /// The Pending to Paid flip runs under the invoice's record
    /// transaction and gates the credit, so racing settles credit exactly
    /// once; losers and repeat calls get the current state back. If the
    /// owning user record is missing the invoice is left Pending and a
    /// consistency fault is raised rather than finalizing a credit that
    /// cannot land.
    pub fn settle(&self, invoice_id: InvoiceId) -> Result<(Invoice, User), ShopError> {
        let invoice = self
            .store
            .get_invoice(&invoice_id)?
            .ok_or(ShopError::InvoiceNotFound)?;

        let user = match self.store.get_user(&invoice.user_id)? {
            Some(user) => user,
            None => {
                tracing::error!(invoice = %invoice_id, user = %invoice.user_id, "invoice owner missing; refusing to settle");
                return Err(ShopError::Consistency(format!(
                    "invoice {invoice_id} references missing user {}",
                    invoice.user_id
                )));
            }
        };

        if invoice.is_paid() {
            return Ok((invoice, user));
        }

        let mut flipped = false;
        let invoice = self
            .store
            .update_invoice(&invoice_id, &mut |invoice| flipped = invoice.mark_paid())?
            .ok_or(ShopError::InvoiceNotFound)?;

        if !flipped {
            // Lost the settle race; the winner performed the credit.
            return Ok((invoice, user));
        }

        let amount = invoice.amount;
        let mut credit = Ok(());
        let user = self
            .store
            .update_user(&invoice.user_id, &mut |user| credit = user.credit(amount))?
            .ok_or_else(|| {
                ShopError::Consistency(format!(
                    "invoice {invoice_id} paid but user {} is gone",
                    invoice.user_id
                ))
            })?;
        credit?;

        tracing::info!(invoice = %invoice_id, user = %user.id, amount = %amount, "invoice settled");
        Ok((invoice, user))
    }
}
