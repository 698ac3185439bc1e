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

//! Topup invoices.

use crate::base::{InvoiceId, UserId};
use crate::user::User;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a topup invoice.
///
//  Pending ──settle──► Paid    (exactly once; repeat settles are no-ops)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

/// A topup invoice that credits its owner's balance once settled.
///
/// `paid_at` is present exactly when the status is Paid. Invoices are
/// never deleted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub user_id: UserId,
    pub email: String,
    pub amount: Decimal,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Creates a pending invoice for `user`. `amount` must already be
    /// validated positive.
    pub fn new(user: &User, amount: Decimal) -> Self {
        Self {
            id: InvoiceId(Uuid::new_v4()),
            user_id: user.id,
            email: user.email.clone(),
            amount,
            status: InvoiceStatus::Pending,
            created_at: Utc::now(),
            paid_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// Flips Pending to Paid and stamps `paid_at`.
    ///
    /// Returns `false` when the invoice was already paid. Run under the
    /// invoice's record transaction, this is the settlement idempotence
    /// gate: exactly one settling call observes the flip.
    pub fn mark_paid(&mut self) -> bool {
        if self.is_paid() {
            return false;
        }
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(Utc::now());
        true
    }
}
