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

//! User records and balance arithmetic.

use crate::base::UserId;
use crate::error::ShopError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A storefront user with a prepaid balance.
///
/// At most one user exists per normalized email. The balance is moved
/// only by invoice settlement (credit) and order fulfillment (debit and
/// compensating credit); it never goes negative. Users are created
/// lazily on first reference and never deleted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a user with a zero balance. `email` must already be
    /// normalized by the directory.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: UserId(Uuid::new_v4()),
            email: email.into(),
            balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
    }

    /// Increases the balance.
    pub fn credit(&mut self, amount: Decimal) -> Result<(), ShopError> {
        if amount <= Decimal::ZERO {
            return Err(ShopError::InvalidAmount);
        }
        self.balance += amount;
        self.assert_invariants();
        Ok(())
    }

    /// Decreases the balance; refuses to overdraw.
    pub fn debit(&mut self, amount: Decimal) -> Result<(), ShopError> {
        if amount <= Decimal::ZERO {
            return Err(ShopError::InvalidAmount);
        }
        if self.balance < amount {
            return Err(ShopError::InsufficientBalance);
        }
        self.balance -= amount;
        self.assert_invariants();
        Ok(())
    }
}
