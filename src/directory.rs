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

//! User directory: get-or-create-by-email.

use crate::error::ShopError;
use crate::store::LedgerStore;
use crate::user::User;
use std::sync::Arc;

/// Resolves emails to durable user records.
///
/// Email normalization (trim plus lowercase) happens here and nowhere
/// else, so every subsystem resolves `" Alice@Example.COM "` and
/// `"alice@example.com"` to the same record. Atomicity of the lookup-or-
/// insert is the store's job.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn LedgerStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Returns the user owning `email`, creating it with a zero balance
    /// on first reference. Not a pure read.
    pub fn get_or_create(&self, email: &str) -> Result<User, ShopError> {
        let normalized = normalize(email)?;
        self.store.find_or_create_user(&normalized)
    }
}

fn normalize(email: &str) -> Result<String, ShopError> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ShopError::EmailRequired);
    }
    Ok(normalized)
}
