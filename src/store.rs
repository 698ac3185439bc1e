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

//! Ledger record storage.
//!
//! The [`LedgerStore`] trait is the persistence seam for the three record
//! types (users, invoices, orders). The subsystems above it rely on two
//! guarantees:
//!
//! - **Per-record atomicity**: every `update_*` runs its closure under an
//!   exclusive transaction on that one record, and `find_or_create_user`
//!   is a single atomic get-or-insert on the normalized email key.
//!   Balance debits, credits, and status flips all ride on this.
//! - **Insertion order**: listings return records newest-first.
//!
//! Cross-record atomicity is deliberately not offered; callers sequence
//! multi-record flows and accept the documented windows between steps.
//!
//! # Thread Safety
//!
//! [`MemoryStore`] backs each collection with a [`DashMap`], so mutations
//! on different records proceed in parallel while two mutations of the
//! same record serialize on its shard lock.

use crate::base::{InvoiceId, OrderId, UserId};
use crate::error::ShopError;
use crate::invoice::Invoice;
use crate::order::Order;
use crate::user::User;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::hash::Hash;

/// Keyed storage for ledger records.
///
/// Mutation closures are `&mut dyn FnMut` so the trait stays object safe;
/// fallible mutations capture their outcome in a local on the caller's
/// side. `update_*` returns the record as left by the mutation, or `None`
/// when no record has that id.
pub trait LedgerStore: Send + Sync {
    /// Atomic lookup-or-insert by normalized email. Two concurrent calls
    /// with the same email observe the same record.
    fn find_or_create_user(&self, email: &str) -> Result<User, ShopError>;
    fn get_user(&self, id: &UserId) -> Result<Option<User>, ShopError>;
    fn update_user(
        &self,
        id: &UserId,
        mutate: &mut dyn FnMut(&mut User),
    ) -> Result<Option<User>, ShopError>;
    /// All users, newest-first.
    fn list_users(&self) -> Result<Vec<User>, ShopError>;

    fn insert_invoice(&self, invoice: Invoice) -> Result<(), ShopError>;
    fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>, ShopError>;
    fn update_invoice(
        &self,
        id: &InvoiceId,
        mutate: &mut dyn FnMut(&mut Invoice),
    ) -> Result<Option<Invoice>, ShopError>;
    /// All invoices, newest-first.
    fn list_invoices(&self) -> Result<Vec<Invoice>, ShopError>;

    fn insert_order(&self, order: Order) -> Result<(), ShopError>;
    fn get_order(&self, id: &OrderId) -> Result<Option<Order>, ShopError>;
    fn update_order(
        &self,
        id: &OrderId,
        mutate: &mut dyn FnMut(&mut Order),
    ) -> Result<Option<Order>, ShopError>;
    /// All orders, newest-first.
    fn list_orders(&self) -> Result<Vec<Order>, ShopError>;
}

/// One record collection: rows behind sharded locks plus an insertion
/// journal for newest-first listings.
#[derive(Debug)]
struct Table<K: Eq + Hash, V> {
    rows: DashMap<K, V>,
    /// Insertion order. Every journaled key is present in `rows`.
    journal: Mutex<Vec<K>>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Adds a record under a fresh key.
    ///
    /// Uses the entry API for atomic check-and-insert; a key collision
    /// leaves the table untouched.
    fn insert(&self, key: K, value: V) -> Result<(), ShopError> {
        match self.rows.entry(key) {
            Entry::Occupied(_) => Err(ShopError::DuplicateRecord),
            Entry::Vacant(slot) => {
                slot.insert(value);
                self.journal.lock().push(key);
                Ok(())
            }
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.rows.get(key).map(|row| row.value().clone())
    }

    /// Runs `mutate` under the record's exclusive shard lock and returns
    /// the record as left by the mutation.
    fn update(&self, key: &K, mutate: &mut dyn FnMut(&mut V)) -> Option<V> {
        let mut row = self.rows.get_mut(key)?;
        mutate(row.value_mut());
        Some(row.value().clone())
    }

    /// Newest-first snapshot. The journal lock is released before rows
    /// are read back.
    fn list(&self) -> Vec<V> {
        let keys: Vec<K> = self.journal.lock().iter().rev().copied().collect();
        keys.into_iter().filter_map(|key| self.get(&key)).collect()
    }
}

/// In-memory [`LedgerStore`] backed by sharded concurrent maps.
///
/// Records live for the life of the process; nothing is ever deleted.
#[derive(Debug)]
pub struct MemoryStore {
    users: Table<UserId, User>,
    invoices: Table<InvoiceId, Invoice>,
    orders: Table<OrderId, Order>,
    /// Normalized email -> user id. The entry lock on this index is the
    /// get-or-create gate: at most one creation per email wins.
    email_index: DashMap<String, UserId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: Table::new(),
            invoices: Table::new(),
            orders: Table::new(),
            email_index: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryStore {
    fn find_or_create_user(&self, email: &str) -> Result<User, ShopError> {
        match self.email_index.entry(email.to_string()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                self.users
                    .get(&id)
                    .ok_or_else(|| ShopError::Consistency(format!("user {id} indexed but missing")))
            }
            Entry::Vacant(entry) => {
                // The row must exist before the index entry is published;
                // the entry guard holds racing lookups until both are in.
                let user = User::new(email);
                self.users.insert(user.id, user.clone())?;
                entry.insert(user.id);
                Ok(user)
            }
        }
    }

    fn get_user(&self, id: &UserId) -> Result<Option<User>, ShopError> {
        Ok(self.users.get(id))
    }

    fn update_user(
        &self,
        id: &UserId,
        mutate: &mut dyn FnMut(&mut User),
    ) -> Result<Option<User>, ShopError> {
        Ok(self.users.update(id, mutate))
    }

    fn list_users(&self) -> Result<Vec<User>, ShopError> {
        Ok(self.users.list())
    }

    fn insert_invoice(&self, invoice: Invoice) -> Result<(), ShopError> {
        self.invoices.insert(invoice.id, invoice)
    }

    fn get_invoice(&self, id: &InvoiceId) -> Result<Option<Invoice>, ShopError> {
        Ok(self.invoices.get(id))
    }

    fn update_invoice(
        &self,
        id: &InvoiceId,
        mutate: &mut dyn FnMut(&mut Invoice),
    ) -> Result<Option<Invoice>, ShopError> {
        Ok(self.invoices.update(id, mutate))
    }

    fn list_invoices(&self) -> Result<Vec<Invoice>, ShopError> {
        Ok(self.invoices.list())
    }

    fn insert_order(&self, order: Order) -> Result<(), ShopError> {
        self.orders.insert(order.id, order)
    }

    fn get_order(&self, id: &OrderId) -> Result<Option<Order>, ShopError> {
        Ok(self.orders.get(id))
    }

    fn update_order(
        &self,
        id: &OrderId,
        mutate: &mut dyn FnMut(&mut Order),
    ) -> Result<Option<Order>, ShopError> {
        Ok(self.orders.update(id, mutate))
    }

    fn list_orders(&self) -> Result<Vec<Order>, ShopError> {
        Ok(self.orders.list())
    }
}
