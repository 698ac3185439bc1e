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

//! # Prepaid Shop
//!
//! A digital-goods storefront engine: users hold a prepaid balance, top it
//! up via simulated payment invoices, and spend it on provisioned service
//! plans fulfilled by an external provider API. Failed provisioning calls
//! are compensated with a refund of the debited price.
//!
//! ## Core Components
//!
//! - [`Storefront`]: Facade wiring the subsystems behind one entry point
//! - [`LedgerStore`] / [`MemoryStore`]: Keyed record storage with per-record transactions
//! - [`UserDirectory`]: Get-or-create-by-email resolution
//! - [`TopupService`]: Invoice creation and idempotent settlement
//! - [`FulfillmentService`]: Purchases with compensating refunds on provider failure
//! - [`ProviderGateway`]: Outbound provisioning boundary
//! - [`ShopError`]: Error taxonomy shared by every operation
//!
//! ## Example
//!
//! ```
//! use prepaid_shop_rs::{MemoryStore, TopupService};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let topup = TopupService::new(store);
//!
//! // Create an invoice and settle it; settling again changes nothing.
//! let invoice = topup
//!     .create_invoice("alice@example.com", Some(dec!(15000)))
//!     .unwrap();
//! let (invoice, user) = topup.settle(invoice.id).unwrap();
//! assert!(invoice.is_paid());
//! assert_eq!(user.balance, dec!(15000));
//!
//! let (_, user) = topup.settle(invoice.id).unwrap();
//! assert_eq!(user.balance, dec!(15000));
//! ```
//!
//! ## Thread Safety
//!
//! Record mutations run under per-record transactions, so operations on
//! different records proceed in parallel while two mutations of the same
//! record serialize. The provider call is the only suspension point and
//! holds no store lock.

mod base;
pub mod directory;
pub mod error;
pub mod fulfillment;
pub mod gateway;
mod invoice;
mod order;
mod plan;
pub mod server;
pub mod store;
mod storefront;
pub mod topup;
mod user;

pub use base::{InvoiceId, OrderId, PlanId, UserId};
pub use directory::UserDirectory;
pub use error::{GatewayFailure, ShopError};
pub use fulfillment::FulfillmentService;
pub use gateway::{HttpProviderGateway, ProviderGateway, ProvisionRequest};
pub use invoice::{Invoice, InvoiceStatus};
pub use order::{Order, OrderStatus};
pub use plan::{Plan, PlanCatalog};
pub use server::{AppState, create_router};
pub use store::{LedgerStore, MemoryStore};
pub use storefront::Storefront;
pub use topup::TopupService;
pub use user::User;
