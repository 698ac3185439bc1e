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

//! Plan catalog.

use crate::base::PlanId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A provisioned service plan offered for purchase.
///
/// Catalog entries are immutable. The serialized shape keeps the provider
/// wire convention: the service kind goes out as `type` and the duration
/// as `duration_days`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub price: Decimal,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_days: u32,
}

/// Read-only plan lookup injected into the fulfillment subsystem.
///
/// Lookups are a linear scan; catalogs are a handful of entries and the
/// listing order is the catalog order.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// Parses a catalog from a JSON array of plans.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(data)?))
    }

    /// The sample catalog served when no plan file is configured.
    pub fn bundled() -> Self {
        Self::new(vec![
            Plan {
                id: "p1".into(),
                name: "SSH 7 Days".to_string(),
                price: dec!(5000),
                kind: "ssh".to_string(),
                duration_days: 7,
            },
            Plan {
                id: "p2".into(),
                name: "SSH 30 Days".to_string(),
                price: dec!(15000),
                kind: "ssh".to_string(),
                duration_days: 30,
            },
            Plan {
                id: "p3".into(),
                name: "VMess 7 Days".to_string(),
                price: dec!(7000),
                kind: "vmess".to_string(),
                duration_days: 7,
            },
            Plan {
                id: "p4".into(),
                name: "VMess 30 Days".to_string(),
                price: dec!(20000),
                kind: "vmess".to_string(),
                duration_days: 30,
            },
        ])
    }

    pub fn find(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == *id)
    }

    /// All plans in catalog order.
    pub fn list(&self) -> &[Plan] {
        &self.plans
    }
}
