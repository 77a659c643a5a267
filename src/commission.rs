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

//! Commission rules and commission math.
//!
//! Rules are externally managed and read-only from the calculator's
//! perspective. Selection picks the single best rule for an order item:
//! scope precedence Seller > Category > Product > Global, then highest
//! priority within the winning scope.

use crate::base::{CategoryId, ProductId, SellerId, round_money};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// What a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "id", rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Seller(SellerId),
    Category(CategoryId),
    Product(ProductId),
}

impl RuleScope {
    /// Lower wins: Seller > Category > Product > Global.
    fn precedence(&self) -> u8 {
        match self {
            RuleScope::Seller(_) => 0,
            RuleScope::Category(_) => 1,
            RuleScope::Product(_) => 2,
            RuleScope::Global => 3,
        }
    }

    fn matches(&self, seller: SellerId, category: CategoryId, product: ProductId) -> bool {
        match self {
            RuleScope::Global => true,
            RuleScope::Seller(s) => *s == seller,
            RuleScope::Category(c) => *c == category,
            RuleScope::Product(p) => *p == product,
        }
    }
}

/// How a rule computes its commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    Percentage,
    Fixed,
    Tiered,
}

/// One slab of a tiered rule: the given rate applies to the slice of gross
/// between this threshold and the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub threshold: Decimal,
    pub rate: Decimal,
}

/// A commission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub id: u32,
    pub kind: RuleKind,
    pub scope: RuleScope,
    /// Fraction, e.g. 0.05 for 5%. Used by percentage rules.
    pub rate: Decimal,
    /// Used by fixed rules.
    pub fixed_amount: Decimal,
    /// Used by tiered rules; walked in ascending threshold order.
    pub tiers: Vec<CommissionTier>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    /// Higher wins within the same scope.
    pub priority: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Computed commission for one order item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commission {
    pub amount: Decimal,
    pub rate: Decimal,
}

impl CommissionRule {
    pub fn percentage(id: u32, scope: RuleScope, rate: Decimal) -> Self {
        Self {
            id,
            kind: RuleKind::Percentage,
            scope,
            rate,
            fixed_amount: Decimal::ZERO,
            tiers: Vec::new(),
            min_amount: None,
            max_amount: None,
            priority: 0,
            valid_from: None,
            valid_to: None,
            is_active: true,
        }
    }

    pub fn fixed(id: u32, scope: RuleScope, amount: Decimal) -> Self {
        Self {
            kind: RuleKind::Fixed,
            fixed_amount: amount,
            rate: Decimal::ZERO,
            ..Self::percentage(id, scope, Decimal::ZERO)
        }
    }

    pub fn tiered(id: u32, scope: RuleScope, tiers: Vec<CommissionTier>) -> Self {
        Self {
            kind: RuleKind::Tiered,
            tiers,
            rate: Decimal::ZERO,
            ..Self::percentage(id, scope, Decimal::ZERO)
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_clamps(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    pub fn with_validity(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = from;
        self.valid_to = to;
        self
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if now > to {
                return false;
            }
        }
        true
    }

    /// Commission for a gross amount, rounded to currency precision, with
    /// min/max clamps applied after the type-specific computation. A clamp
    /// recomputes the effective rate from the clamped amount.
    pub fn commission_on(&self, gross: Decimal) -> Commission {
        let (raw_amount, raw_rate) = match self.kind {
            RuleKind::Percentage => (gross * self.rate, self.rate),
            RuleKind::Fixed => (self.fixed_amount, derived_rate(self.fixed_amount, gross)),
            RuleKind::Tiered => {
                let amount = tiered_amount(&self.tiers, gross);
                (amount, derived_rate(amount, gross))
            }
        };

        let mut amount = round_money(raw_amount);
        let mut rate = raw_rate;
        let mut clamped = false;
        if let Some(min) = self.min_amount {
            if amount < min {
                amount = min;
                clamped = true;
            }
        }
        if let Some(max) = self.max_amount {
            if amount > max {
                amount = max;
                clamped = true;
            }
        }
        if clamped {
            rate = derived_rate(amount, gross);
        }

        Commission {
            amount,
            rate: round_rate(rate),
        }
    }
}

fn derived_rate(amount: Decimal, gross: Decimal) -> Decimal {
    if gross.is_zero() {
        Decimal::ZERO
    } else {
        amount / gross
    }
}

fn round_rate(rate: Decimal) -> Decimal {
    rate.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
}

/// Walks tiers in ascending threshold order; each tier's rate applies to the
/// slice of gross between its threshold and the next one.
fn tiered_amount(tiers: &[CommissionTier], gross: Decimal) -> Decimal {
    let mut sorted = tiers.to_vec();
    sorted.sort_by(|a, b| a.threshold.cmp(&b.threshold));

    let mut total = Decimal::ZERO;
    for (i, tier) in sorted.iter().enumerate() {
        if gross <= tier.threshold {
            break;
        }
        let upper = sorted
            .get(i + 1)
            .map(|next| next.threshold)
            .unwrap_or(gross)
            .min(gross);
        total += (upper - tier.threshold) * tier.rate;
    }
    total
}

/// Source of the active rule set.
pub trait CommissionRules: Send + Sync {
    fn rules(&self) -> Vec<CommissionRule>;
}

/// Static in-memory rule set.
#[derive(Debug, Default)]
pub struct InMemoryCommissionRules {
    rules: Vec<CommissionRule>,
}

impl InMemoryCommissionRules {
    pub fn new(rules: Vec<CommissionRule>) -> Self {
        Self { rules }
    }
}

impl CommissionRules for InMemoryCommissionRules {
    fn rules(&self) -> Vec<CommissionRule> {
        self.rules.clone()
    }
}

/// Picks the single applicable rule for an order item: active and inside its
/// validity window, matching the item, ordered by scope precedence then
/// priority (higher wins).
pub fn select_rule<'a>(
    rules: &'a [CommissionRule],
    seller: SellerId,
    category: CategoryId,
    product: ProductId,
    now: DateTime<Utc>,
) -> Option<&'a CommissionRule> {
    rules
        .iter()
        .filter(|r| r.is_valid_at(now) && r.scope.matches(seller, category, product))
        .min_by_key(|r| (r.scope.precedence(), std::cmp::Reverse(r.priority)))
}
