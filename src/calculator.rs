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

//! Settlement calculation.
//!
//! Computes what a seller is owed for a period from delivered-and-paid
//! order items: per-item gross, commission (stored on the item or resolved
//! through [`CommissionRules`]), platform fee, tax on commission, and a
//! refund adjustment, aggregated into a [`SettlementCalculationResult`].
//!
//! Platform rates live in [`CalculatorConfig`] and are injected at
//! construction so they stay overridable in tests.

use crate::base::{
    CategoryId, Currency, OrderId, ProductId, SellerAccountId, SellerId, round_money,
};
use crate::commission::{Commission, CommissionRule, CommissionRules, RuleScope, select_rule};
use crate::error::LedgerError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Platform-wide rates, injected into the calculator.
#[derive(Debug, Clone)]
pub struct CalculatorConfig {
    /// Fee on gross, e.g. 0.01 for 1%.
    pub platform_fee_rate: Decimal,
    /// Tax on commission (not on gross), e.g. 0.18 for 18%.
    pub tax_rate: Decimal,
    /// Commission applied when no rule matches, e.g. 0.05 for 5%.
    pub default_commission_rate: Decimal,
    /// Days after period end before funds become eligible.
    pub hold_period_days: i64,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::new(1, 2),
            tax_rate: Decimal::new(18, 2),
            default_commission_rate: Decimal::new(5, 2),
            hold_period_days: 7,
        }
    }
}

/// One order item as seen by the calculator.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub category_id: CategoryId,
    pub quantity: u32,
    pub total_price: Decimal,
    /// Commission captured at order time; zero when unset.
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
}

/// Order/product store collaborator.
pub trait OrderStore: Send + Sync {
    /// Items of DELIVERED orders with payment status PAID for the seller in
    /// the period. The eligibility filter is fixed, not configurable per call.
    fn delivered_paid_items(
        &self,
        seller: SellerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<OrderItem>;

    /// Items of REFUNDED orders for the seller in the period.
    fn refunded_items(
        &self,
        seller: SellerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<OrderItem>;
}

/// Seller account store collaborator.
pub trait SellerAccounts: Send + Sync {
    fn account_for(&self, seller: SellerId) -> Option<SellerAccountId>;
}

/// Existing-settlement lookup used for overlap warnings.
pub trait SettlementHistory: Send + Sync {
    fn overlapping_settlements(
        &self,
        seller: SellerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> usize;
}

/// Per-item settlement breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ItemBreakdown {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub gross_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub platform_fee_amount: Decimal,
    pub tax_amount: Decimal,
    pub net_amount: Decimal,
}

/// Aggregated settlement amounts for one seller and period.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementCalculationResult {
    pub seller_id: SellerId,
    pub seller_account_id: SellerAccountId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub currency: Currency,
    pub order_count: usize,
    pub gross_amount: Decimal,
    pub commission_amount: Decimal,
    pub platform_fee_amount: Decimal,
    pub tax_amount: Decimal,
    /// Refund adjustment; nets negative when refunds dominate.
    pub adjustment_amount: Decimal,
    pub net_amount: Decimal,
    pub breakdown: Vec<ItemBreakdown>,
}

/// Outcome of period validation: hard errors and advisory warnings.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Settlement calculator.
pub struct SettlementCalculator {
    config: CalculatorConfig,
    orders: Arc<dyn OrderStore>,
    accounts: Arc<dyn SellerAccounts>,
    rules: Arc<dyn CommissionRules>,
    history: Arc<dyn SettlementHistory>,
}

impl SettlementCalculator {
    pub fn new(
        config: CalculatorConfig,
        orders: Arc<dyn OrderStore>,
        accounts: Arc<dyn SellerAccounts>,
        rules: Arc<dyn CommissionRules>,
        history: Arc<dyn SettlementHistory>,
    ) -> Self {
        Self {
            config,
            orders,
            accounts,
            rules,
            history,
        }
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    /// Computes settlement amounts for a seller and period.
    ///
    /// A period with no eligible orders yields an all-zero result with an
    /// empty breakdown, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SellerAccountNotFound`] if the seller has no
    /// payout account.
    pub fn calculate(
        &self,
        seller_id: SellerId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        currency: Currency,
    ) -> Result<SettlementCalculationResult, LedgerError> {
        let seller_account_id = self
            .accounts
            .account_for(seller_id)
            .ok_or(LedgerError::SellerAccountNotFound)?;

        let rules = self.rules.rules();
        let now = Utc::now();

        let items = self
            .orders
            .delivered_paid_items(seller_id, period_start, period_end);

        let mut breakdown = Vec::with_capacity(items.len());
        let mut orders_seen: HashSet<OrderId> = HashSet::new();
        let mut gross_total = Decimal::ZERO;
        let mut commission_total = Decimal::ZERO;
        let mut fee_total = Decimal::ZERO;
        let mut tax_total = Decimal::ZERO;

        for item in &items {
            let gross = item.total_price;
            let commission = self.resolve_commission(&rules, seller_id, item, now);
            let platform_fee = round_money(gross * self.config.platform_fee_rate);
            let tax = round_money(commission.amount * self.config.tax_rate);
            let net = gross - commission.amount - platform_fee - tax;

            orders_seen.insert(item.order_id);
            gross_total += gross;
            commission_total += commission.amount;
            fee_total += platform_fee;
            tax_total += tax;

            breakdown.push(ItemBreakdown {
                order_id: item.order_id,
                product_id: item.product_id,
                gross_amount: gross,
                commission_rate: commission.rate,
                commission_amount: commission.amount,
                platform_fee_amount: platform_fee,
                tax_amount: tax,
                net_amount: net,
            });
        }

        // Refunds: the seller recovers the commission on the refunded item
        // but loses the net they would have kept.
        let mut adjustment = Decimal::ZERO;
        for item in self
            .orders
            .refunded_items(seller_id, period_start, period_end)
        {
            let gross = item.total_price;
            let commission = self.resolve_commission(&rules, seller_id, &item, now);
            adjustment += commission.amount - (gross - commission.amount);
        }

        let net_total = gross_total - commission_total - fee_total - tax_total + adjustment;

        debug!(
            seller = %seller_id,
            orders = orders_seen.len(),
            gross = %gross_total,
            net = %net_total,
            "settlement calculated"
        );

        Ok(SettlementCalculationResult {
            seller_id,
            seller_account_id,
            period_start,
            period_end,
            currency,
            order_count: orders_seen.len(),
            gross_amount: gross_total,
            commission_amount: commission_total,
            platform_fee_amount: fee_total,
            tax_amount: tax_total,
            adjustment_amount: adjustment,
            net_amount: net_total,
            breakdown,
        })
    }

    /// Validates a settlement period.
    ///
    /// Overlapping settlements and an unelapsed hold period are warnings,
    /// not errors.
    pub fn validate_period(
        &self,
        seller_id: SellerId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> PeriodValidation {
        let now = Utc::now();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if period_start >= period_end {
            errors.push("period start must be before period end".to_string());
        }
        if period_end > now {
            errors.push("period end is in the future".to_string());
        }

        let overlapping = self
            .history
            .overlapping_settlements(seller_id, period_start, period_end);
        if overlapping > 0 {
            warnings.push(format!(
                "{} existing settlement(s) overlap this period",
                overlapping
            ));
        }

        let hold_until = period_end + Duration::days(self.config.hold_period_days);
        if now < hold_until {
            let remaining = hold_until - now;
            let mut days = remaining.num_days();
            if remaining - Duration::days(days) > Duration::zero() {
                days += 1;
            }
            warnings.push(format!(
                "funds are inside the {}-day hold period, {} day(s) remaining",
                self.config.hold_period_days, days
            ));
        }

        PeriodValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Stored commission wins when the order captured one; otherwise the
    /// best matching rule applies, falling back to the default percentage.
    fn resolve_commission(
        &self,
        rules: &[CommissionRule],
        seller_id: SellerId,
        item: &OrderItem,
        now: DateTime<Utc>,
    ) -> Commission {
        if !item.commission_rate.is_zero() && !item.commission_amount.is_zero() {
            return Commission {
                amount: item.commission_amount,
                rate: item.commission_rate,
            };
        }

        match select_rule(rules, seller_id, item.category_id, item.product_id, now) {
            Some(rule) => rule.commission_on(item.total_price),
            None => CommissionRule::percentage(0, RuleScope::Global, self.config.default_commission_rate)
                .commission_on(item.total_price),
        }
    }
}
