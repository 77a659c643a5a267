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

//! Settlement calculator integration tests.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use wallet_ledger_rs::{
    CalculatorConfig, CategoryId, CommissionRule, CommissionTier, Currency,
    InMemoryCommissionRules, LedgerError, OrderId, OrderItem, OrderStore, ProductId, RuleScope,
    SellerAccountId, SellerAccounts, SellerId, SettlementCalculator, SettlementHistory,
};

// === Test Collaborators ===

#[derive(Default)]
struct StaticOrders {
    delivered: Vec<OrderItem>,
    refunded: Vec<OrderItem>,
}

impl OrderStore for StaticOrders {
    fn delivered_paid_items(
        &self,
        _seller: SellerId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Vec<OrderItem> {
        self.delivered.clone()
    }

    fn refunded_items(
        &self,
        _seller: SellerId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Vec<OrderItem> {
        self.refunded.clone()
    }
}

struct StaticAccounts(Option<SellerAccountId>);

impl SellerAccounts for StaticAccounts {
    fn account_for(&self, _seller: SellerId) -> Option<SellerAccountId> {
        self.0.clone()
    }
}

struct FixedHistory(usize);

impl SettlementHistory for FixedHistory {
    fn overlapping_settlements(
        &self,
        _seller: SellerId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> usize {
        self.0
    }
}

fn item(order: u64, price: Decimal) -> OrderItem {
    OrderItem {
        order_id: OrderId(order),
        product_id: ProductId(1),
        category_id: CategoryId(1),
        quantity: 1,
        total_price: price,
        commission_rate: Decimal::ZERO,
        commission_amount: Decimal::ZERO,
    }
}

fn calculator_with(
    config: CalculatorConfig,
    orders: StaticOrders,
    rules: Vec<CommissionRule>,
    overlaps: usize,
) -> SettlementCalculator {
    SettlementCalculator::new(
        config,
        Arc::new(orders),
        Arc::new(StaticAccounts(Some(SellerAccountId("fa_001".to_string())))),
        Arc::new(InMemoryCommissionRules::new(rules)),
        Arc::new(FixedHistory(overlaps)),
    )
}

fn calculator(orders: StaticOrders, rules: Vec<CommissionRule>) -> SettlementCalculator {
    calculator_with(CalculatorConfig::default(), orders, rules, 0)
}

fn period() -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc::now() - Duration::days(8);
    (end - Duration::days(30), end)
}

// === Calculation ===

#[test]
fn zero_orders_yield_zero_result() {
    let calc = calculator(StaticOrders::default(), Vec::new());
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();

    assert_eq!(result.order_count, 0);
    assert_eq!(result.gross_amount, Decimal::ZERO);
    assert_eq!(result.commission_amount, Decimal::ZERO);
    assert_eq!(result.platform_fee_amount, Decimal::ZERO);
    assert_eq!(result.tax_amount, Decimal::ZERO);
    assert_eq!(result.adjustment_amount, Decimal::ZERO);
    assert_eq!(result.net_amount, Decimal::ZERO);
    assert!(result.breakdown.is_empty());
}

#[test]
fn missing_seller_account_is_an_error() {
    let calc = SettlementCalculator::new(
        CalculatorConfig::default(),
        Arc::new(StaticOrders::default()),
        Arc::new(StaticAccounts(None)),
        Arc::new(InMemoryCommissionRules::new(Vec::new())),
        Arc::new(FixedHistory(0)),
    );
    let (start, end) = period();

    let result = calc.calculate(SellerId(1), start, end, Currency::inr());
    assert!(matches!(result, Err(LedgerError::SellerAccountNotFound)));
}

#[test]
fn default_commission_fee_and_tax() {
    // No rules: the default 5% commission applies.
    // gross 200.00 -> commission 10.00, fee 2.00, tax 1.80, net 186.20
    let orders = StaticOrders {
        delivered: vec![item(1, dec!(200.00))],
        refunded: Vec::new(),
    };
    let calc = calculator(orders, Vec::new());
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();

    assert_eq!(result.order_count, 1);
    assert_eq!(result.gross_amount, dec!(200.00));
    assert_eq!(result.commission_amount, dec!(10.00));
    assert_eq!(result.platform_fee_amount, dec!(2.00));
    assert_eq!(result.tax_amount, dec!(1.80));
    assert_eq!(result.net_amount, dec!(186.20));

    let line = &result.breakdown[0];
    assert_eq!(line.commission_rate, dec!(0.05));
    assert_eq!(line.net_amount, dec!(186.20));
}

#[test]
fn amounts_round_half_up_per_item() {
    // gross 100.10: commission 5.005 -> 5.01, fee 1.001 -> 1.00,
    // tax 5.01 * 0.18 = 0.9018 -> 0.90
    let orders = StaticOrders {
        delivered: vec![item(1, dec!(100.10))],
        refunded: Vec::new(),
    };
    let calc = calculator(orders, Vec::new());
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();

    assert_eq!(result.commission_amount, dec!(5.01));
    assert_eq!(result.platform_fee_amount, dec!(1.00));
    assert_eq!(result.tax_amount, dec!(0.90));
}

#[test]
fn stored_commission_wins_over_rules() {
    let mut captured = item(1, dec!(100.00));
    captured.commission_rate = dec!(0.12);
    captured.commission_amount = dec!(12.00);

    let orders = StaticOrders {
        delivered: vec![captured],
        refunded: Vec::new(),
    };
    // A rule exists but must not be consulted.
    let rules = vec![CommissionRule::percentage(1, RuleScope::Global, dec!(0.50))];
    let calc = calculator(orders, rules);
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();

    assert_eq!(result.commission_amount, dec!(12.00));
    assert_eq!(result.breakdown[0].commission_rate, dec!(0.12));
}

#[test]
fn tiered_rule_applies_across_slabs() {
    // 1000 * 5% + 500 * 8% = 90.00
    let orders = StaticOrders {
        delivered: vec![item(1, dec!(1500.00))],
        refunded: Vec::new(),
    };
    let rules = vec![CommissionRule::tiered(
        1,
        RuleScope::Global,
        vec![
            CommissionTier {
                threshold: dec!(0),
                rate: dec!(0.05),
            },
            CommissionTier {
                threshold: dec!(1000),
                rate: dec!(0.08),
            },
        ],
    )];
    let calc = calculator(orders, rules);
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();

    assert_eq!(result.commission_amount, dec!(90.00));
    // fee 15.00, tax 16.20, net = 1500 - 90 - 15 - 16.20
    assert_eq!(result.platform_fee_amount, dec!(15.00));
    assert_eq!(result.tax_amount, dec!(16.20));
    assert_eq!(result.net_amount, dec!(1378.80));
}

#[test]
fn seller_rule_beats_global_rule() {
    let orders = StaticOrders {
        delivered: vec![item(1, dec!(100.00))],
        refunded: Vec::new(),
    };
    let rules = vec![
        CommissionRule::percentage(1, RuleScope::Global, dec!(0.10)),
        CommissionRule::percentage(2, RuleScope::Seller(SellerId(1)), dec!(0.02)),
    ];
    let calc = calculator(orders, rules);
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();
    assert_eq!(result.commission_amount, dec!(2.00));
}

#[test]
fn order_count_is_distinct_orders_not_items() {
    let orders = StaticOrders {
        delivered: vec![
            item(1, dec!(100.00)),
            item(1, dec!(50.00)),
            item(2, dec!(25.00)),
        ],
        refunded: Vec::new(),
    };
    let calc = calculator(orders, Vec::new());
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();
    assert_eq!(result.order_count, 2);
    assert_eq!(result.breakdown.len(), 3);
    assert_eq!(result.gross_amount, dec!(175.00));
}

#[test]
fn refunds_net_into_a_negative_adjustment() {
    // Refunded item gross 100, commission 5 (default rate):
    // adjustment = 5 - (100 - 5) = -90
    let orders = StaticOrders {
        delivered: vec![item(1, dec!(200.00))],
        refunded: vec![item(9, dec!(100.00))],
    };
    let calc = calculator(orders, Vec::new());
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();

    assert_eq!(result.adjustment_amount, dec!(-90.00));
    // net = 200 - 10 - 2 - 1.80 - 90
    assert_eq!(result.net_amount, dec!(96.20));
}

#[test]
fn injected_rates_are_honored() {
    let config = CalculatorConfig {
        platform_fee_rate: dec!(0.02),
        tax_rate: dec!(0.10),
        default_commission_rate: dec!(0.20),
        hold_period_days: 7,
    };
    let orders = StaticOrders {
        delivered: vec![item(1, dec!(100.00))],
        refunded: Vec::new(),
    };
    let calc = calculator_with(config, orders, Vec::new(), 0);
    let (start, end) = period();

    let result = calc
        .calculate(SellerId(1), start, end, Currency::inr())
        .unwrap();

    assert_eq!(result.commission_amount, dec!(20.00));
    assert_eq!(result.platform_fee_amount, dec!(2.00));
    assert_eq!(result.tax_amount, dec!(2.00));
    assert_eq!(result.net_amount, dec!(76.00));
}

// === Period Validation ===

#[test]
fn inverted_period_is_an_error() {
    let calc = calculator(StaticOrders::default(), Vec::new());
    let now = Utc::now();

    let validation = calc.validate_period(SellerId(1), now, now - Duration::days(1));
    assert!(!validation.is_valid);
    assert!(
        validation
            .errors
            .iter()
            .any(|e| e.contains("before period end"))
    );
}

#[test]
fn future_period_end_is_an_error() {
    let calc = calculator(StaticOrders::default(), Vec::new());
    let now = Utc::now();

    let validation =
        calc.validate_period(SellerId(1), now - Duration::days(7), now + Duration::days(1));
    assert!(!validation.is_valid);
    assert!(validation.errors.iter().any(|e| e.contains("future")));
}

#[test]
fn overlapping_settlements_warn_but_do_not_invalidate() {
    let calc = calculator_with(
        CalculatorConfig::default(),
        StaticOrders::default(),
        Vec::new(),
        2,
    );
    let (start, end) = period();

    let validation = calc.validate_period(SellerId(1), start, end);
    assert!(validation.is_valid);
    assert!(validation.warnings.iter().any(|w| w.contains("2 existing")));
}

#[test]
fn hold_period_warns_with_remaining_days() {
    let calc = calculator(StaticOrders::default(), Vec::new());
    let now = Utc::now();

    // Period ended 3 days ago with a 7-day hold: 4 days remain.
    let validation =
        calc.validate_period(SellerId(1), now - Duration::days(33), now - Duration::days(3));
    assert!(validation.is_valid);
    assert!(
        validation
            .warnings
            .iter()
            .any(|w| w.contains("hold period") && w.contains("4 day(s)"))
    );
}

#[test]
fn settled_past_period_is_clean() {
    let calc = calculator(StaticOrders::default(), Vec::new());
    let (start, end) = period();

    let validation = calc.validate_period(SellerId(1), start, end);
    assert!(validation.is_valid);
    assert!(validation.errors.is_empty());
    assert!(validation.warnings.is_empty());
}
