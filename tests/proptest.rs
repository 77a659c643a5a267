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

//! Property-based tests for the wallet ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! valid ledger operations.

use proptest::prelude::*;
use rust_decimal::Decimal;
use wallet_ledger_rs::{
    CommissionRule, CommissionTier, Currency, LedgerEngine, LedgerError, RuleScope, SellerId,
    TransactionCategory, TransactionId, TxContext, Wallet, WalletId,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 10000.00 with 2 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// One random wallet operation: 0=credit-available, 1=credit-pending,
/// 2=debit, 3=reserve, 4=release, 5=move-pending.
fn arb_op() -> impl Strategy<Value = (u8, Decimal)> {
    (0u8..6, arb_amount())
}

fn wallet() -> Wallet {
    Wallet::new(WalletId(1), SellerId(1), Currency::inr())
}

// =============================================================================
// Bucket Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// After every operation, all buckets are non-negative and the total
    /// equals their sum.
    #[test]
    fn buckets_never_negative_and_total_is_sum(
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let wallet = wallet();

        for (op, amount) in ops {
            // Failures are fine; invariants must hold regardless.
            let _ = match op {
                0 => wallet.credit(amount, false),
                1 => wallet.credit(amount, true),
                2 => wallet.debit_available(amount),
                3 => wallet.reserve(amount),
                4 => wallet.release_reserve(amount),
                _ => wallet.move_pending_to_available(amount),
            };

            prop_assert!(wallet.available() >= Decimal::ZERO);
            prop_assert!(wallet.pending() >= Decimal::ZERO);
            prop_assert!(wallet.reserved() >= Decimal::ZERO);
            prop_assert_eq!(
                wallet.total(),
                wallet.available() + wallet.pending() + wallet.reserved()
            );
        }
    }

    /// Reserve then release of the same amount restores both buckets
    /// exactly (round-trip law).
    #[test]
    fn reserve_release_round_trip(
        funding in arb_amount(),
        extra in arb_amount(),
    ) {
        let wallet = wallet();
        wallet.credit(funding + extra, false).unwrap();

        let available_before = wallet.available();
        let reserved_before = wallet.reserved();

        wallet.reserve(funding).unwrap();
        wallet.release_reserve(funding).unwrap();

        prop_assert_eq!(wallet.available(), available_before);
        prop_assert_eq!(wallet.reserved(), reserved_before);
    }

    /// Pending clearance round trip preserves the total.
    #[test]
    fn pending_clearance_preserves_total(
        amount in arb_amount(),
    ) {
        let wallet = wallet();
        wallet.credit(amount, true).unwrap();
        let total_before = wallet.total();

        wallet.move_pending_to_available(amount).unwrap();

        prop_assert_eq!(wallet.total(), total_before);
        prop_assert_eq!(wallet.pending(), Decimal::ZERO);
        prop_assert_eq!(wallet.available(), amount);
    }

    /// Successful credits sum to the total balance.
    #[test]
    fn credits_sum_to_total(
        amounts in prop::collection::vec(arb_amount(), 1..20),
    ) {
        let wallet = wallet();
        let expected: Decimal = amounts.iter().copied().sum();

        for amount in &amounts {
            wallet.credit(*amount, false).unwrap();
        }

        prop_assert_eq!(wallet.total(), expected);
        prop_assert_eq!(wallet.available(), expected);
    }

    /// Cannot debit more than available, and a failed debit changes nothing.
    #[test]
    fn cannot_overdraw(
        funding in arb_amount(),
        extra in arb_amount(),
    ) {
        let wallet = wallet();
        wallet.credit(funding, false).unwrap();

        let result = wallet.debit_available(funding + extra);
        prop_assert_eq!(result, Err(LedgerError::InsufficientBalance));
        prop_assert_eq!(wallet.available(), funding);
    }
}

// =============================================================================
// Engine Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Duplicate transaction IDs are rejected and apply only once.
    #[test]
    fn engine_rejects_duplicate_transaction_ids(
        amount1 in arb_amount(),
        amount2 in arb_amount(),
    ) {
        let engine = LedgerEngine::new();
        let wallet = engine.open_wallet(SellerId(1), Currency::inr()).unwrap();
        let ctx = || TxContext {
            transaction_id: Some(TransactionId("TXN_FIXED".to_string())),
            ..TxContext::default()
        };

        engine
            .credit(wallet.wallet_id(), amount1, TransactionCategory::Manual, ctx())
            .unwrap();
        let result = engine.credit(
            wallet.wallet_id(),
            amount2,
            TransactionCategory::Manual,
            ctx(),
        );

        prop_assert_eq!(result, Err(LedgerError::DuplicateTransaction));
        prop_assert_eq!(wallet.available(), amount1);
    }

    /// Sellers are isolated: operations on one never affect another.
    #[test]
    fn sellers_are_isolated(
        amount1 in arb_amount(),
        amount2 in arb_amount(),
    ) {
        let engine = LedgerEngine::new();
        let a = engine.open_wallet(SellerId(1), Currency::inr()).unwrap();
        let b = engine.open_wallet(SellerId(2), Currency::inr()).unwrap();

        engine
            .credit(a.wallet_id(), amount1, TransactionCategory::Manual, TxContext::default())
            .unwrap();
        engine
            .credit(b.wallet_id(), amount2, TransactionCategory::Manual, TxContext::default())
            .unwrap();

        prop_assert_eq!(a.total(), amount1);
        prop_assert_eq!(b.total(), amount2);
    }

    /// Every successful mutation appends exactly one log entry whose
    /// balance_after matches the affected bucket.
    #[test]
    fn log_entries_match_mutations(
        amounts in prop::collection::vec(arb_amount(), 1..10),
    ) {
        let engine = LedgerEngine::new();
        let wallet = engine.open_wallet(SellerId(1), Currency::inr()).unwrap();

        let mut running = Decimal::ZERO;
        for amount in &amounts {
            running += *amount;
            let receipt = engine
                .credit(
                    wallet.wallet_id(),
                    *amount,
                    TransactionCategory::Manual,
                    TxContext::default(),
                )
                .unwrap();
            prop_assert_eq!(receipt.transaction.balance_after, running);
        }

        prop_assert_eq!(engine.transactions(wallet.wallet_id()).len(), amounts.len());
    }
}

// =============================================================================
// Commission Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Percentage commission never exceeds gross for rates below 1.
    #[test]
    fn percentage_commission_bounded_by_gross(
        gross in arb_amount(),
        rate_bps in 1u32..10_000,
    ) {
        let rate = Decimal::new(rate_bps as i64, 4);
        let rule = CommissionRule::percentage(1, RuleScope::Global, rate);
        let commission = rule.commission_on(gross);

        prop_assert!(commission.amount >= Decimal::ZERO);
        // Half-up rounding can add at most half a cent.
        prop_assert!(commission.amount <= gross + Decimal::new(1, 2));
    }

    /// Clamps always hold: min <= amount <= max when both are set.
    #[test]
    fn clamped_commission_stays_in_bounds(
        gross in arb_amount(),
        min_cents in 0i64..=5_000,
        span_cents in 0i64..=5_000,
    ) {
        let min = Decimal::new(min_cents, 2);
        let max = Decimal::new(min_cents + span_cents, 2);
        let rule = CommissionRule::percentage(1, RuleScope::Global, Decimal::new(5, 2))
            .with_clamps(Some(min), Some(max));

        let commission = rule.commission_on(gross);
        prop_assert!(commission.amount >= min);
        prop_assert!(commission.amount <= max);
    }

    /// Tiered commission is monotonic in gross.
    #[test]
    fn tiered_commission_is_monotonic(
        gross in arb_amount(),
        bump in arb_amount(),
    ) {
        let rule = CommissionRule::tiered(
            1,
            RuleScope::Global,
            vec![
                CommissionTier { threshold: Decimal::ZERO, rate: Decimal::new(5, 2) },
                CommissionTier { threshold: Decimal::new(100_000, 2), rate: Decimal::new(8, 2) },
            ],
        );

        let smaller = rule.commission_on(gross);
        let larger = rule.commission_on(gross + bump);
        prop_assert!(larger.amount >= smaller.amount);
    }
}
