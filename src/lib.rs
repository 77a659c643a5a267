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

//! # Wallet Ledger
//!
//! This library provides a seller wallet ledger and settlement engine for a
//! marketplace back office: balance tracking across available, pending, and
//! reserved buckets, commission calculation for settlement periods, a
//! settlement lifecycle with reservation-backed payouts, and idempotent
//! reconciliation of payout-provider webhooks.
//!
//! ## Core Components
//!
//! - [`LedgerEngine`]: wallet registry and the only mutation path for balances
//! - [`Wallet`]: per-seller balances with three non-negative buckets
//! - [`SettlementCalculator`]: commission, fee, tax, and refund-adjustment math
//! - [`SettlementBook`]: settlement rows and their state machine
//! - [`WebhookReconciler`]: provider webhook events mapped to transitions
//! - [`AuditSink`] / [`SettlementNotifier`]: fire-and-forget collaborators
//!
//! ## Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use wallet_ledger_rs::{
//!     Currency, LedgerEngine, SellerId, TransactionCategory, TxContext,
//! };
//!
//! let engine = LedgerEngine::new();
//! let wallet = engine
//!     .open_wallet(SellerId(1), Currency::inr())
//!     .unwrap();
//!
//! // Sale proceeds land in the pending bucket until cleared.
//! let receipt = engine
//!     .credit(
//!         wallet.wallet_id(),
//!         dec!(250.00),
//!         TransactionCategory::Sale,
//!         TxContext::default(),
//!     )
//!     .unwrap();
//! assert_eq!(receipt.snapshot.pending, dec!(250.00));
//! assert_eq!(receipt.snapshot.total, dec!(250.00));
//! ```
//!
//! ## Thread Safety
//!
//! Mutations on the same wallet are serialized behind the wallet's own lock;
//! operations on different wallets run in parallel. Settlement transitions
//! are serialized per settlement the same way.

pub mod audit;
mod base;
pub mod calculator;
pub mod commission;
mod engine;
pub mod error;
pub mod notify;
mod settlement;
mod transaction;
mod transaction_log;
pub mod wallet;
pub mod webhook;

pub use audit::{AuditAction, AuditEntry, AuditSink, InMemoryAuditLog, TracingAudit};
pub use base::{
    CategoryId, Currency, OrderId, ProductId, SellerAccountId, SellerId, SettlementId,
    TransactionId, WalletId, round_money,
};
pub use calculator::{
    CalculatorConfig, ItemBreakdown, OrderItem, OrderStore, PeriodValidation, SellerAccounts,
    SettlementCalculationResult, SettlementCalculator, SettlementHistory,
};
pub use commission::{
    Commission, CommissionRule, CommissionRules, CommissionTier, InMemoryCommissionRules,
    RuleKind, RuleScope, select_rule,
};
pub use engine::{LedgerEngine, LedgerReceipt};
pub use error::LedgerError;
pub use notify::{NullNotifier, SettlementNotifier, TracingNotifier};
pub use settlement::{Settlement, SettlementBook, SettlementStatus};
pub use transaction::{
    Reference, TransactionCategory, TransactionKind, TxContext, WalletTransaction,
};
pub use transaction_log::TransactionLog;
pub use wallet::{BalanceSnapshot, Wallet};
pub use webhook::{
    HmacSha256Verifier, NoVerification, ProviderEntity, SignatureVerifier, WebhookAck,
    WebhookEnvelope, WebhookReconciler,
};
