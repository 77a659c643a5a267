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

//! Wallet ledger engine.
//!
//! The [`LedgerEngine`] owns every seller wallet and is the only mutation
//! path for balances. Each operation validates, mutates a single wallet
//! under that wallet's lock, and appends exactly one immutable
//! [`WalletTransaction`] — either the whole operation applies or none of it.
//!
//! # Bucket routing
//!
//! | Operation | Source | Destination |
//! |-----------|--------|-------------|
//! | credit (sale, unsettled) | — | pending |
//! | credit (other) | — | available |
//! | debit (settlement) | reserved | — |
//! | debit (other) | available | — |
//! | reserve | available | reserved |
//! | release_reserve | reserved | available |
//! | move_pending_to_available | pending | available |
//!
//! # Thread Safety
//!
//! Wallets live in a [`DashMap`] and carry their own locks, so operations on
//! different wallets run in parallel while operations on the same wallet are
//! serialized. Two reserves racing for the same available funds cannot both
//! succeed.

use crate::base::{Currency, SellerId, TransactionId, WalletId};
use crate::error::LedgerError;
use crate::transaction::{TransactionCategory, TransactionKind, TxContext, WalletTransaction};
use crate::transaction_log::TransactionLog;
use crate::wallet::{BalanceSnapshot, Wallet};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Result of a ledger mutation: the wallet's balances after the operation
/// and the ledger entry it appended.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReceipt {
    pub snapshot: BalanceSnapshot,
    pub transaction: Arc<WalletTransaction>,
}

/// Ledger engine managing seller wallets and their transaction log.
///
/// # Invariants
///
/// - One wallet per seller, enforced at open time.
/// - Transaction IDs are globally unique across all operations.
/// - No bucket ever goes negative; the total is always the bucket sum.
/// - A rejected operation leaves no trace in the log or the balances.
pub struct LedgerEngine {
    /// Wallets indexed by wallet ID.
    wallets: DashMap<WalletId, Arc<Wallet>>,
    /// Seller to wallet mapping (one wallet per seller).
    by_seller: DashMap<SellerId, WalletId>,
    /// Append-only ledger log, also the idempotency-key registry.
    log: TransactionLog,
    next_wallet_id: AtomicU32,
}

impl LedgerEngine {
    /// Creates a new engine with no wallets or transactions.
    pub fn new() -> Self {
        LedgerEngine {
            wallets: DashMap::new(),
            by_seller: DashMap::new(),
            log: TransactionLog::new(),
            next_wallet_id: AtomicU32::new(1),
        }
    }

    /// Opens a wallet for a seller.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::WalletExists`] if the seller already has one.
    pub fn open_wallet(
        &self,
        seller_id: SellerId,
        currency: Currency,
    ) -> Result<Arc<Wallet>, LedgerError> {
        match self.by_seller.entry(seller_id) {
            Entry::Occupied(_) => Err(LedgerError::WalletExists),
            Entry::Vacant(entry) => {
                let wallet_id = WalletId(self.next_wallet_id.fetch_add(1, Ordering::SeqCst));
                let wallet = Arc::new(Wallet::new(wallet_id, seller_id, currency));
                self.wallets.insert(wallet_id, Arc::clone(&wallet));
                entry.insert(wallet_id);
                Ok(wallet)
            }
        }
    }

    /// Retrieves a wallet by ID.
    pub fn wallet(&self, wallet_id: WalletId) -> Option<Arc<Wallet>> {
        self.wallets.get(&wallet_id).map(|w| Arc::clone(&w))
    }

    /// Retrieves a seller's wallet.
    pub fn wallet_for_seller(&self, seller_id: SellerId) -> Option<Arc<Wallet>> {
        let wallet_id = *self.by_seller.get(&seller_id)?;
        self.wallet(wallet_id)
    }

    /// Iterates over all wallets, for reports and snapshots.
    pub fn wallets(&self) -> impl Iterator<Item = Arc<Wallet>> + '_ {
        self.wallets.iter().map(|entry| Arc::clone(entry.value()))
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Credits a wallet.
    ///
    /// SALE credits land in the pending bucket until cleared, unless the
    /// context marks them settled; every other category credits available.
    pub fn credit(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        category: TransactionCategory,
        ctx: TxContext,
    ) -> Result<LedgerReceipt, LedgerError> {
        let to_pending = category == TransactionCategory::Sale && !ctx.settled;
        self.apply(wallet_id, amount, TransactionKind::Credit, category, ctx, |w| {
            w.credit(amount, to_pending)
        })
    }

    /// Debits a wallet.
    ///
    /// SETTLEMENT debits draw down the reservation made for that settlement
    /// and stamp the wallet's last-settlement fields; all other categories
    /// draw from available funds.
    pub fn debit(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        category: TransactionCategory,
        ctx: TxContext,
    ) -> Result<LedgerReceipt, LedgerError> {
        let now = Utc::now();
        self.apply(wallet_id, amount, TransactionKind::Debit, category, ctx, |w| {
            if category == TransactionCategory::Settlement {
                let after = w.debit_reserved(amount)?;
                w.record_settlement(amount, now);
                Ok(after)
            } else {
                w.debit_available(amount)
            }
        })
    }

    /// Moves funds from available to reserved, e.g. to back a settlement.
    pub fn reserve(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        ctx: TxContext,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(
            wallet_id,
            amount,
            TransactionKind::Reserve,
            TransactionCategory::Settlement,
            ctx,
            |w| w.reserve(amount),
        )
    }

    /// Returns reserved funds to available.
    ///
    /// Callers must release exactly what they reserved; the reserved bucket
    /// can never go negative.
    pub fn release_reserve(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        ctx: TxContext,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(
            wallet_id,
            amount,
            TransactionKind::Release,
            TransactionCategory::Settlement,
            ctx,
            |w| w.release_reserve(amount),
        )
    }

    /// Clears held sale proceeds from pending to available, used once the
    /// hold period on unsettled funds elapses.
    pub fn move_pending_to_available(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        ctx: TxContext,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.apply(
            wallet_id,
            amount,
            TransactionKind::MovePending,
            TransactionCategory::Sale,
            ctx,
            |w| w.move_pending_to_available(amount),
        )
    }

    /// Read-only balance view.
    pub fn balance_snapshot(&self, wallet_id: WalletId) -> Result<BalanceSnapshot, LedgerError> {
        self.wallet(wallet_id)
            .map(|w| w.snapshot())
            .ok_or(LedgerError::WalletNotFound)
    }

    /// Amount currently eligible for a new settlement.
    pub fn settlable_amount(&self, wallet_id: WalletId) -> Result<Decimal, LedgerError> {
        self.wallet(wallet_id)
            .map(|w| w.settlable_amount())
            .ok_or(LedgerError::WalletNotFound)
    }

    /// Ledger history for one wallet, oldest first.
    pub fn transactions(&self, wallet_id: WalletId) -> Vec<Arc<WalletTransaction>> {
        self.log.for_wallet(wallet_id)
    }

    /// Looks up a single ledger entry by its transaction ID.
    pub fn transaction(&self, transaction_id: &TransactionId) -> Option<Arc<WalletTransaction>> {
        self.log.get(transaction_id)
    }

    pub fn transaction_count(&self) -> usize {
        self.log.len()
    }

    /// Shared mutation path: claim the transaction ID, run the bucket
    /// mutation under the wallet lock, then append the ledger entry.
    ///
    /// A rejected mutation releases the ID claim so callers can retry with
    /// the same idempotency key.
    fn apply<F>(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        kind: TransactionKind,
        category: TransactionCategory,
        ctx: TxContext,
        mutate: F,
    ) -> Result<LedgerReceipt, LedgerError>
    where
        F: FnOnce(&Wallet) -> Result<Decimal, LedgerError>,
    {
        let wallet = self.wallet(wallet_id).ok_or(LedgerError::WalletNotFound)?;

        let transaction_id = ctx
            .transaction_id
            .clone()
            .unwrap_or_else(TransactionId::generate);
        self.log.claim(&transaction_id)?;

        let balance_after = match mutate(&wallet) {
            Ok(after) => after,
            Err(err) => {
                self.log.forget(&transaction_id);
                return Err(err);
            }
        };

        let transaction = self.log.record(WalletTransaction {
            transaction_id,
            wallet_id,
            kind,
            category,
            amount,
            balance_after,
            reference: ctx.reference,
            description: ctx.description,
            metadata: ctx.metadata,
            created_at: Utc::now(),
        });

        Ok(LedgerReceipt {
            snapshot: wallet.snapshot(),
            transaction,
        })
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}
