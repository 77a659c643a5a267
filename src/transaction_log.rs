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

//! Thread-safe, append-only transaction log with ID deduplication.
//!
//! Transaction IDs are claimed before the balance mutation runs and the
//! finished entry is recorded after it, so an ID can never be applied twice
//! even when two callers race with the same idempotency key.

use crate::base::{TransactionId, WalletId};
use crate::error::LedgerError;
use crate::transaction::WalletTransaction;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Append-only ledger log with O(1) duplicate detection.
///
/// Combines a [`DashMap`] of claimed IDs with a [`SegQueue`] preserving
/// global insertion order and a per-wallet index for history reads.
#[derive(Debug, Default)]
pub struct TransactionLog {
    /// Claimed transaction IDs for duplicate detection.
    claimed: DashMap<TransactionId, ()>,

    /// Finalized entries indexed by transaction ID.
    entries: DashMap<TransactionId, Arc<WalletTransaction>>,

    /// Per-wallet history in append order.
    by_wallet: DashMap<WalletId, Vec<Arc<WalletTransaction>>>,

    /// Global FIFO order of transaction IDs.
    order: SegQueue<TransactionId>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a transaction ID ahead of the balance mutation.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateTransaction`] if the ID was already
    /// claimed or recorded.
    pub fn claim(&self, transaction_id: &TransactionId) -> Result<(), LedgerError> {
        // Entry API gives an atomic check-and-insert to prevent races
        match self.claimed.entry(transaction_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateTransaction),
            Entry::Vacant(entry) => {
                entry.insert(());
                Ok(())
            }
        }
    }

    /// Releases a claimed ID after the mutation was rejected, so the caller
    /// may retry with the same idempotency key.
    pub fn forget(&self, transaction_id: &TransactionId) {
        self.claimed.remove(transaction_id);
    }

    /// Records the finished entry for a previously claimed ID.
    pub fn record(&self, transaction: WalletTransaction) -> Arc<WalletTransaction> {
        let transaction = Arc::new(transaction);
        self.entries
            .insert(transaction.transaction_id.clone(), Arc::clone(&transaction));
        self.by_wallet
            .entry(transaction.wallet_id)
            .or_default()
            .push(Arc::clone(&transaction));
        self.order.push(transaction.transaction_id.clone());
        transaction
    }

    pub fn get(&self, transaction_id: &TransactionId) -> Option<Arc<WalletTransaction>> {
        self.entries.get(transaction_id).map(|e| Arc::clone(&e))
    }

    /// History for one wallet, oldest first.
    pub fn for_wallet(&self, wallet_id: WalletId) -> Vec<Arc<WalletTransaction>> {
        self.by_wallet
            .get(&wallet_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of finalized entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransactionCategory, TransactionKind};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn entry(id: &str, wallet: u32) -> WalletTransaction {
        WalletTransaction {
            transaction_id: TransactionId(id.to_string()),
            wallet_id: WalletId(wallet),
            kind: TransactionKind::Credit,
            category: TransactionCategory::Sale,
            amount: dec!(10.00),
            balance_after: dec!(10.00),
            reference: None,
            description: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn claim_rejects_duplicates() {
        let log = TransactionLog::new();
        let id = TransactionId("TXN_A".to_string());
        log.claim(&id).unwrap();
        assert_eq!(log.claim(&id), Err(LedgerError::DuplicateTransaction));
    }

    #[test]
    fn forget_allows_reclaim() {
        let log = TransactionLog::new();
        let id = TransactionId("TXN_A".to_string());
        log.claim(&id).unwrap();
        log.forget(&id);
        assert!(log.claim(&id).is_ok());
    }

    #[test]
    fn record_indexes_by_wallet() {
        let log = TransactionLog::new();
        let a = entry("TXN_A", 1);
        let b = entry("TXN_B", 1);
        let c = entry("TXN_C", 2);
        for tx in [&a, &b, &c] {
            log.claim(&tx.transaction_id).unwrap();
        }
        log.record(a);
        log.record(b);
        log.record(c);

        let history = log.for_wallet(WalletId(1));
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].transaction_id.0, "TXN_A");
        assert_eq!(history[1].transaction_id.0, "TXN_B");
        assert_eq!(log.for_wallet(WalletId(2)).len(), 1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn get_returns_recorded_entry() {
        let log = TransactionLog::new();
        let tx = entry("TXN_A", 1);
        log.claim(&tx.transaction_id).unwrap();
        log.record(tx);

        let found = log.get(&TransactionId("TXN_A".to_string())).unwrap();
        assert_eq!(found.amount, dec!(10.00));
        assert!(log.get(&TransactionId("TXN_MISSING".to_string())).is_none());
    }
}
