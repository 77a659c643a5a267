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

//! Seller wallet with three balance buckets.
//!
//! ```text
//! credit (sale) ──► pending ──clearance──► available ──reserve──► reserved
//!                                              ▲                     │
//!                                              └──────release────────┘
//! ```
//!
//! The total balance is always derived as `available + pending + reserved`;
//! it is never stored independently of its components.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use wallet_ledger_rs::{Currency, SellerId, Wallet, WalletId};
//!
//! let wallet = Wallet::new(WalletId(1), SellerId(1), Currency::inr());
//! assert_eq!(wallet.total(), dec!(0.00));
//! ```

use crate::base::{Currency, SellerId, WalletId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashMap;

/// Read-only view of a wallet's balances.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BalanceSnapshot {
    pub wallet_id: WalletId,
    pub seller_id: SellerId,
    pub currency: Currency,
    pub available: Decimal,
    pub pending: Decimal,
    pub reserved: Decimal,
    pub total: Decimal,
}

#[derive(Debug)]
struct WalletData {
    wallet_id: WalletId,
    seller_id: SellerId,
    currency: Currency,
    available: Decimal,
    pending: Decimal,
    reserved: Decimal,
    last_settlement_at: Option<DateTime<Utc>>,
    last_settlement_amount: Option<Decimal>,
    metadata: HashMap<String, String>,
}

impl WalletData {
    fn new(wallet_id: WalletId, seller_id: SellerId, currency: Currency) -> Self {
        Self {
            wallet_id,
            seller_id,
            currency,
            available: Decimal::ZERO,
            pending: Decimal::ZERO,
            reserved: Decimal::ZERO,
            last_settlement_at: None,
            last_settlement_amount: None,
            metadata: HashMap::new(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.available >= Decimal::ZERO,
            "Invariant violated: available balance went negative: {}",
            self.available
        );
        debug_assert!(
            self.pending >= Decimal::ZERO,
            "Invariant violated: pending balance went negative: {}",
            self.pending
        );
        debug_assert!(
            self.reserved >= Decimal::ZERO,
            "Invariant violated: reserved balance went negative: {}",
            self.reserved
        );
    }

    /// Increases available or pending balance.
    fn credit(&mut self, amount: Decimal, to_pending: bool) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let after = if to_pending {
            self.pending += amount;
            self.pending
        } else {
            self.available += amount;
            self.available
        };
        self.assert_invariants();
        Ok(after)
    }

    /// Decreases available balance.
    fn debit_available(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.available < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.available -= amount;
        self.assert_invariants();
        Ok(self.available)
    }

    /// Decreases reserved balance (settlement completion draws down the
    /// reservation, not available funds).
    fn debit_reserved(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.reserved < amount {
            return Err(LedgerError::InsufficientReserve);
        }
        self.reserved -= amount;
        self.assert_invariants();
        Ok(self.reserved)
    }

    /// Moves funds from available to reserved.
    fn reserve(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.available < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.available -= amount;
        self.reserved += amount;
        self.assert_invariants();
        Ok(self.reserved)
    }

    /// Moves funds from reserved back to available.
    fn release_reserve(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.reserved < amount {
            return Err(LedgerError::InsufficientReserve);
        }
        self.reserved -= amount;
        self.available += amount;
        self.assert_invariants();
        Ok(self.available)
    }

    /// Clears held funds from pending to available.
    fn move_pending(&mut self, amount: Decimal) -> Result<Decimal, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.pending < amount {
            return Err(LedgerError::InsufficientPending);
        }
        self.pending -= amount;
        self.available += amount;
        self.assert_invariants();
        Ok(self.available)
    }
}

/// A seller wallet.
///
/// All mutations go through the wallet's own lock, so concurrent operations
/// on the same wallet are serialized: two reserves racing for the same funds
/// cannot both succeed.
#[derive(Debug)]
pub struct Wallet {
    inner: Mutex<WalletData>,
}

impl Wallet {
    const DECIMAL_PRECISION: u32 = 2;

    pub fn new(wallet_id: WalletId, seller_id: SellerId, currency: Currency) -> Self {
        Self {
            inner: Mutex::new(WalletData::new(wallet_id, seller_id, currency)),
        }
    }

    pub fn wallet_id(&self) -> WalletId {
        self.inner.lock().wallet_id
    }

    pub fn seller_id(&self) -> SellerId {
        self.inner.lock().seller_id
    }

    pub fn currency(&self) -> Currency {
        self.inner.lock().currency.clone()
    }

    pub fn available(&self) -> Decimal {
        self.inner.lock().available
    }

    pub fn pending(&self) -> Decimal {
        self.inner.lock().pending
    }

    pub fn reserved(&self) -> Decimal {
        self.inner.lock().reserved
    }

    /// Returns `available + pending + reserved`.
    pub fn total(&self) -> Decimal {
        let data = self.inner.lock();
        data.available + data.pending + data.reserved
    }

    /// Amount eligible for a new settlement (the available bucket).
    pub fn settlable_amount(&self) -> Decimal {
        self.inner.lock().available
    }

    pub fn last_settlement(&self) -> Option<(DateTime<Utc>, Decimal)> {
        let data = self.inner.lock();
        match (data.last_settlement_at, data.last_settlement_amount) {
            (Some(at), Some(amount)) => Some((at, amount)),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        let data = self.inner.lock();
        BalanceSnapshot {
            wallet_id: data.wallet_id,
            seller_id: data.seller_id,
            currency: data.currency.clone(),
            available: data.available,
            pending: data.pending,
            reserved: data.reserved,
            total: data.available + data.pending + data.reserved,
        }
    }

    pub fn metadata(&self, key: &str) -> Option<String> {
        self.inner.lock().metadata.get(key).cloned()
    }

    pub fn set_metadata(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .metadata
            .insert(key.to_string(), value.to_string());
    }

    pub fn credit(&self, amount: Decimal, to_pending: bool) -> Result<Decimal, LedgerError> {
        self.inner.lock().credit(amount, to_pending)
    }

    pub fn debit_available(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.inner.lock().debit_available(amount)
    }

    pub fn debit_reserved(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.inner.lock().debit_reserved(amount)
    }

    pub fn reserve(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.inner.lock().reserve(amount)
    }

    pub fn release_reserve(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.inner.lock().release_reserve(amount)
    }

    pub fn move_pending_to_available(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        self.inner.lock().move_pending(amount)
    }

    /// Stamps the wallet after a completed settlement debit.
    pub fn record_settlement(&self, amount: Decimal, at: DateTime<Utc>) {
        let mut data = self.inner.lock();
        data.last_settlement_at = Some(at);
        data.last_settlement_amount = Some(amount);
    }
}

impl Serialize for Wallet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Wallet", 7)?;
        state.serialize_field("seller", &data.seller_id)?;
        state.serialize_field("currency", &data.currency)?;
        state.serialize_field(
            "available",
            &data.available.round_dp(Wallet::DECIMAL_PRECISION),
        )?;
        state.serialize_field("pending", &data.pending.round_dp(Wallet::DECIMAL_PRECISION))?;
        state.serialize_field(
            "reserved",
            &data.reserved.round_dp(Wallet::DECIMAL_PRECISION),
        )?;
        state.serialize_field(
            "total",
            &(data.available + data.pending + data.reserved).round_dp(Wallet::DECIMAL_PRECISION),
        )?;
        state.serialize_field(
            "last_settlement_amount",
            &data
                .last_settlement_amount
                .map(|a| a.round_dp(Wallet::DECIMAL_PRECISION)),
        )?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    // === WalletData Internal Tests ===
    // These test the private WalletData methods directly.

    fn data() -> WalletData {
        WalletData::new(WalletId(1), SellerId(1), Currency::inr())
    }

    #[test]
    fn credit_to_available() {
        let mut d = data();
        let after = d.credit(dec!(100.00), false).unwrap();
        assert_eq!(after, dec!(100.00));
        assert_eq!(d.available, dec!(100.00));
        assert_eq!(d.pending, Decimal::ZERO);
    }

    #[test]
    fn credit_to_pending() {
        let mut d = data();
        let after = d.credit(dec!(100.00), true).unwrap();
        assert_eq!(after, dec!(100.00));
        assert_eq!(d.pending, dec!(100.00));
        assert_eq!(d.available, Decimal::ZERO);
    }

    #[test]
    fn credit_rejects_non_positive() {
        let mut d = data();
        assert_eq!(d.credit(Decimal::ZERO, false), Err(LedgerError::InvalidAmount));
        assert_eq!(
            d.credit(dec!(-1.00), false),
            Err(LedgerError::InvalidAmount)
        );
    }

    #[test]
    fn reserve_moves_available_to_reserved() {
        let mut d = data();
        d.credit(dec!(100.00), false).unwrap();
        d.reserve(dec!(30.00)).unwrap();
        assert_eq!(d.available, dec!(70.00));
        assert_eq!(d.reserved, dec!(30.00));
    }

    #[test]
    fn release_moves_reserved_to_available() {
        let mut d = data();
        d.credit(dec!(100.00), false).unwrap();
        d.reserve(dec!(30.00)).unwrap();
        d.release_reserve(dec!(30.00)).unwrap();
        assert_eq!(d.available, dec!(100.00));
        assert_eq!(d.reserved, Decimal::ZERO);
    }

    #[test]
    fn move_pending_clears_to_available() {
        let mut d = data();
        d.credit(dec!(50.00), true).unwrap();
        d.move_pending(dec!(20.00)).unwrap();
        assert_eq!(d.pending, dec!(30.00));
        assert_eq!(d.available, dec!(20.00));
    }

    #[test]
    fn reserve_insufficient_returns_error() {
        let mut d = data();
        d.credit(dec!(50.00), false).unwrap();
        assert_eq!(d.reserve(dec!(100.00)), Err(LedgerError::InsufficientBalance));
    }

    #[test]
    fn release_insufficient_returns_error() {
        let mut d = data();
        d.credit(dec!(100.00), false).unwrap();
        d.reserve(dec!(30.00)).unwrap();
        assert_eq!(
            d.release_reserve(dec!(50.00)),
            Err(LedgerError::InsufficientReserve)
        );
    }

    #[test]
    fn move_pending_insufficient_returns_error() {
        let mut d = data();
        d.credit(dec!(10.00), true).unwrap();
        assert_eq!(
            d.move_pending(dec!(50.00)),
            Err(LedgerError::InsufficientPending)
        );
    }

    #[test]
    fn debit_reserved_only_touches_reservation() {
        let mut d = data();
        d.credit(dec!(100.00), false).unwrap();
        d.reserve(dec!(60.00)).unwrap();
        d.debit_reserved(dec!(60.00)).unwrap();
        assert_eq!(d.available, dec!(40.00));
        assert_eq!(d.reserved, Decimal::ZERO);
    }

    #[test]
    fn debit_reserved_insufficient_returns_error() {
        let mut d = data();
        d.credit(dec!(100.00), false).unwrap();
        d.reserve(dec!(10.00)).unwrap();
        assert_eq!(
            d.debit_reserved(dec!(20.00)),
            Err(LedgerError::InsufficientReserve)
        );
    }

    // === Serialization Tests ===

    #[test]
    fn serializer_rounds_to_two_decimal_places() {
        let wallet = Wallet::new(WalletId(1), SellerId(42), Currency::inr());

        {
            let mut data = wallet.inner.lock();
            data.available = dec!(123.456);
            data.pending = dec!(0.004);
            data.reserved = dec!(10.105);
        }

        let json = serde_json::to_string(&wallet).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["seller"], 42);
        assert_eq!(parsed["currency"], "INR");
        assert_eq!(parsed["available"].as_str().unwrap(), "123.46");
        assert_eq!(parsed["pending"].as_str().unwrap(), "0.00");
        // Decimal's default rounding is banker's, so 10.105 lands on 10.10.
        assert_eq!(parsed["reserved"].as_str().unwrap(), "10.10");
    }

    #[test]
    fn serializer_total_is_sum_of_buckets() {
        let wallet = Wallet::new(WalletId(1), SellerId(1), Currency::inr());

        {
            let mut data = wallet.inner.lock();
            data.available = dec!(100.25);
            data.pending = dec!(50.50);
            data.reserved = dec!(25.25);
        }

        let json = serde_json::to_string(&wallet).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["total"].as_str().unwrap(), "176.00");
    }

    #[test]
    fn snapshot_matches_accessors() {
        let wallet = Wallet::new(WalletId(3), SellerId(9), Currency::new("usd"));
        wallet.credit(dec!(80.00), false).unwrap();
        wallet.credit(dec!(20.00), true).unwrap();
        wallet.reserve(dec!(30.00)).unwrap();

        let snap = wallet.snapshot();
        assert_eq!(snap.available, dec!(50.00));
        assert_eq!(snap.pending, dec!(20.00));
        assert_eq!(snap.reserved, dec!(30.00));
        assert_eq!(snap.total, dec!(100.00));
        assert_eq!(snap.currency, Currency::new("USD"));
        assert_eq!(snap.total, snap.available + snap.pending + snap.reserved);
    }

    #[test]
    fn record_settlement_stamps_wallet() {
        let wallet = Wallet::new(WalletId(1), SellerId(1), Currency::inr());
        assert!(wallet.last_settlement().is_none());

        let at = Utc::now();
        wallet.record_settlement(dec!(500.00), at);
        let (stamped_at, amount) = wallet.last_settlement().unwrap();
        assert_eq!(stamped_at, at);
        assert_eq!(amount, dec!(500.00));
    }
}
