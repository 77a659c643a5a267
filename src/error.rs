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

//! Error types for ledger and settlement processing.

use crate::settlement::SettlementStatus;
use thiserror::Error;

/// Ledger and settlement processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Available balance cannot cover the requested debit or reserve
    #[error("insufficient available balance")]
    InsufficientBalance,

    /// Reserved balance cannot cover the requested release or debit
    #[error("insufficient reserved balance")]
    InsufficientReserve,

    /// Pending balance cannot cover the requested clearance
    #[error("insufficient pending balance")]
    InsufficientPending,

    /// No wallet exists for the given ID
    #[error("wallet not found")]
    WalletNotFound,

    /// The seller already has a wallet (one wallet per seller)
    #[error("seller already has a wallet")]
    WalletExists,

    /// No payout account is registered for the seller
    #[error("seller account not found")]
    SellerAccountNotFound,

    /// No settlement exists for the given ID
    #[error("settlement not found")]
    SettlementNotFound,

    /// Requested settlement transition is not allowed from the current state
    #[error("invalid settlement transition from {from:?} to {to:?}")]
    InvalidStatusTransition {
        from: SettlementStatus,
        to: SettlementStatus,
    },

    /// Operation currency does not match the wallet currency
    #[error("currency mismatch")]
    CurrencyMismatch,

    /// Duplicate transaction ID (idempotency key already used)
    #[error("duplicate transaction ID")]
    DuplicateTransaction,

    /// Webhook signature did not verify against the signing secret
    #[error("webhook signature verification failed")]
    SignatureVerificationFailed,
}
