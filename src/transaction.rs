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

//! Ledger entry types.
//!
//! Every wallet mutation appends exactly one [`WalletTransaction`]; entries
//! are immutable once recorded.

use crate::base::{OrderId, SettlementId, TransactionId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The balance movement a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Funds added to available (or pending, for unsettled sales).
    Credit,
    /// Funds removed from available (or reserved, for settlements).
    Debit,
    /// Funds moved from available to reserved.
    Reserve,
    /// Funds moved from reserved back to available.
    Release,
    /// Funds cleared from pending to available.
    MovePending,
}

/// Business category tag carried on every ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionCategory {
    Sale,
    Refund,
    Adjustment,
    Settlement,
    Fee,
    Manual,
}

/// Typed link from a ledger entry to the record that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Reference {
    Order(OrderId),
    Settlement(SettlementId),
    /// Provider-side payout or transfer ID.
    Payout(String),
    Manual(String),
}

/// Caller-supplied context for a ledger mutation.
///
/// `transaction_id` doubles as the idempotency key: supplying an already-used
/// ID is rejected before any balance change. When absent, one is generated.
#[derive(Debug, Clone, Default)]
pub struct TxContext {
    pub transaction_id: Option<TransactionId>,
    pub reference: Option<Reference>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// Marks a SALE credit as already settled, landing it in the available
    /// bucket instead of pending.
    pub settled: bool,
}

impl TxContext {
    pub fn with_reference(reference: Reference) -> Self {
        Self {
            reference: Some(reference),
            ..Self::default()
        }
    }

    pub fn described(description: &str) -> Self {
        Self {
            description: Some(description.to_string()),
            ..Self::default()
        }
    }
}

/// An immutable, append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletTransaction {
    pub transaction_id: TransactionId,
    pub wallet_id: WalletId,
    pub kind: TransactionKind,
    pub category: TransactionCategory,
    pub amount: Decimal,
    /// Value of the affected (destination) bucket after the mutation.
    pub balance_after: Decimal,
    pub reference: Option<Reference>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_serializes_tagged() {
        let json = serde_json::to_value(Reference::Settlement(SettlementId(7))).unwrap();
        assert_eq!(json["type"], "settlement");
        assert_eq!(json["id"], 7);

        let json = serde_json::to_value(Reference::Payout("pout_123".to_string())).unwrap();
        assert_eq!(json["type"], "payout");
        assert_eq!(json["id"], "pout_123");
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_value(TransactionKind::MovePending).unwrap();
        assert_eq!(json, "MOVE_PENDING");
    }
}
