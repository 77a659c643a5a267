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

//! Settlement lifecycle.
//!
//! Settlements move strictly forward:
//!
//! ```text
//! Created ──► Reserved ──► Processing ──► Completed
//!    │            │             ├──► Failed     (reserve released)
//!    └────────────┴─────────────┴──► Cancelled  (reserve released)
//! ```
//!
//! Completed, Failed, and Cancelled are terminal. Re-delivering a trigger
//! whose terminal state already matches is a no-op, never a double debit or
//! double release.

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::base::{Currency, SellerAccountId, SellerId, SettlementId, WalletId, generate_key};
use crate::calculator::{SettlementCalculationResult, SettlementHistory};
use crate::engine::LedgerEngine;
use crate::error::LedgerError;
use crate::notify::SettlementNotifier;
use crate::transaction::{Reference, TransactionCategory, TxContext};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

/// Settlement lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Created,
    Reserved,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl SettlementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Completed | SettlementStatus::Failed | SettlementStatus::Cancelled
        )
    }
}

/// A settlement row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub id: SettlementId,
    /// Display key, format `STL_<base36 millis>_<6 base36 random>`.
    pub display_id: String,
    pub seller_id: SellerId,
    pub seller_account_id: SellerAccountId,
    pub wallet_id: WalletId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub gross_amount: Decimal,
    pub commission_amount: Decimal,
    pub platform_fee_amount: Decimal,
    pub tax_amount: Decimal,
    pub adjustment_amount: Decimal,
    pub net_amount: Decimal,
    pub currency: Currency,
    pub status: SettlementStatus,
    /// Provider-side payout reference, set when processing starts.
    pub payout_id: Option<String>,
    pub transfer_id: Option<String>,
    pub processed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub failure_code: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Owns settlement rows and drives their lifecycle, coordinating balance
/// effects with the [`LedgerEngine`].
///
/// Creation reserves the net amount before the row becomes visible: if the
/// wallet cannot cover it, no settlement is persisted. Completion debits the
/// reservation; failure and cancellation release it. Audit and notification
/// writes happen after the transition and never roll it back.
pub struct SettlementBook {
    engine: Arc<LedgerEngine>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn SettlementNotifier>,
    settlements: DashMap<SettlementId, Settlement>,
    /// Provider payout/transfer ID to settlement, for webhook lookup.
    by_provider: DashMap<String, SettlementId>,
    by_seller: DashMap<SellerId, Vec<SettlementId>>,
    next_id: AtomicU32,
}

impl SettlementBook {
    pub fn new(
        engine: Arc<LedgerEngine>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn SettlementNotifier>,
    ) -> Self {
        Self {
            engine,
            audit,
            notifier,
            settlements: DashMap::new(),
            by_provider: DashMap::new(),
            by_seller: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Persists a calculated settlement and reserves its net amount.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for a non-positive net amount.
    /// - [`LedgerError::WalletNotFound`] if the seller has no wallet.
    /// - [`LedgerError::CurrencyMismatch`] if the calculation currency does
    ///   not match the wallet currency.
    /// - [`LedgerError::InsufficientBalance`] if available funds cannot
    ///   cover the net amount; no settlement row is persisted in that case.
    pub fn create(&self, calc: &SettlementCalculationResult) -> Result<Settlement, LedgerError> {
        if calc.net_amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let wallet = self
            .engine
            .wallet_for_seller(calc.seller_id)
            .ok_or(LedgerError::WalletNotFound)?;
        if wallet.currency() != calc.currency {
            return Err(LedgerError::CurrencyMismatch);
        }

        let id = SettlementId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let settlement = Settlement {
            id,
            display_id: generate_key("STL"),
            seller_id: calc.seller_id,
            seller_account_id: calc.seller_account_id.clone(),
            wallet_id: wallet.wallet_id(),
            period_start: calc.period_start,
            period_end: calc.period_end,
            gross_amount: calc.gross_amount,
            commission_amount: calc.commission_amount,
            platform_fee_amount: calc.platform_fee_amount,
            tax_amount: calc.tax_amount,
            adjustment_amount: calc.adjustment_amount,
            net_amount: calc.net_amount,
            currency: calc.currency.clone(),
            status: SettlementStatus::Created,
            payout_id: None,
            transfer_id: None,
            processed_by: None,
            completed_at: None,
            failed_at: None,
            failure_reason: None,
            failure_code: None,
            gateway_response: None,
            created_at: Utc::now(),
        };
        self.settlements.insert(id, settlement);

        let ctx = TxContext {
            reference: Some(Reference::Settlement(id)),
            description: Some("settlement reservation".to_string()),
            ..TxContext::default()
        };
        if let Err(err) = self
            .engine
            .reserve(wallet.wallet_id(), calc.net_amount, ctx)
        {
            // Reservation failed: the settlement never becomes visible.
            self.settlements.remove(&id);
            warn!(seller = %calc.seller_id, error = %err, "settlement creation rejected");
            return Err(err);
        }

        let snapshot = {
            // Row was inserted by this call; the entry must still exist.
            let mut entry = self
                .settlements
                .get_mut(&id)
                .ok_or(LedgerError::SettlementNotFound)?;
            entry.status = SettlementStatus::Reserved;
            entry.clone()
        };
        self.by_seller.entry(calc.seller_id).or_default().push(id);

        self.audit.record(
            AuditEntry::new(&snapshot.display_id, AuditAction::SettlementCreated, "system")
                .with_states(None, serde_json::to_value(&snapshot.status).ok()),
        );
        info!(
            settlement = %snapshot.display_id,
            seller = %snapshot.seller_id,
            net = %snapshot.net_amount,
            "settlement created and reserved"
        );
        Ok(snapshot)
    }

    /// Marks a reserved settlement as processing with the external provider
    /// and indexes it by the provider's payout/transfer IDs.
    pub fn start_processing(
        &self,
        id: SettlementId,
        payout_id: Option<String>,
        transfer_id: Option<String>,
        processed_by: &str,
    ) -> Result<Settlement, LedgerError> {
        let snapshot = {
            let mut entry = self
                .settlements
                .get_mut(&id)
                .ok_or(LedgerError::SettlementNotFound)?;
            match entry.status {
                SettlementStatus::Reserved => {}
                // Benign re-trigger of an already-processing payout.
                SettlementStatus::Processing => return Ok(entry.clone()),
                from => {
                    return Err(LedgerError::InvalidStatusTransition {
                        from,
                        to: SettlementStatus::Processing,
                    });
                }
            }
            let before = entry.status;
            entry.status = SettlementStatus::Processing;
            entry.payout_id = payout_id.clone();
            entry.transfer_id = transfer_id.clone();
            entry.processed_by = Some(processed_by.to_string());
            let snapshot = entry.clone();
            drop(entry);
            self.record_transition(&snapshot, before, processed_by);
            snapshot
        };

        for provider_id in [payout_id, transfer_id].into_iter().flatten() {
            self.by_provider.insert(provider_id, id);
        }
        Ok(snapshot)
    }

    /// Completes a processing settlement: debits the reserved net amount and
    /// stamps the wallet's last-settlement fields.
    pub fn complete(
        &self,
        id: SettlementId,
        gateway_response: Option<serde_json::Value>,
    ) -> Result<Settlement, LedgerError> {
        let snapshot = {
            let mut entry = self
                .settlements
                .get_mut(&id)
                .ok_or(LedgerError::SettlementNotFound)?;
            match entry.status {
                SettlementStatus::Processing => {}
                // Idempotent re-delivery of the completion trigger.
                SettlementStatus::Completed => return Ok(entry.clone()),
                from => {
                    return Err(LedgerError::InvalidStatusTransition {
                        from,
                        to: SettlementStatus::Completed,
                    });
                }
            }

            let ctx = TxContext {
                reference: Some(Reference::Settlement(id)),
                description: Some("settlement payout".to_string()),
                ..TxContext::default()
            };
            self.engine.debit(
                entry.wallet_id,
                entry.net_amount,
                TransactionCategory::Settlement,
                ctx,
            )?;

            let before = entry.status;
            entry.status = SettlementStatus::Completed;
            entry.completed_at = Some(Utc::now());
            if gateway_response.is_some() {
                entry.gateway_response = gateway_response;
            }
            let snapshot = entry.clone();
            drop(entry);
            self.record_transition(&snapshot, before, "system");
            snapshot
        };

        self.notifier.settlement_completed(&snapshot);
        Ok(snapshot)
    }

    /// Fails a processing settlement and releases its reservation.
    pub fn fail(
        &self,
        id: SettlementId,
        reason: &str,
        code: &str,
    ) -> Result<Settlement, LedgerError> {
        let snapshot = {
            let mut entry = self
                .settlements
                .get_mut(&id)
                .ok_or(LedgerError::SettlementNotFound)?;
            match entry.status {
                SettlementStatus::Processing => {}
                // Idempotent re-delivery of the failure trigger.
                SettlementStatus::Failed => return Ok(entry.clone()),
                from => {
                    return Err(LedgerError::InvalidStatusTransition {
                        from,
                        to: SettlementStatus::Failed,
                    });
                }
            }

            let ctx = TxContext {
                reference: Some(Reference::Settlement(id)),
                description: Some("settlement payout failed".to_string()),
                ..TxContext::default()
            };
            self.engine
                .release_reserve(entry.wallet_id, entry.net_amount, ctx)?;

            let before = entry.status;
            entry.status = SettlementStatus::Failed;
            entry.failed_at = Some(Utc::now());
            entry.failure_reason = Some(reason.to_string());
            entry.failure_code = Some(code.to_string());
            let snapshot = entry.clone();
            drop(entry);
            self.record_transition(&snapshot, before, "system");
            snapshot
        };

        self.notifier.settlement_failed(&snapshot);
        Ok(snapshot)
    }

    /// Cancels a settlement, releasing any reservation.
    ///
    /// Allowed before processing starts, and from Processing when the
    /// provider cancels the payout (webhook-driven).
    pub fn cancel(&self, id: SettlementId) -> Result<Settlement, LedgerError> {
        let mut entry = self
            .settlements
            .get_mut(&id)
            .ok_or(LedgerError::SettlementNotFound)?;
        let had_reservation = match entry.status {
            SettlementStatus::Created => false,
            SettlementStatus::Reserved | SettlementStatus::Processing => true,
            // Idempotent re-delivery of the cancellation trigger.
            SettlementStatus::Cancelled => return Ok(entry.clone()),
            from => {
                return Err(LedgerError::InvalidStatusTransition {
                    from,
                    to: SettlementStatus::Cancelled,
                });
            }
        };

        if had_reservation {
            let ctx = TxContext {
                reference: Some(Reference::Settlement(id)),
                description: Some("settlement cancelled".to_string()),
                ..TxContext::default()
            };
            self.engine
                .release_reserve(entry.wallet_id, entry.net_amount, ctx)?;
        }

        let before = entry.status;
        entry.status = SettlementStatus::Cancelled;
        let snapshot = entry.clone();
        drop(entry);
        self.record_transition(&snapshot, before, "system");
        Ok(snapshot)
    }

    pub fn get(&self, id: SettlementId) -> Option<Settlement> {
        self.settlements.get(&id).map(|s| s.clone())
    }

    /// Looks up a settlement by the provider's payout or transfer ID.
    pub fn find_by_provider_id(&self, provider_id: &str) -> Option<Settlement> {
        let id = *self.by_provider.get(provider_id)?;
        self.get(id)
    }

    pub fn for_seller(&self, seller_id: SellerId) -> Vec<Settlement> {
        self.by_seller
            .get(&seller_id)
            .map(|ids| ids.iter().filter_map(|id| self.get(*id)).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.settlements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settlements.is_empty()
    }

    fn record_transition(&self, settlement: &Settlement, from: SettlementStatus, actor: &str) {
        self.audit.record(
            AuditEntry::new(&settlement.display_id, AuditAction::SettlementTransition, actor)
                .with_states(
                    serde_json::to_value(from).ok(),
                    serde_json::to_value(settlement.status).ok(),
                ),
        );
        info!(
            settlement = %settlement.display_id,
            from = ?from,
            to = ?settlement.status,
            "settlement transition"
        );
    }
}

impl SettlementHistory for SettlementBook {
    /// Counts live settlements (anything not cancelled or failed) whose
    /// period overlaps the given one.
    fn overlapping_settlements(
        &self,
        seller: SellerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> usize {
        self.for_seller(seller)
            .iter()
            .filter(|s| {
                !matches!(
                    s.status,
                    SettlementStatus::Cancelled | SettlementStatus::Failed
                )
            })
            .filter(|s| s.period_start < end && s.period_end > start)
            .count()
    }
}
