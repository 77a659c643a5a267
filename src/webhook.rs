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

//! Payout-provider webhook reconciliation.
//!
//! Maps provider events onto settlement transitions:
//!
//! | Event | Transition |
//! |-------|------------|
//! | `payout.processed`, `transfer.processed` | complete |
//! | `payout.failed` | fail (`PAYOUT_FAILED`) |
//! | `payout.reversed` | fail (`PAYOUT_REVERSED`) |
//! | `transfer.failed` | fail (`TRANSFER_FAILED`) |
//! | `transfer.reversed` | fail (`TRANSFER_REVERSED`) |
//! | `payout.cancelled`, `transfer.cancelled` | cancel |
//!
//! Processing never throws past the boundary: every outcome, including bad
//! signatures and malformed payloads, becomes a structured [`WebhookAck`]
//! so the provider always receives an acknowledgment and never enters a
//! retry storm. Transitions are idempotent per the settlement lifecycle.

use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::settlement::SettlementBook;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, warn};

/// Signature verification capability; the reconciler calls it, it does not
/// implement the signing scheme itself.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], signature: &str) -> bool;
}

/// HMAC-SHA256 verifier over the raw body, hex-encoded signature header.
pub struct HmacSha256Verifier {
    secret: Vec<u8>,
}

impl HmacSha256Verifier {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Computes the hex signature for a payload (provider side of the
    /// handshake; handy for tests and demos).
    pub fn sign(&self, payload: &[u8]) -> String {
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&self.secret) else {
            return String::new();
        };
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl SignatureVerifier for HmacSha256Verifier {
    fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}

/// Verifier that accepts everything. Demo and test use only.
pub struct NoVerification;

impl SignatureVerifier for NoVerification {
    fn verify(&self, _payload: &[u8], _signature: &str) -> bool {
        true
    }
}

/// Raw webhook envelope: `{"event": "...", "payload": {"payout": {"entity": {...}}}}`.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payout: Option<EntityEnvelope>,
    pub transfer: Option<EntityEnvelope>,
}

#[derive(Debug, Deserialize)]
pub struct EntityEnvelope {
    pub entity: ProviderEntity,
}

/// The provider's payout/transfer object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntity {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Unix seconds.
    #[serde(default)]
    pub processed_at: Option<i64>,
    #[serde(default)]
    pub utr: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl ProviderEntity {
    pub fn processed_at_utc(&self) -> Option<DateTime<Utc>> {
        self.processed_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Structured acknowledgment returned for every webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookAck {
    pub fn ok(settlement: &str) -> Self {
        Self {
            status: "ok".to_string(),
            message: Some(settlement.to_string()),
        }
    }

    pub fn ignored(event: &str) -> Self {
        Self {
            status: "ignored".to_string(),
            message: Some(format!("unhandled event {}", event)),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: "settlement_not_found".to_string(),
            message: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.to_string()),
        }
    }
}

enum PayoutAction {
    Complete,
    Fail(&'static str),
    Cancel,
}

/// Consumes provider webhook deliveries and applies the mapped settlement
/// transition, idempotently.
pub struct WebhookReconciler {
    book: Arc<SettlementBook>,
    verifier: Arc<dyn SignatureVerifier>,
    audit: Arc<dyn AuditSink>,
}

impl WebhookReconciler {
    pub fn new(
        book: Arc<SettlementBook>,
        verifier: Arc<dyn SignatureVerifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            book,
            verifier,
            audit,
        }
    }

    /// Processes one webhook delivery. Always returns an acknowledgment;
    /// failures are recorded internally instead of propagating.
    pub fn process(&self, body: &[u8], signature: &str) -> WebhookAck {
        if !self.verifier.verify(body, signature) {
            warn!("webhook rejected: signature verification failed");
            return WebhookAck::error("signature verification failed");
        }

        let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "webhook rejected: malformed payload");
                return WebhookAck::error(&format!("malformed payload: {}", err));
            }
        };

        let entity = match envelope
            .payload
            .payout
            .or(envelope.payload.transfer)
            .map(|wrapper| wrapper.entity)
        {
            Some(entity) => entity,
            None => {
                warn!(event = %envelope.event, "webhook rejected: missing entity");
                return WebhookAck::error("missing payout or transfer entity");
            }
        };

        let action = match envelope.event.as_str() {
            "payout.processed" | "transfer.processed" => PayoutAction::Complete,
            "payout.failed" => PayoutAction::Fail("PAYOUT_FAILED"),
            "payout.reversed" => PayoutAction::Fail("PAYOUT_REVERSED"),
            "transfer.failed" => PayoutAction::Fail("TRANSFER_FAILED"),
            "transfer.reversed" => PayoutAction::Fail("TRANSFER_REVERSED"),
            "payout.cancelled" | "transfer.cancelled" => PayoutAction::Cancel,
            other => {
                debug!(event = other, "webhook event ignored");
                return WebhookAck::ignored(other);
            }
        };

        let settlement = match self.book.find_by_provider_id(&entity.id) {
            Some(settlement) => settlement,
            None => {
                warn!(provider_id = %entity.id, "webhook for unknown settlement");
                return WebhookAck::not_found();
            }
        };
        let before = settlement.status;

        let result = match action {
            PayoutAction::Complete => self
                .book
                .complete(settlement.id, serde_json::to_value(&entity).ok()),
            PayoutAction::Fail(code) => {
                let reason = entity
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "payout failed".to_string());
                self.book.fail(settlement.id, &reason, code)
            }
            PayoutAction::Cancel => self.book.cancel(settlement.id),
        };

        match result {
            Ok(updated) => {
                self.audit.record(
                    AuditEntry::new(&updated.display_id, AuditAction::WebhookReceived, "webhook")
                        .with_states(
                            serde_json::to_value(before).ok(),
                            serde_json::to_value(updated.status).ok(),
                        )
                        .with_metadata(serde_json::json!({
                            "event": envelope.event,
                            "entity": entity,
                        })),
                );
                WebhookAck::ok(&updated.display_id)
            }
            Err(err) => {
                warn!(
                    settlement = %settlement.display_id,
                    event = %envelope.event,
                    error = %err,
                    "webhook transition rejected"
                );
                WebhookAck::error(&err.to_string())
            }
        }
    }
}
