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

//! Immutable audit log for state-changing actions.
//!
//! Audit writes are fire-and-forget: [`AuditSink::record`] is infallible
//! from the caller's perspective and must never block or roll back the
//! mutation it describes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Kind of action an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SettlementCreated,
    SettlementTransition,
    WebhookReceived,
    LedgerMutation,
}

/// One immutable audit record with before/after images.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub entity_id: String,
    pub action: AuditAction,
    pub actor: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(entity_id: &str, action: AuditAction, actor: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            action,
            actor: actor.to_string(),
            before: None,
            after: None,
            metadata: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_states(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Audit log collaborator. Implementations swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Append-only in-memory audit log, queryable in tests and demos.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn for_entity(&self, entity_id: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }
}

/// Sink that only emits a structured log line.
#[derive(Debug, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, entry: AuditEntry) {
        debug!(
            entity = %entry.entity_id,
            action = ?entry.action,
            actor = %entry.actor,
            "audit"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_log_appends_and_filters() {
        let log = InMemoryAuditLog::new();
        log.record(AuditEntry::new("STL_1", AuditAction::SettlementCreated, "system"));
        log.record(
            AuditEntry::new("STL_1", AuditAction::SettlementTransition, "webhook")
                .with_states(Some(serde_json::json!("CREATED")), Some(serde_json::json!("RESERVED"))),
        );
        log.record(AuditEntry::new("STL_2", AuditAction::SettlementCreated, "system"));

        assert_eq!(log.len(), 3);
        let for_one = log.for_entity("STL_1");
        assert_eq!(for_one.len(), 2);
        assert_eq!(for_one[1].before, Some(serde_json::json!("CREATED")));
    }
}
