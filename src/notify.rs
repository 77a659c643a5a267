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

//! Best-effort settlement notifications.
//!
//! Notification failures are logged and never propagate into the settlement
//! transition that triggered them.

use crate::settlement::Settlement;
use tracing::{info, warn};

/// Notification collaborator for settlement outcomes.
pub trait SettlementNotifier: Send + Sync {
    fn settlement_completed(&self, settlement: &Settlement);
    fn settlement_failed(&self, settlement: &Settlement);
}

/// Notifier that emits structured log lines.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl SettlementNotifier for TracingNotifier {
    fn settlement_completed(&self, settlement: &Settlement) {
        info!(
            settlement = %settlement.display_id,
            seller = %settlement.seller_id,
            net = %settlement.net_amount,
            "settlement completed"
        );
    }

    fn settlement_failed(&self, settlement: &Settlement) {
        warn!(
            settlement = %settlement.display_id,
            seller = %settlement.seller_id,
            code = settlement.failure_code.as_deref().unwrap_or("UNKNOWN"),
            "settlement failed"
        );
    }
}

/// Notifier that drops everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl SettlementNotifier for NullNotifier {
    fn settlement_completed(&self, _settlement: &Settlement) {}

    fn settlement_failed(&self, _settlement: &Settlement) {}
}
