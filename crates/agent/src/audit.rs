use tracing::{info, warn};

use parley_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Forwards negotiation and ledger audit events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let (player_id, npc_id) = event
            .conversation
            .as_ref()
            .map(|key| (key.player.as_str(), key.npc.as_str()))
            .unwrap_or_default();
        let details = serde_json::to_string(&event.details).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success | AuditOutcome::Rejected => info!(
                event_name = %event.name,
                correlation_id = %event.correlation_id,
                category = event.category.as_str(),
                player_id,
                npc_id,
                actor = %event.actor,
                outcome = ?event.outcome,
                details = %details,
                "audit event"
            ),
            AuditOutcome::Failed => warn!(
                event_name = %event.name,
                correlation_id = %event.correlation_id,
                category = event.category.as_str(),
                player_id,
                npc_id,
                actor = %event.actor,
                details = %details,
                "audit event"
            ),
        }
    }
}
