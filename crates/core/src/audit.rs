use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::ConversationKey;
use crate::domain::item::ItemKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// State-machine transitions.
    Negotiation,
    /// Stock movements.
    Ledger,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negotiation => "negotiation",
            Self::Ledger => "ledger",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// Refused by a business rule; nothing changed.
    Rejected,
    /// Infrastructure failure.
    Failed,
}

/// Who is acting in which conversation, for one player turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub conversation: Option<ConversationKey>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        conversation: Option<ConversationKey>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { conversation, correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    /// Dotted name, e.g. `ledger.transfer_committed`.
    pub name: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub conversation: Option<ConversationKey>,
    pub correlation_id: String,
    pub actor: String,
    pub details: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        name: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            name: name.into(),
            category,
            outcome,
            conversation: context.conversation.clone(),
            correlation_id: context.correlation_id.clone(),
            actor: context.actor.clone(),
            details: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Records which goods a ledger event is about.
    pub fn with_goods(self, item: &ItemKind, quantity: u32) -> Self {
        self.with_detail("item", item.as_str()).with_detail("quantity", quantity.to_string())
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Test sink. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    fn buffer(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.buffer().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.buffer().iter().map(|event| event.name.clone()).collect()
    }

    /// The most recent event with this name.
    pub fn last_named(&self, name: &str) -> Option<AuditEvent> {
        self.buffer().iter().rev().find(|event| event.name == name).cloned()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.buffer().push(event);
    }
}
