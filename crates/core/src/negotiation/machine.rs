use std::sync::Arc;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::trade::TradeIntent;
use crate::errors::{ApplicationError, DomainError};
use crate::ledger::InventoryLedger;
use crate::negotiation::engine::NegotiationEngine;
use crate::negotiation::states::{
    Negotiation, NegotiationAction, NegotiationEmit, NegotiationEvent, TransitionOutcome,
};
use crate::negotiation::NegotiationStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advance {
    pub outcome: TransitionOutcome,
    /// The record as persisted after this step.
    pub record: Negotiation,
    pub emits: Vec<NegotiationEmit>,
}

/// Drives the pure transition table against the ledger and the negotiation store.
///
/// The resolved record is saved before any transfer runs. If the ledger then
/// fails for a reason other than a domain refusal, the previous record is put
/// back so the turn can be retried; a crash between save and transfer can drop
/// a trade but never execute one twice.
pub struct NegotiationMachine {
    engine: NegotiationEngine,
    ledger: Arc<dyn InventoryLedger>,
    store: Arc<dyn NegotiationStore>,
    audit: Arc<dyn AuditSink>,
}

impl NegotiationMachine {
    pub fn new(
        engine: NegotiationEngine,
        ledger: Arc<dyn InventoryLedger>,
        store: Arc<dyn NegotiationStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { engine, ledger, store, audit }
    }

    pub fn engine(&self) -> &NegotiationEngine {
        &self.engine
    }

    pub async fn advance(
        &self,
        record: &Negotiation,
        event: NegotiationEvent,
        context: &AuditContext,
    ) -> Result<Advance, ApplicationError> {
        let outcome = self
            .engine
            .apply_with_audit(record, &event, self.audit.as_ref(), context)
            .map_err(DomainError::from)?;

        if outcome.next != *record {
            self.store.save(&outcome.next).await?;
        }

        let mut emits = Vec::with_capacity(outcome.actions.len());
        for action in &outcome.actions {
            let emit = match action {
                NegotiationAction::ContinueConversation
                | NegotiationAction::SupersedePending(_) => continue,
                NegotiationAction::RequestConfirmation(intent) => {
                    NegotiationEmit::ConfirmationRequested(intent.clone())
                }
                NegotiationAction::RequestQuantity(intent) => {
                    NegotiationEmit::QuantityRequested(intent.clone())
                }
                NegotiationAction::RequestClarification(intent) => {
                    NegotiationEmit::ClarificationRequested(intent.clone())
                }
                NegotiationAction::CancelTrade(intent) => {
                    NegotiationEmit::TradeCancelled(intent.clone())
                }
                NegotiationAction::AbandonTrade(intent) => {
                    NegotiationEmit::NegotiationAbandoned(intent.clone())
                }
                NegotiationAction::ExecuteTransfer(intent) => {
                    self.execute(record, intent, context).await?
                }
            };
            emits.push(emit);
        }

        Ok(Advance { record: outcome.next.clone(), outcome, emits })
    }

    async fn execute(
        &self,
        previous: &Negotiation,
        intent: &TradeIntent,
        context: &AuditContext,
    ) -> Result<NegotiationEmit, ApplicationError> {
        let Some(order) = intent.into_order(&previous.key) else {
            return Err(DomainError::InvalidTransfer(previous.key.to_string()).into());
        };

        match self.ledger.transfer(&order).await {
            Ok(receipt) => {
                self.audit.emit(
                    AuditEvent::new(
                        context,
                        "ledger.transfer_committed",
                        AuditCategory::Ledger,
                        AuditOutcome::Success,
                    )
                    .with_goods(&receipt.order.item, receipt.order.quantity)
                    .with_detail("total", receipt.total.to_string()),
                );
                Ok(NegotiationEmit::TradeExecuted(receipt))
            }
            Err(ApplicationError::Domain(reason)) => {
                self.audit.emit(
                    AuditEvent::new(
                        context,
                        "ledger.transfer_refused",
                        AuditCategory::Ledger,
                        AuditOutcome::Rejected,
                    )
                    .with_goods(&order.item, order.quantity)
                    .with_detail("reason", reason.to_string()),
                );
                Ok(NegotiationEmit::TradeRefused { intent: intent.clone(), reason })
            }
            Err(error) => {
                let mut failed = AuditEvent::new(
                    context,
                    "ledger.transfer_failed",
                    AuditCategory::Ledger,
                    AuditOutcome::Failed,
                )
                .with_detail("error", error.to_string());
                if let Err(restore) = self.store.save(previous).await {
                    failed = failed.with_detail("restore_error", restore.to_string());
                }
                self.audit.emit(failed);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::entity::{ConversationKey, EntityId};
    use crate::domain::item::{CatalogEntry, Holding, ItemKind};
    use crate::domain::trade::{
        ConsentJudgment, TradeDirection, TradeIntent, TransferOrder, TransferReceipt,
    };
    use crate::errors::{ApplicationError, DomainError};
    use crate::ledger::{Catalog, InMemoryLedger, InventoryLedger};
    use crate::negotiation::{
        Negotiation, NegotiationEmit, NegotiationEngine, NegotiationEvent, NegotiationMachine,
        NegotiationState, NegotiationStore,
    };

    #[derive(Default)]
    struct MapStore {
        records: Mutex<HashMap<ConversationKey, Negotiation>>,
    }

    #[async_trait]
    impl NegotiationStore for MapStore {
        async fn load(&self, key: &ConversationKey) -> Result<Negotiation, ApplicationError> {
            let records = self.records.lock().expect("store lock");
            Ok(records.get(key).cloned().unwrap_or_else(|| Negotiation::new(key.clone())))
        }

        async fn save(&self, record: &Negotiation) -> Result<(), ApplicationError> {
            self.records.lock().expect("store lock").insert(record.key.clone(), record.clone());
            Ok(())
        }

        async fn reset(&self, key: &ConversationKey) -> Result<(), ApplicationError> {
            self.records.lock().expect("store lock").remove(key);
            Ok(())
        }
    }

    struct BrokenLedger;

    #[async_trait]
    impl InventoryLedger for BrokenLedger {
        async fn quantity_of(
            &self,
            _entity: &EntityId,
            _item: &ItemKind,
        ) -> Result<u32, ApplicationError> {
            Ok(0)
        }

        async fn transfer(
            &self,
            _order: &TransferOrder,
        ) -> Result<TransferReceipt, ApplicationError> {
            Err(ApplicationError::Persistence("database is locked".to_owned()))
        }

        async fn holdings(&self, _entity: &EntityId) -> Result<Vec<Holding>, ApplicationError> {
            Ok(Vec::new())
        }

        async fn deposit(
            &self,
            _entity: &EntityId,
            _item: &ItemKind,
            _quantity: u32,
        ) -> Result<u32, ApplicationError> {
            Ok(0)
        }
    }

    fn key() -> ConversationKey {
        ConversationKey::new("2", "1")
    }

    fn buy_rum(quantity: u32) -> TradeIntent {
        TradeIntent { direction: TradeDirection::Buy, item: ItemKind::new("rum"), quantity }
    }

    fn yes() -> NegotiationEvent {
        NegotiationEvent::ConsentGiven { judgment: ConsentJudgment::Yes, quantity: None }
    }

    fn context() -> AuditContext {
        AuditContext::new(Some(key()), "req-1", "negotiation")
    }

    async fn ledger_with_npc_rum(stock: u32) -> Arc<InMemoryLedger> {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger
            .register(CatalogEntry::new("rum", Some(Decimal::new(300, 2))))
            .await
            .expect("register rum");
        ledger.deposit(&key().npc, &ItemKind::new("rum"), stock).await.expect("seed rum");
        ledger
    }

    fn machine(
        ledger: Arc<dyn InventoryLedger>,
        store: Arc<MapStore>,
        sink: InMemoryAuditSink,
    ) -> NegotiationMachine {
        NegotiationMachine::new(NegotiationEngine::default(), ledger, store, Arc::new(sink))
    }

    #[tokio::test]
    async fn consent_executes_transfer_and_returns_to_no_trade() {
        let ledger = ledger_with_npc_rum(5).await;
        let store = Arc::new(MapStore::default());
        let sink = InMemoryAuditSink::default();
        let machine = machine(ledger.clone(), store.clone(), sink.clone());

        let proposed = machine
            .advance(
                &Negotiation::new(key()),
                NegotiationEvent::IntentProposed(buy_rum(2)),
                &context(),
            )
            .await
            .expect("propose");
        assert_eq!(proposed.emits, vec![NegotiationEmit::ConfirmationRequested(buy_rum(2))]);
        assert_eq!(store.load(&key()).await, Ok(proposed.record.clone()));

        let executed = machine.advance(&proposed.record, yes(), &context()).await.expect("yes");

        assert_eq!(executed.record.state, NegotiationState::NoTrade);
        let NegotiationEmit::TradeExecuted(receipt) = &executed.emits[0] else {
            panic!("expected an executed trade, got {:?}", executed.emits);
        };
        assert_eq!(receipt.total, Decimal::new(600, 2));
        assert_eq!(ledger.quantity_of(&key().npc, &ItemKind::new("rum")).await, Ok(3));
        assert_eq!(ledger.quantity_of(&key().player, &ItemKind::new("rum")).await, Ok(2));
        let committed = sink.last_named("ledger.transfer_committed").expect("committed event");
        assert_eq!(committed.detail("quantity"), Some("2"));
        assert_eq!(committed.detail("total"), Some("6.00"));
    }

    #[tokio::test]
    async fn shortage_returns_to_no_trade_without_moving_stock() {
        let ledger = ledger_with_npc_rum(1).await;
        let store = Arc::new(MapStore::default());
        let machine = machine(ledger.clone(), store.clone(), InMemoryAuditSink::default());

        let advance = machine
            .advance(&Negotiation::awaiting(key(), buy_rum(2)), yes(), &context())
            .await
            .expect("refusal is not a turn failure");

        assert_eq!(advance.record.state, NegotiationState::NoTrade);
        assert_eq!(
            advance.emits,
            vec![NegotiationEmit::TradeRefused {
                intent: buy_rum(2),
                reason: DomainError::InsufficientStock {
                    item: ItemKind::new("rum"),
                    available: 1,
                    requested: 2,
                },
            }]
        );
        assert_eq!(ledger.quantity_of(&key().npc, &ItemKind::new("rum")).await, Ok(1));
        assert_eq!(ledger.quantity_of(&key().player, &ItemKind::new("rum")).await, Ok(0));
        assert_eq!(
            store.load(&key()).await.map(|record| record.state),
            Ok(NegotiationState::NoTrade)
        );
    }

    #[tokio::test]
    async fn refusal_and_unsure_never_touch_the_ledger() {
        let ledger = ledger_with_npc_rum(5).await;
        let store = Arc::new(MapStore::default());
        let machine = machine(ledger.clone(), store.clone(), InMemoryAuditSink::default());
        let pending = Negotiation::awaiting(key(), buy_rum(2));

        let unsure = machine
            .advance(
                &pending,
                NegotiationEvent::ConsentGiven { judgment: ConsentJudgment::Unsure, quantity: None },
                &context(),
            )
            .await
            .expect("unsure");
        assert_eq!(unsure.record.pending, Some(buy_rum(2)));
        assert_eq!(unsure.emits, vec![NegotiationEmit::ClarificationRequested(buy_rum(2))]);

        let declined = machine
            .advance(
                &unsure.record,
                NegotiationEvent::ConsentGiven { judgment: ConsentJudgment::No, quantity: None },
                &context(),
            )
            .await
            .expect("no");
        assert_eq!(declined.record.state, NegotiationState::NoTrade);
        assert_eq!(declined.emits, vec![NegotiationEmit::TradeCancelled(buy_rum(2))]);
        assert_eq!(ledger.quantity_of(&key().npc, &ItemKind::new("rum")).await, Ok(5));
    }

    #[tokio::test]
    async fn persistence_failure_restores_previous_record() {
        let store = Arc::new(MapStore::default());
        let sink = InMemoryAuditSink::default();
        let machine = machine(Arc::new(BrokenLedger), store.clone(), sink.clone());
        let pending = Negotiation::awaiting(key(), buy_rum(2)).with_confirmation_prompt("2 rum?");
        store.save(&pending).await.expect("seed record");

        let error = machine.advance(&pending, yes(), &context()).await.expect_err("ledger down");

        assert_eq!(error, ApplicationError::Persistence("database is locked".to_owned()));
        assert_eq!(store.load(&key()).await, Ok(pending));
        assert!(sink.event_types().contains(&"ledger.transfer_failed".to_owned()));
    }

    #[tokio::test]
    async fn consent_while_idle_is_a_transition_error() {
        let ledger = ledger_with_npc_rum(5).await;
        let machine = machine(ledger, Arc::new(MapStore::default()), InMemoryAuditSink::default());

        let error = machine
            .advance(&Negotiation::new(key()), yes(), &context())
            .await
            .expect_err("nothing pending");

        assert!(matches!(error, ApplicationError::Domain(DomainError::NegotiationTransition(_))));
    }
}
