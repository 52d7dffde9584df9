use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_core::audit::{AuditContext, AuditSink};
use parley_core::domain::entity::ConversationKey;
use parley_core::domain::trade::TradeIntent;
use parley_core::errors::{ApplicationError, DomainError};
use parley_core::ledger::{Catalog, InventoryLedger};
use parley_core::negotiation::{
    Negotiation, NegotiationEmit, NegotiationEngine, NegotiationEvent, NegotiationMachine,
    NegotiationState, NegotiationStore,
};
use parley_core::transcript::{Speaker, TranscriptStore};

use crate::conversation::{
    confirmation_question, outcome_line, quantity_question, NpcPersona, FALLBACK_REPLY,
};
use crate::oracle::{ConsentRequest, IntentRequest, OracleError, TradeOracle};
use crate::tools::OracleCall;

const ACTOR: &str = "turn_coordinator";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("player message is empty")]
    EmptyUtterance,
    #[error(transparent)]
    Failed(#[from] ApplicationError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub state: NegotiationState,
    pub correlation_id: String,
    pub emits: Vec<NegotiationEmit>,
}

/// Everything a coordinator is wired from.
pub struct CoordinatorParts {
    pub oracle: Arc<dyn TradeOracle>,
    pub engine: NegotiationEngine,
    pub negotiations: Arc<dyn NegotiationStore>,
    pub transcript: Arc<dyn TranscriptStore>,
    pub catalog: Arc<dyn Catalog>,
    pub ledger: Arc<dyn InventoryLedger>,
    pub audit: Arc<dyn AuditSink>,
    pub persona: NpcPersona,
    pub history_window: usize,
}

/// Runs one player turn: transcript, oracle, negotiation machine, reply.
///
/// Turns for the same conversation must not interleave; callers serialize them.
pub struct TurnCoordinator {
    oracle: Arc<dyn TradeOracle>,
    machine: NegotiationMachine,
    negotiations: Arc<dyn NegotiationStore>,
    transcript: Arc<dyn TranscriptStore>,
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn InventoryLedger>,
    persona: NpcPersona,
    history_window: usize,
}

impl TurnCoordinator {
    pub fn new(parts: CoordinatorParts) -> Self {
        let machine = NegotiationMachine::new(
            parts.engine,
            Arc::clone(&parts.ledger),
            Arc::clone(&parts.negotiations),
            parts.audit,
        );
        Self {
            oracle: parts.oracle,
            machine,
            negotiations: parts.negotiations,
            transcript: parts.transcript,
            catalog: parts.catalog,
            ledger: parts.ledger,
            persona: parts.persona,
            history_window: parts.history_window.max(1),
        }
    }

    pub fn persona(&self) -> &NpcPersona {
        &self.persona
    }

    pub async fn handle_turn(
        &self,
        key: &ConversationKey,
        utterance: &str,
    ) -> Result<TurnReply, TurnError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(TurnError::EmptyUtterance);
        }

        let correlation_id = Uuid::new_v4().to_string();
        let context = AuditContext::new(Some(key.clone()), &correlation_id, ACTOR);
        let record = self.negotiations.load(key).await?;

        info!(
            event_name = "turn.received",
            correlation_id = %correlation_id,
            player_id = %key.player,
            npc_id = %key.npc,
            state = record.state.as_str(),
            "player turn received"
        );

        // The prompt carries the utterance itself; history stops just before it.
        let history = self.transcript.recent(key, self.history_window).await?;
        self.transcript.append(key, Speaker::Player, utterance).await?;

        let answer = if record.is_awaiting_consent() {
            let confirmation_prompt = match &record.confirmation_prompt {
                Some(prompt) => prompt.clone(),
                None => self.question_for(record.pending.as_ref()).await?,
            };
            self.oracle
                .judge_consent(ConsentRequest {
                    persona: self.persona.clone(),
                    history,
                    confirmation_prompt,
                    utterance: utterance.to_owned(),
                })
                .await
        } else {
            let stock = self.ledger.holdings(&key.npc).await?;
            self.oracle
                .extract_intent(IntentRequest {
                    persona: self.persona.clone(),
                    history,
                    stock,
                    utterance: utterance.to_owned(),
                })
                .await
        };

        let (oracle_text, call) = match answer {
            Ok(reply) => (reply.text, reply.call),
            Err(OracleError::Unavailable(message)) => {
                error!(
                    event_name = "oracle.unavailable",
                    correlation_id = %correlation_id,
                    error = %message,
                    "oracle call failed; turn aborted"
                );
                return Err(ApplicationError::OracleUnavailable(message).into());
            }
            Err(OracleError::Malformed { text, reason }) => {
                warn!(
                    event_name = "oracle.tool_call_malformed",
                    correlation_id = %correlation_id,
                    reason = %reason,
                    "ignoring undecodable tool call"
                );
                (text, OracleCall::NoTool)
            }
        };

        let event = self.event_for(&record, call, &correlation_id);
        if let Some(NegotiationEvent::IntentProposed(intent)) = &event {
            if intent.is_trade() && self.catalog.entry(&intent.item).await?.is_none() {
                info!(
                    event_name = "negotiation.unknown_item",
                    correlation_id = %correlation_id,
                    item = %intent.item,
                    "offer for an uncatalogued item refused"
                );
                let emit = NegotiationEmit::TradeRefused {
                    intent: intent.clone(),
                    reason: DomainError::UnknownItem(intent.item.clone()),
                };
                let text = outcome_line(key, &emit).unwrap_or(oracle_text);
                let reply = self.finish(key, text, record.state, correlation_id, vec![emit]).await?;
                return Ok(reply);
            }
        }

        let (text, state, emits) = match event {
            None => (oracle_text, record.state, Vec::new()),
            Some(event) => match self.machine.advance(&record, event, &context).await {
                Ok(advance) => {
                    let (text, record) = self.phrase(key, advance.record, &advance.emits).await?;
                    let text = if advance.emits.is_empty() { oracle_text } else { text };
                    (text, record.state, advance.emits)
                }
                Err(ApplicationError::Domain(reason)) => {
                    warn!(
                        event_name = "negotiation.transition_rejected",
                        correlation_id = %correlation_id,
                        reason = %reason,
                        "negotiation event rejected"
                    );
                    (oracle_text, record.state, Vec::new())
                }
                Err(other) => return Err(other.into()),
            },
        };

        Ok(self.finish(key, text, state, correlation_id, emits).await?)
    }

    async fn finish(
        &self,
        key: &ConversationKey,
        text: String,
        state: NegotiationState,
        correlation_id: String,
        emits: Vec<NegotiationEmit>,
    ) -> Result<TurnReply, ApplicationError> {
        let text = if text.trim().is_empty() { FALLBACK_REPLY.to_owned() } else { text };
        self.transcript.append(key, Speaker::Npc, &text).await?;

        info!(
            event_name = "turn.completed",
            correlation_id = %correlation_id,
            state = state.as_str(),
            emits = emits.len(),
            "npc reply ready"
        );

        Ok(TurnReply { text, state, correlation_id, emits })
    }

    /// Drops any pending offer. Returns whether one was pending.
    pub async fn reset(&self, key: &ConversationKey) -> Result<bool, ApplicationError> {
        let record = self.negotiations.load(key).await?;
        let dropped = record.is_awaiting_consent();
        if dropped {
            let correlation_id = Uuid::new_v4().to_string();
            let context = AuditContext::new(Some(key.clone()), &correlation_id, ACTOR);
            self.machine.advance(&record, NegotiationEvent::Reset, &context).await?;
        }
        self.negotiations.reset(key).await?;

        info!(
            event_name = "negotiation.reset",
            player_id = %key.player,
            npc_id = %key.npc,
            dropped,
            "conversation reset"
        );
        Ok(dropped)
    }

    fn event_for(
        &self,
        record: &Negotiation,
        call: OracleCall,
        correlation_id: &str,
    ) -> Option<NegotiationEvent> {
        match call {
            OracleCall::NoTool => None,
            OracleCall::Intent(raw) => match raw.normalize() {
                Ok(intent) => Some(NegotiationEvent::IntentProposed(intent)),
                Err(reason) => {
                    warn!(
                        event_name = "oracle.tool_call_malformed",
                        correlation_id,
                        reason = %reason,
                        "intent arguments rejected"
                    );
                    None
                }
            },
            OracleCall::Consent(_) if !record.is_awaiting_consent() => {
                debug!(
                    event_name = "oracle.consent_ignored",
                    correlation_id,
                    "consent call without a pending offer"
                );
                None
            }
            OracleCall::Consent(raw) => match raw.judgment() {
                Ok((judgment, quantity)) => {
                    Some(NegotiationEvent::ConsentGiven { judgment, quantity })
                }
                Err(reason) => {
                    warn!(
                        event_name = "oracle.tool_call_malformed",
                        correlation_id,
                        reason = %reason,
                        "consent arguments rejected"
                    );
                    None
                }
            },
        }
    }

    /// Renders the emitted outcomes. Questions are remembered on the record so
    /// the next consent judgment sees exactly what the player was asked.
    async fn phrase(
        &self,
        key: &ConversationKey,
        mut record: Negotiation,
        emits: &[NegotiationEmit],
    ) -> Result<(String, Negotiation), ApplicationError> {
        let mut lines = Vec::with_capacity(emits.len());
        for emit in emits {
            let line = match emit {
                NegotiationEmit::ConfirmationRequested(intent)
                | NegotiationEmit::QuantityRequested(intent) => {
                    let question = self.question_for(Some(intent)).await?;
                    record = record.with_confirmation_prompt(question.clone());
                    self.negotiations.save(&record).await?;
                    question
                }
                other => match outcome_line(key, other) {
                    Some(line) => line,
                    None => continue,
                },
            };
            lines.push(line);
        }
        Ok((lines.join("\n"), record))
    }

    async fn question_for(&self, intent: Option<&TradeIntent>) -> Result<String, ApplicationError> {
        let Some(intent) = intent else {
            return Ok(FALLBACK_REPLY.to_owned());
        };
        if intent.is_vague() {
            return Ok(quantity_question(intent));
        }
        let price = self.catalog.price_of(&intent.item).await?;
        Ok(confirmation_question(intent, price))
    }
}
