use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::entity::ConversationKey;
use crate::domain::trade::{ConsentJudgment, TradeIntent};
use crate::negotiation::states::{
    Negotiation, NegotiationAction, NegotiationEvent, NegotiationState, TransitionOutcome,
};

/// What a bare "yes" does to a pending intent whose quantity was never named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VagueQuantityPolicy {
    #[default]
    Ask,
    AssumeOne,
}

impl VagueQuantityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::AssumeOne => "assume_one",
        }
    }
}

impl std::str::FromStr for VagueQuantityPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ask" => Ok(Self::Ask),
            "assume_one" => Ok(Self::AssumeOne),
            other => Err(format!("unsupported vague quantity policy `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiationPolicy {
    /// Inconclusive consent rounds tolerated before the offer is dropped. 0 disables the bound.
    pub max_unsure_rounds: u32,
    pub vague_quantity: VagueQuantityPolicy,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self { max_unsure_rounds: 3, vague_quantity: VagueQuantityPolicy::Ask }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NegotiationTransitionError {
    #[error("invalid negotiation transition from {state:?} using event {event:?}")]
    InvalidTransition { state: NegotiationState, event: NegotiationEvent },
    #[error("negotiation {key} is awaiting consent but has no pending intent")]
    MissingPendingIntent { key: ConversationKey },
}

/// Pure transition table. Performs no I/O; the machine executes the actions.
#[derive(Clone, Debug, Default)]
pub struct NegotiationEngine {
    policy: NegotiationPolicy,
}

impl NegotiationEngine {
    pub fn new(policy: NegotiationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NegotiationPolicy {
        self.policy
    }

    pub fn apply(
        &self,
        current: &Negotiation,
        event: &NegotiationEvent,
    ) -> Result<TransitionOutcome, NegotiationTransitionError> {
        use NegotiationAction::{CancelTrade, ContinueConversation, RequestConfirmation};
        use NegotiationEvent::{ConsentGiven, IntentProposed, Reset};
        use NegotiationState::{AwaitingConsent, NoTrade};

        let (next, actions) = match (current.state, event) {
            (_, Reset) => {
                let actions: Vec<_> =
                    current.pending.clone().map(CancelTrade).into_iter().collect();
                (Negotiation::new(current.key.clone()), actions)
            }
            (_, IntentProposed(intent)) if !intent.is_trade() => {
                (current.clone(), vec![ContinueConversation])
            }
            (NoTrade, IntentProposed(intent)) => (
                Negotiation::awaiting(current.key.clone(), intent.clone()),
                vec![RequestConfirmation(intent.clone())],
            ),
            (AwaitingConsent, IntentProposed(intent)) => {
                let superseded = self.pending(current)?.clone();
                (
                    Negotiation::awaiting(current.key.clone(), intent.clone()),
                    vec![
                        NegotiationAction::SupersedePending(superseded),
                        RequestConfirmation(intent.clone()),
                    ],
                )
            }
            (AwaitingConsent, ConsentGiven { judgment, quantity }) => {
                let pending = self.pending(current)?;
                self.judge(current, pending, *judgment, *quantity)
            }
            (NoTrade, ConsentGiven { .. }) => {
                return Err(NegotiationTransitionError::InvalidTransition {
                    state: current.state,
                    event: event.clone(),
                });
            }
        };

        Ok(TransitionOutcome {
            from: current.state,
            to: next.state,
            event: event.clone(),
            actions,
            next,
        })
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &Negotiation,
        event: &NegotiationEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, NegotiationTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "negotiation.transition_applied",
                        AuditCategory::Negotiation,
                        AuditOutcome::Success,
                    )
                    .with_detail("from", outcome.from.as_str())
                    .with_detail("to", outcome.to.as_str())
                    .with_detail("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "negotiation.transition_rejected",
                        AuditCategory::Negotiation,
                        AuditOutcome::Rejected,
                    )
                    .with_detail("error", error.to_string()),
                );
            }
        }
        result
    }

    fn pending<'a>(
        &self,
        current: &'a Negotiation,
    ) -> Result<&'a TradeIntent, NegotiationTransitionError> {
        current
            .pending
            .as_ref()
            .ok_or_else(|| NegotiationTransitionError::MissingPendingIntent {
                key: current.key.clone(),
            })
    }

    fn judge(
        &self,
        current: &Negotiation,
        pending: &TradeIntent,
        judgment: ConsentJudgment,
        quantity: Option<u32>,
    ) -> (Negotiation, Vec<NegotiationAction>) {
        use NegotiationAction::{
            CancelTrade, ExecuteTransfer, RequestClarification, RequestQuantity,
        };

        match judgment {
            ConsentJudgment::No => {
                (Negotiation::new(current.key.clone()), vec![CancelTrade(pending.clone())])
            }
            ConsentJudgment::Unsure => {
                self.inconclusive(current, pending, RequestClarification(pending.clone()))
            }
            ConsentJudgment::Yes => {
                let named = quantity.filter(|amount| *amount > 0);
                // A quoted offer only executes as quoted; another amount is a new offer.
                if let Some(amount) = named.filter(|amount| {
                    !pending.is_vague() && *amount != pending.quantity
                }) {
                    let revised = pending.with_quantity(amount);
                    return (
                        Negotiation::awaiting(current.key.clone(), revised.clone()),
                        vec![
                            NegotiationAction::SupersedePending(pending.clone()),
                            NegotiationAction::RequestConfirmation(revised),
                        ],
                    );
                }
                let resolved = match (named, pending.is_vague(), self.policy.vague_quantity) {
                    (Some(amount), true, _) => Some(pending.with_quantity(amount)),
                    (_, false, _) => Some(pending.clone()),
                    (None, true, VagueQuantityPolicy::AssumeOne) => Some(pending.with_quantity(1)),
                    (None, true, VagueQuantityPolicy::Ask) => None,
                };
                match resolved {
                    Some(intent) => {
                        (Negotiation::new(current.key.clone()), vec![ExecuteTransfer(intent)])
                    }
                    None => self.inconclusive(current, pending, RequestQuantity(pending.clone())),
                }
            }
        }
    }

    /// One more round without a usable answer; drops the offer once the bound is passed.
    fn inconclusive(
        &self,
        current: &Negotiation,
        pending: &TradeIntent,
        follow_up: NegotiationAction,
    ) -> (Negotiation, Vec<NegotiationAction>) {
        let rounds = current.unsure_rounds.saturating_add(1);
        let bound = self.policy.max_unsure_rounds;
        if bound > 0 && rounds > bound {
            return (
                Negotiation::new(current.key.clone()),
                vec![NegotiationAction::AbandonTrade(pending.clone())],
            );
        }
        let mut next = current.clone();
        next.unsure_rounds = rounds;
        (next, vec![follow_up])
    }
}
