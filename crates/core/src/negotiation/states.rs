use serde::{Deserialize, Serialize};

use crate::domain::entity::ConversationKey;
use crate::domain::trade::{ConsentJudgment, TradeIntent, TransferReceipt};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationState {
    NoTrade,
    AwaitingConsent,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTrade => "no_trade",
            Self::AwaitingConsent => "awaiting_consent",
        }
    }
}

impl std::str::FromStr for NegotiationState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "no_trade" => Ok(Self::NoTrade),
            "awaiting_consent" => Ok(Self::AwaitingConsent),
            other => Err(format!("unknown negotiation state `{other}`")),
        }
    }
}

/// The persisted per-conversation negotiation record.
///
/// `pending` is `Some` exactly when `state` is `AwaitingConsent`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiation {
    pub key: ConversationKey,
    pub state: NegotiationState,
    pub pending: Option<TradeIntent>,
    /// The question last put to the player, replayed to the oracle when judging consent.
    pub confirmation_prompt: Option<String>,
    pub unsure_rounds: u32,
}

impl Negotiation {
    pub fn new(key: ConversationKey) -> Self {
        Self {
            key,
            state: NegotiationState::NoTrade,
            pending: None,
            confirmation_prompt: None,
            unsure_rounds: 0,
        }
    }

    pub fn awaiting(key: ConversationKey, pending: TradeIntent) -> Self {
        Self {
            key,
            state: NegotiationState::AwaitingConsent,
            pending: Some(pending),
            confirmation_prompt: None,
            unsure_rounds: 0,
        }
    }

    pub fn with_confirmation_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.confirmation_prompt = Some(prompt.into());
        self
    }

    pub fn is_awaiting_consent(&self) -> bool {
        self.state == NegotiationState::AwaitingConsent
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationEvent {
    IntentProposed(TradeIntent),
    /// `quantity` carries an amount the player named while answering, if any.
    ConsentGiven { judgment: ConsentJudgment, quantity: Option<u32> },
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationAction {
    ContinueConversation,
    SupersedePending(TradeIntent),
    RequestConfirmation(TradeIntent),
    RequestQuantity(TradeIntent),
    RequestClarification(TradeIntent),
    ExecuteTransfer(TradeIntent),
    CancelTrade(TradeIntent),
    AbandonTrade(TradeIntent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: NegotiationState,
    pub to: NegotiationState,
    pub event: NegotiationEvent,
    pub actions: Vec<NegotiationAction>,
    pub next: Negotiation,
}

/// What the machine reports back to the conversation layer after a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NegotiationEmit {
    ConfirmationRequested(TradeIntent),
    QuantityRequested(TradeIntent),
    ClarificationRequested(TradeIntent),
    TradeExecuted(TransferReceipt),
    TradeRefused { intent: TradeIntent, reason: DomainError },
    TradeCancelled(TradeIntent),
    NegotiationAbandoned(TradeIntent),
}
