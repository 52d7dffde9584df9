pub mod engine;
pub mod machine;
pub mod states;

use async_trait::async_trait;

use crate::domain::entity::ConversationKey;
use crate::errors::ApplicationError;

pub use engine::{
    NegotiationEngine, NegotiationPolicy, NegotiationTransitionError, VagueQuantityPolicy,
};
pub use machine::{Advance, NegotiationMachine};
pub use states::{
    Negotiation, NegotiationAction, NegotiationEmit, NegotiationEvent, NegotiationState,
    TransitionOutcome,
};

/// Durable home of the per-conversation negotiation record.
#[async_trait]
pub trait NegotiationStore: Send + Sync {
    /// A conversation that was never saved is in `NoTrade`.
    async fn load(&self, key: &ConversationKey) -> Result<Negotiation, ApplicationError>;

    async fn save(&self, record: &Negotiation) -> Result<(), ApplicationError>;

    async fn reset(&self, key: &ConversationKey) -> Result<(), ApplicationError>;
}
