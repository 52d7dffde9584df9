pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod ledger;
pub mod negotiation;
pub mod transcript;

pub use domain::entity::{ConversationKey, Entity, EntityId, EntityRole};
pub use domain::item::{CatalogEntry, Holding, ItemKind};
pub use domain::trade::{
    ConsentJudgment, TradeDirection, TradeIntent, TransferOrder, TransferReceipt, VAGUE_QUANTITY,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ledger::{Catalog, InMemoryLedger, InventoryLedger};
pub use negotiation::{
    Advance, Negotiation, NegotiationAction, NegotiationEmit, NegotiationEngine,
    NegotiationEvent, NegotiationMachine, NegotiationPolicy, NegotiationState, NegotiationStore,
    NegotiationTransitionError, VagueQuantityPolicy,
};
pub use transcript::{Speaker, TranscriptEntry, TranscriptStore};
