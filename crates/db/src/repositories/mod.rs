use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use parley_core::domain::entity::{ConversationKey, Entity, EntityId};
use parley_core::domain::item::ItemKind;
use parley_core::domain::trade::TradeDirection;
use parley_core::errors::{ApplicationError, DomainError};

pub mod entity;
pub mod inventory;
pub mod memory;
pub mod negotiation;
pub mod transcript;

pub use entity::SqlEntityDirectory;
pub use inventory::SqlInventoryLedger;
pub use memory::{InMemoryEntityDirectory, InMemoryNegotiationStore, InMemoryTranscriptStore};
pub use negotiation::SqlNegotiationStore;
pub use transcript::SqlTranscriptStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Domain(domain) => ApplicationError::Domain(domain),
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

/// One executed transfer, seen from the player's side of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub direction: TradeDirection,
    pub item: ItemKind,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub executed_at: DateTime<Utc>,
}

#[async_trait]
pub trait TradeJournal: Send + Sync {
    /// Trades between the two parties of `key`, oldest first.
    async fn list_trades(&self, key: &ConversationKey)
        -> Result<Vec<TradeRecord>, RepositoryError>;
}

#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn find(&self, id: &EntityId) -> Result<Option<Entity>, RepositoryError>;
    async fn save(&self, entity: Entity) -> Result<(), RepositoryError>;
}
