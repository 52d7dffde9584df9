pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoSeed, SeedResult, VerificationResult};
pub use repositories::{
    EntityDirectory, InMemoryEntityDirectory, InMemoryNegotiationStore, InMemoryTranscriptStore,
    RepositoryError, SqlEntityDirectory, SqlInventoryLedger, SqlNegotiationStore,
    SqlTranscriptStore, TradeJournal, TradeRecord,
};
