use std::sync::Arc;

use parley_agent::{
    CoordinatorParts, HttpLlmClient, LlmOracle, NpcPersona, PromptBook, TracingAuditSink,
    TradeOracle, TurnCoordinator,
};
use parley_core::config::AppConfig;
use parley_core::negotiation::NegotiationEngine;
use parley_db::{
    connect_with_settings, migrations, DbPool, EntityDirectory, RepositoryError,
    SqlEntityDirectory, SqlInventoryLedger, SqlNegotiationStore, SqlTranscriptStore,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub coordinator: Arc<TurnCoordinator>,
    pub ledger: Arc<SqlInventoryLedger>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("npc lookup failed: {0}")]
    Directory(#[source] RepositoryError),
    #[error("oracle setup failed: {0}")]
    Oracle(String),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        npc_id = %config.negotiation.npc_id,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client = HttpLlmClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::Oracle(format!("{error:#}")))?;
    info!(
        event_name = "system.bootstrap.oracle_configured",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        model = %config.llm.model,
        endpoint = %client.endpoint(),
        "language model client configured"
    );
    let prompts =
        PromptBook::new().map_err(|error| BootstrapError::Oracle(format!("{error:#}")))?;
    let oracle = Arc::new(LlmOracle::new(Arc::new(client), prompts));

    assemble(config, db_pool, oracle).await
}

/// Wires the coordinator over the SQL stores with the given oracle.
pub async fn assemble(
    config: AppConfig,
    db_pool: DbPool,
    oracle: Arc<dyn TradeOracle>,
) -> Result<Application, BootstrapError> {
    let key = config.negotiation.conversation();
    let persona = match SqlEntityDirectory::new(db_pool.clone())
        .find(&key.npc)
        .await
        .map_err(BootstrapError::Directory)?
    {
        Some(entity) => NpcPersona::from_entity(&entity),
        None => {
            warn!(
                event_name = "system.bootstrap.npc_missing",
                correlation_id = "bootstrap",
                npc_id = %key.npc,
                "npc not found in entity directory; using default persona"
            );
            NpcPersona::default()
        }
    };

    let ledger = Arc::new(SqlInventoryLedger::new(db_pool.clone()));
    let coordinator = TurnCoordinator::new(CoordinatorParts {
        oracle,
        engine: NegotiationEngine::new(config.negotiation.policy()),
        negotiations: Arc::new(SqlNegotiationStore::new(db_pool.clone())),
        transcript: Arc::new(SqlTranscriptStore::new(db_pool.clone())),
        catalog: ledger.clone(),
        ledger: ledger.clone(),
        audit: Arc::new(TracingAuditSink),
        persona,
        history_window: config.negotiation.history_window,
    });

    info!(
        event_name = "system.bootstrap.coordinator_ready",
        correlation_id = "bootstrap",
        npc = %coordinator.persona().name,
        "turn coordinator ready"
    );

    Ok(Application { config, db_pool, coordinator: Arc::new(coordinator), ledger })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parley_agent::oracle::{ConsentRequest, IntentRequest, OracleError, OracleReply};
    use parley_agent::TradeOracle;
    use parley_core::config::AppConfig;
    use parley_db::{connect_with_settings, migrations, DemoSeed};

    use super::{assemble, bootstrap_with_config, BootstrapError};

    struct SilentOracle;

    #[async_trait]
    impl TradeOracle for SilentOracle {
        async fn extract_intent(&self, _: IntentRequest) -> Result<OracleReply, OracleError> {
            Ok(OracleReply::text("Arr."))
        }

        async fn judge_consent(&self, _: ConsentRequest) -> Result<OracleReply, OracleError> {
            Ok(OracleReply::text("Arr."))
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_the_database_cannot_open() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite:///no-such-dir/parley/parley.db".to_string();
        config.database.timeout_secs = 1;

        let result = bootstrap_with_config(config).await;

        assert!(matches!(result, Err(BootstrapError::DatabaseConnect(_))));
    }

    #[tokio::test]
    async fn assemble_takes_the_persona_from_the_entity_directory() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");

        let app = assemble(AppConfig::default(), pool.clone(), Arc::new(SilentOracle))
            .await
            .expect("assemble");

        assert_eq!(app.coordinator.persona().name, "Captain Barnacle");
        assert_eq!(app.coordinator.persona().role, "pirate merchant");
        pool.close().await;
    }

    #[tokio::test]
    async fn assemble_falls_back_to_the_default_persona() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");

        let app = assemble(AppConfig::default(), pool.clone(), Arc::new(SilentOracle))
            .await
            .expect("assemble");

        assert_eq!(app.coordinator.persona(), &parley_agent::NpcPersona::default());
        pool.close().await;
    }
}
