use std::io::{self, BufRead, Write};
use std::sync::Arc;

use parley_agent::{
    CoordinatorParts, HttpLlmClient, LlmOracle, NpcPersona, PromptBook, TracingAuditSink,
    TurnCoordinator, TurnError,
};
use parley_core::config::AppConfig;
use parley_core::domain::entity::ConversationKey;
use parley_core::negotiation::{NegotiationEmit, NegotiationEngine};
use parley_db::{
    DbPool, EntityDirectory, SqlEntityDirectory, SqlInventoryLedger, SqlNegotiationStore,
    SqlTranscriptStore,
};
use tracing_subscriber::EnvFilter;

use crate::commands::{load_config, open_database, runtime, CommandResult, StepFailure};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChatSummary {
    pub turns: usize,
    pub trades: usize,
}

pub fn run() -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    init_logging(&config);

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let outcome = session(&config, &pool).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(summary) => CommandResult::success(
            "chat",
            format!("conversation ended after {} turns, {} trades", summary.turns, summary.trades),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}

/// Logs go to stderr so they never interleave with the conversation.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .try_init();
}

async fn session(config: &AppConfig, pool: &DbPool) -> Result<ChatSummary, StepFailure> {
    let coordinator = coordinator(config, pool).await?;
    let key = config.negotiation.conversation();

    // A new terminal session starts without a pending offer.
    coordinator.reset(&key).await.map_err(|error| ("negotiation_reset", error.to_string(), 6u8))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    converse(&coordinator, &key, stdin.lock(), stdout.lock())
        .await
        .map_err(|error| ("terminal_io", error.to_string(), 9u8))
}

async fn coordinator(config: &AppConfig, pool: &DbPool) -> Result<TurnCoordinator, StepFailure> {
    let key = config.negotiation.conversation();
    let persona = SqlEntityDirectory::new(pool.clone())
        .find(&key.npc)
        .await
        .map_err(|error| ("npc_lookup", error.to_string(), 6u8))?
        .map(|entity| NpcPersona::from_entity(&entity))
        .unwrap_or_default();

    let client = HttpLlmClient::from_config(&config.llm)
        .map_err(|error| ("oracle_setup", format!("{error:#}"), 8u8))?;
    let prompts =
        PromptBook::new().map_err(|error| ("oracle_setup", format!("{error:#}"), 8u8))?;

    let ledger = Arc::new(SqlInventoryLedger::new(pool.clone()));
    Ok(TurnCoordinator::new(CoordinatorParts {
        oracle: Arc::new(LlmOracle::new(Arc::new(client), prompts)),
        engine: NegotiationEngine::new(config.negotiation.policy()),
        negotiations: Arc::new(SqlNegotiationStore::new(pool.clone())),
        transcript: Arc::new(SqlTranscriptStore::new(pool.clone())),
        catalog: ledger.clone(),
        ledger,
        audit: Arc::new(TracingAuditSink),
        persona,
        history_window: config.negotiation.history_window,
    }))
}

/// Reads player lines until EOF or `/quit`. An unreachable oracle costs the
/// turn, not the session.
pub async fn converse<R, W>(
    coordinator: &TurnCoordinator,
    key: &ConversationKey,
    input: R,
    mut output: W,
) -> io::Result<ChatSummary>
where
    R: BufRead,
    W: Write,
{
    let npc = coordinator.persona().name.clone();
    let mut summary = ChatSummary::default();

    writeln!(
        output,
        "Talking to {npc}, {}. /reset drops an offer, /quit leaves.",
        coordinator.persona().role
    )?;
    write!(output, "> ")?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                let message = match coordinator.reset(key).await {
                    Ok(true) => "(the pending offer is off the table)".to_string(),
                    Ok(false) => "(nothing was pending)".to_string(),
                    Err(error) => format!("(reset failed: {error})"),
                };
                writeln!(output, "{message}")?;
            }
            "" => {}
            utterance => match coordinator.handle_turn(key, utterance).await {
                Ok(reply) => {
                    summary.turns += 1;
                    summary.trades += reply
                        .emits
                        .iter()
                        .filter(|emit| matches!(emit, NegotiationEmit::TradeExecuted(_)))
                        .count();
                    writeln!(output, "{npc}: {}", reply.text)?;
                }
                Err(TurnError::EmptyUtterance) => {}
                Err(TurnError::Failed(error)) => {
                    let interface = error.into_interface("cli");
                    writeln!(output, "({} {interface})", interface.user_message())?;
                }
            },
        }
        write!(output, "> ")?;
        output.flush()?;
    }

    writeln!(output)?;
    Ok(summary)
}
