use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use parley_agent::oracle::{ConsentRequest, IntentRequest, OracleError, OracleReply};
use parley_agent::tools::{OracleCall, RawConsent, RawIntent};
use parley_agent::{CoordinatorParts, NpcPersona, TradeOracle, TurnCoordinator};
use parley_cli::commands::chat::{converse, ChatSummary};
use parley_cli::commands::{inventory, migrate, seed};
use parley_core::audit::NoopAuditSink;
use parley_core::domain::entity::ConversationKey;
use parley_core::domain::item::{CatalogEntry, ItemKind};
use parley_core::ledger::{Catalog, InMemoryLedger, InventoryLedger};
use parley_core::negotiation::NegotiationEngine;
use parley_db::{InMemoryNegotiationStore, InMemoryTranscriptStore};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("PARLEY_DATABASE_URL", &file_url(&dir))], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_foreign_database_urls() {
    with_env(&[("PARLEY_DATABASE_URL", "postgres://localhost/parley")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_and_feeds_inventory() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("PARLEY_DATABASE_URL", &file_url(&dir))], || {
        let first = seed::run(true);
        assert_eq!(first.exit_code, 0, "expected clean seed success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(
            first_payload["message"],
            "demo world reset and seeded: 2 entities, 5 catalog items, 7 stock lines"
        );

        let second = seed::run(false);
        assert_eq!(second.exit_code, 0, "expected repeat seed success: {}", second.output);

        let stock = inventory::run("1");
        assert_eq!(stock.exit_code, 0, "expected merchant stock: {}", stock.output);
        let message = parse_payload(&stock.output)["message"].as_str().unwrap_or("").to_string();
        assert!(message.contains("  - rum x5 @ 3.00 gold"), "unexpected listing: {message}");
        assert!(message.contains("  - apple x20 @ 0.50 gold"), "unexpected listing: {message}");

        let missing = inventory::run("99");
        assert_eq!(missing.exit_code, 7);
        assert_eq!(parse_payload(&missing.output)["error_class"], "not_found");
    });
}

#[derive(Default)]
struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<OracleReply, OracleError>>>,
}

#[async_trait]
impl TradeOracle for ScriptedOracle {
    async fn extract_intent(&self, _: IntentRequest) -> Result<OracleReply, OracleError> {
        self.next()
    }

    async fn judge_consent(&self, _: ConsentRequest) -> Result<OracleReply, OracleError> {
        self.next()
    }
}

impl ScriptedOracle {
    fn next(&self) -> Result<OracleReply, OracleError> {
        self.replies
            .lock()
            .expect("replies")
            .pop_front()
            .unwrap_or_else(|| Ok(OracleReply::text("Arr, fair winds.")))
    }
}

#[tokio::test]
async fn converse_runs_turns_until_quit() {
    let key = ConversationKey::new("2", "1");
    let ledger = Arc::new(InMemoryLedger::new());
    ledger
        .register(CatalogEntry::new("rum", Some(Decimal::new(300, 2))))
        .await
        .expect("register");
    ledger.deposit(&key.npc, &ItemKind::new("rum"), 5).await.expect("deposit");

    let oracle = ScriptedOracle {
        replies: Mutex::new(VecDeque::from(vec![
            Ok(OracleReply {
                text: String::new(),
                call: OracleCall::Intent(RawIntent {
                    trade_state: "buy".to_string(),
                    item: "rum".to_string(),
                    quantity: 1,
                }),
            }),
            Ok(OracleReply {
                text: String::new(),
                call: OracleCall::Consent(RawConsent { consent: "yes".to_string(), quantity: None }),
            }),
            Err(OracleError::Unavailable("connection refused".to_string())),
        ])),
    };
    let coordinator = TurnCoordinator::new(CoordinatorParts {
        oracle: Arc::new(oracle),
        engine: NegotiationEngine::default(),
        negotiations: Arc::new(InMemoryNegotiationStore::default()),
        transcript: Arc::new(InMemoryTranscriptStore::default()),
        catalog: ledger.clone(),
        ledger: ledger.clone(),
        audit: Arc::new(NoopAuditSink),
        persona: NpcPersona::default(),
        history_window: 20,
    });

    let input = "one rum please\n\nyes\nare ye there?\n/reset\n/quit\nnever read\n";
    let mut output = Vec::new();
    let summary =
        converse(&coordinator, &key, input.as_bytes(), &mut output).await.expect("session");

    assert_eq!(summary, ChatSummary { turns: 2, trades: 1 });
    let transcript = String::from_utf8(output).expect("utf8");
    assert!(transcript.starts_with("Talking to Captain Barnacle, pirate merchant."));
    assert!(transcript.contains("Captain Barnacle: Are ye sure ye want to buy 1 rum"));
    assert!(transcript.contains("Captain Barnacle: Ye bought 1 rum for 3.00 gold."));
    assert!(transcript.contains("The merchant is not answering right now."));
    assert!(transcript.contains("(nothing was pending)"));
    assert_eq!(ledger.quantity_of(&key.npc, &ItemKind::new("rum")).await, Ok(4));
}

fn file_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("parley.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PARLEY_DATABASE_URL",
        "PARLEY_DATABASE_MAX_CONNECTIONS",
        "PARLEY_DATABASE_TIMEOUT_SECS",
        "PARLEY_LLM_PROVIDER",
        "PARLEY_LLM_API_KEY",
        "PARLEY_LLM_BASE_URL",
        "PARLEY_LLM_MODEL",
        "PARLEY_LLM_TIMEOUT_SECS",
        "PARLEY_LLM_MAX_RETRIES",
        "PARLEY_SERVER_BIND_ADDRESS",
        "PARLEY_SERVER_PORT",
        "PARLEY_NEGOTIATION_PLAYER_ID",
        "PARLEY_NEGOTIATION_NPC_ID",
        "PARLEY_LOGGING_LEVEL",
        "PARLEY_LOGGING_FORMAT",
        "PARLEY_LOG_LEVEL",
        "PARLEY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
