use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use parley_core::domain::item::Holding;
use parley_core::errors::ApplicationError;
use parley_core::transcript::TranscriptEntry;

use crate::conversation::{NpcPersona, PromptBook};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient};
use crate::tools::{consent_tool, decode_first, intent_tool, OracleCall};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentRequest {
    pub persona: NpcPersona,
    /// Oldest first; ends before the current utterance.
    pub history: Vec<TranscriptEntry>,
    pub stock: Vec<Holding>,
    pub utterance: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsentRequest {
    pub persona: NpcPersona,
    pub history: Vec<TranscriptEntry>,
    /// The exact question the player is answering.
    pub confirmation_prompt: String,
    pub utterance: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleReply {
    pub text: String,
    pub call: OracleCall,
}

impl OracleReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), call: OracleCall::NoTool }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// The model answered, but its tool call could not be decoded. `text` is
    /// whatever free text came with it.
    #[error("oracle returned malformed output: {reason}")]
    Malformed { text: String, reason: String },
}

impl From<OracleError> for ApplicationError {
    fn from(error: OracleError) -> Self {
        match error {
            OracleError::Unavailable(message) => Self::OracleUnavailable(message),
            OracleError::Malformed { reason, .. } => Self::OracleMalformedOutput(reason),
        }
    }
}

/// The untrusted language model, seen as a function from conversation to
/// free text plus at most one decoded tool call.
#[async_trait]
pub trait TradeOracle: Send + Sync {
    async fn extract_intent(&self, request: IntentRequest) -> Result<OracleReply, OracleError>;

    async fn judge_consent(&self, request: ConsentRequest) -> Result<OracleReply, OracleError>;
}

pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    prompts: PromptBook,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>, prompts: PromptBook) -> Self {
        Self { client, prompts }
    }

    async fn ask(&self, system: String, user: String) -> Result<OracleReply, OracleError> {
        // Both tools are always offered: a player may open a new trade while
        // another one is pending, and the negotiation layer decides what counts.
        let request = CompletionRequest {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            tools: vec![intent_tool(), consent_tool()],
        };
        let completion = self
            .client
            .complete(&request)
            .await
            .map_err(|error| OracleError::Unavailable(format!("{error:#}")))?;

        let text = completion.text.trim().to_owned();
        match decode_first(&completion.tool_calls) {
            Ok(call) => Ok(OracleReply { text, call }),
            Err(error) => Err(OracleError::Malformed { text, reason: error.to_string() }),
        }
    }
}

fn prompt_failure(error: anyhow::Error) -> OracleError {
    OracleError::Unavailable(format!("prompt rendering failed: {error:#}"))
}

#[async_trait]
impl TradeOracle for LlmOracle {
    async fn extract_intent(&self, request: IntentRequest) -> Result<OracleReply, OracleError> {
        let system = self.prompts.instructions(&request.persona).map_err(prompt_failure)?;
        let user = self
            .prompts
            .intent_turn(&request.persona, &request.history, &request.stock, &request.utterance)
            .map_err(prompt_failure)?;
        self.ask(system, user).await
    }

    async fn judge_consent(&self, request: ConsentRequest) -> Result<OracleReply, OracleError> {
        let system = self.prompts.instructions(&request.persona).map_err(prompt_failure)?;
        let user = self
            .prompts
            .consent_turn(
                &request.persona,
                &request.history,
                &request.confirmation_prompt,
                &request.utterance,
            )
            .map_err(prompt_failure)?;
        self.ask(system, user).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::{ConsentRequest, IntentRequest, LlmOracle, OracleError, TradeOracle};
    use crate::conversation::{NpcPersona, PromptBook};
    use crate::llm::{ChatRole, Completion, CompletionRequest, LlmClient, ToolCall};
    use crate::tools::{OracleCall, RawIntent};

    struct CannedClient {
        answer: Option<Completion>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl CannedClient {
        fn answering(answer: Completion) -> Self {
            Self { answer: Some(answer), seen: Mutex::new(Vec::new()) }
        }

        fn down() -> Self {
            Self { answer: None, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.seen.lock().expect("seen lock").push(request.clone());
            self.answer.clone().ok_or_else(|| anyhow!("connection refused"))
        }
    }

    fn oracle(client: Arc<CannedClient>) -> LlmOracle {
        LlmOracle::new(client, PromptBook::new().expect("templates"))
    }

    fn intent_request(utterance: &str) -> IntentRequest {
        IntentRequest {
            persona: NpcPersona::default(),
            history: Vec::new(),
            stock: Vec::new(),
            utterance: utterance.to_owned(),
        }
    }

    #[tokio::test]
    async fn intent_tool_calls_are_decoded() {
        let client = Arc::new(CannedClient::answering(Completion {
            text: String::new(),
            tool_calls: vec![ToolCall {
                name: "parse_trade_intent".to_owned(),
                arguments: r#"{"trade_state":"buy","item":"rum","quantity":2}"#.to_owned(),
            }],
        }));

        let reply = oracle(Arc::clone(&client))
            .extract_intent(intent_request("I'll buy 2 rum"))
            .await
            .expect("reply");

        assert_eq!(
            reply.call,
            OracleCall::Intent(RawIntent {
                trade_state: "buy".to_owned(),
                item: "rum".to_owned(),
                quantity: 2,
            })
        );
        let seen = client.seen.lock().expect("seen lock");
        assert_eq!(seen[0].messages[0].role, ChatRole::System);
        assert!(seen[0].messages[1].content.contains("I'll buy 2 rum"));
        assert_eq!(seen[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn consent_prompt_replays_the_question() {
        let client = Arc::new(CannedClient::answering(Completion {
            text: "Aye".to_owned(),
            tool_calls: vec![],
        }));

        let reply = oracle(Arc::clone(&client))
            .judge_consent(ConsentRequest {
                persona: NpcPersona::default(),
                history: Vec::new(),
                confirmation_prompt: "Are ye sure ye want to buy 2 rums?".to_owned(),
                utterance: "maybe".to_owned(),
            })
            .await
            .expect("reply");

        assert_eq!(reply.call, OracleCall::NoTool);
        assert_eq!(reply.text, "Aye");
        let seen = client.seen.lock().expect("seen lock");
        assert!(seen[0].messages[1].content.contains("Are ye sure ye want to buy 2 rums?"));
    }

    #[tokio::test]
    async fn malformed_calls_keep_the_free_text() {
        let client = Arc::new(CannedClient::answering(Completion {
            text: "Arr, what was that?".to_owned(),
            tool_calls: vec![ToolCall {
                name: "steal_ship".to_owned(),
                arguments: "{}".to_owned(),
            }],
        }));

        let error = oracle(client).extract_intent(intent_request("hi")).await.expect_err("bad");

        assert!(matches!(
            error,
            OracleError::Malformed { ref text, .. } if text == "Arr, what was that?"
        ));
    }

    #[tokio::test]
    async fn transport_failures_are_unavailable() {
        let error = oracle(Arc::new(CannedClient::down()))
            .extract_intent(intent_request("hi"))
            .await
            .expect_err("down");

        assert!(matches!(error, OracleError::Unavailable(message) if message.contains("refused")));
    }
}
