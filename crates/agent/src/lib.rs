//! The merchant's mouth and ears.
//!
//! A player turn flows through [`runtime::TurnCoordinator`]: the utterance is
//! logged, the [`oracle::TradeOracle`] turns it into at most one tool call, the
//! call is decoded in [`tools`] and normalized, and the negotiation machine in
//! `parley-core` decides what happens. The model never touches stock; it can
//! only propose intents and judge consent.

pub mod audit;
pub mod conversation;
pub mod llm;
pub mod oracle;
pub mod runtime;
pub mod tools;

pub use audit::TracingAuditSink;
pub use conversation::{NpcPersona, PromptBook, FALLBACK_REPLY};
pub use llm::{HttpLlmClient, LlmClient};
pub use oracle::{LlmOracle, OracleError, TradeOracle};
pub use runtime::{CoordinatorParts, TurnCoordinator, TurnError, TurnReply};
