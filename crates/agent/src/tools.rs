//! The two functions the model may call, and the closed decoding of its calls.
//!
//! Nothing downstream ever branches on a tool name: a call is decoded into
//! [`OracleCall`] here or rejected as malformed.

use serde::Deserialize;
use serde_json::json;

use parley_core::domain::trade::{ConsentJudgment, TradeDirection, TradeIntent};
use parley_core::errors::ApplicationError;
use parley_core::intent::{normalize, normalize_quantity};

use crate::llm::{ToolCall, ToolSpec};

pub const PARSE_TRADE_INTENT: &str = "parse_trade_intent";
pub const TRADE_CONSENT: &str = "trade_consent";

pub fn intent_tool() -> ToolSpec {
    ToolSpec {
        name: PARSE_TRADE_INTENT,
        description: "Record that the player clearly wants to buy an item from you or sell an \
                      item to you. Use the singular item name. Quantity must be a number; use 0 \
                      if the player did not say how many.",
        parameters: json!({
            "type": "object",
            "properties": {
                "trade_state": {
                    "type": "string",
                    "enum": ["buy", "sell", "no_trade"],
                    "description": "Direction from the player's point of view."
                },
                "item": {
                    "type": "string",
                    "description": "Singular item name, e.g. 'apple' or 'rum'."
                },
                "quantity": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "How many. 0 when the player was vague ('some rum')."
                }
            },
            "required": ["trade_state", "item", "quantity"],
            "additionalProperties": false
        }),
    }
}

pub fn consent_tool() -> ToolSpec {
    ToolSpec {
        name: TRADE_CONSENT,
        description: "Classify the player's answer to the trade confirmation you asked for.",
        parameters: json!({
            "type": "object",
            "properties": {
                "consent": {
                    "type": "string",
                    "enum": ["yes", "no", "unsure"]
                },
                "quantity": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Only if the player named an amount in this answer."
                }
            },
            "required": ["consent"],
            "additionalProperties": false
        }),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawIntent {
    pub trade_state: String,
    pub item: String,
    pub quantity: i64,
}

impl RawIntent {
    /// Domain failures (blank name, negative quantity) come back as
    /// `ApplicationError::Domain`; an unknown direction is malformed output.
    pub fn normalize(&self) -> Result<TradeIntent, ApplicationError> {
        let direction = self
            .trade_state
            .parse::<TradeDirection>()
            .map_err(ApplicationError::OracleMalformedOutput)?;
        Ok(normalize(direction, &self.item, self.quantity)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawConsent {
    pub consent: String,
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl RawConsent {
    pub fn judgment(&self) -> Result<(ConsentJudgment, Option<u32>), ApplicationError> {
        let judgment = self
            .consent
            .parse::<ConsentJudgment>()
            .map_err(ApplicationError::OracleMalformedOutput)?;
        let quantity = self.quantity.map(normalize_quantity).transpose()?.filter(|q| *q > 0);
        Ok((judgment, quantity))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleCall {
    Intent(RawIntent),
    Consent(RawConsent),
    NoTool,
}

pub fn decode_tool_call(name: &str, arguments: &str) -> Result<OracleCall, ApplicationError> {
    let arguments = if arguments.trim().is_empty() { "{}" } else { arguments.trim() };
    let malformed = |error: serde_json::Error| {
        ApplicationError::OracleMalformedOutput(format!("`{name}` arguments: {error}"))
    };
    match name {
        PARSE_TRADE_INTENT => {
            serde_json::from_str(arguments).map(OracleCall::Intent).map_err(malformed)
        }
        TRADE_CONSENT => {
            serde_json::from_str(arguments).map(OracleCall::Consent).map_err(malformed)
        }
        other => Err(ApplicationError::OracleMalformedOutput(format!("unknown tool `{other}`"))),
    }
}

/// The first call decides the turn; models occasionally repeat a call.
pub fn decode_first(calls: &[ToolCall]) -> Result<OracleCall, ApplicationError> {
    match calls.first() {
        Some(call) => decode_tool_call(&call.name, &call.arguments),
        None => Ok(OracleCall::NoTool),
    }
}
