//! What the NPC says: prompt assembly for the oracle and the fixed in-character
//! lines for every negotiation outcome.

use anyhow::{Context as _, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};

use parley_core::domain::entity::{ConversationKey, Entity};
use parley_core::domain::item::{Holding, ItemKind};
use parley_core::domain::trade::{TradeDirection, TradeIntent, TransferReceipt};
use parley_core::errors::DomainError;
use parley_core::negotiation::NegotiationEmit;
use parley_core::transcript::{Speaker, TranscriptEntry};

const PERSONA: &str = "persona.tera";
const INTENT_TURN: &str = "intent_turn.tera";
const CONSENT_TURN: &str = "consent_turn.tera";

pub const FALLBACK_REPLY: &str = "Arrr, the sea wind swallowed yer words. Say that again, matey?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NpcPersona {
    pub name: String,
    pub role: String,
}

impl NpcPersona {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self { name: name.into(), role: role.into() }
    }

    pub fn from_entity(entity: &Entity) -> Self {
        let role = entity.persona.clone().unwrap_or_else(|| entity.role.as_str().to_owned());
        Self::new(entity.name.clone(), role)
    }
}

impl Default for NpcPersona {
    fn default() -> Self {
        Self::new("Captain Barnacle", "pirate merchant")
    }
}

#[derive(Serialize)]
struct HistoryLine<'a> {
    speaker: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct StockLine<'a> {
    item: &'a str,
    quantity: u32,
    price: String,
}

pub struct PromptBook {
    tera: Tera,
}

impl PromptBook {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (PERSONA, include_str!("../../../templates/prompts/persona.tera")),
            (INTENT_TURN, include_str!("../../../templates/prompts/intent_turn.tera")),
            (CONSENT_TURN, include_str!("../../../templates/prompts/consent_turn.tera")),
        ])
        .context("failed to load prompt templates")?;
        Ok(Self { tera })
    }

    pub fn instructions(&self, persona: &NpcPersona) -> Result<String> {
        let mut context = Context::new();
        context.insert("npc_name", &persona.name);
        context.insert("npc_role", &persona.role);
        self.render(PERSONA, &context)
    }

    pub fn intent_turn(
        &self,
        persona: &NpcPersona,
        history: &[TranscriptEntry],
        stock: &[Holding],
        utterance: &str,
    ) -> Result<String> {
        let stock: Vec<StockLine<'_>> = stock
            .iter()
            .map(|holding| StockLine {
                item: holding.item.as_str(),
                quantity: holding.quantity,
                price: gold(holding.unit_price),
            })
            .collect();

        let mut context = Context::new();
        context.insert("history", &history_lines(persona, history));
        context.insert("stock", &stock);
        context.insert("utterance", utterance);
        self.render(INTENT_TURN, &context)
    }

    pub fn consent_turn(
        &self,
        persona: &NpcPersona,
        history: &[TranscriptEntry],
        confirmation_prompt: &str,
        utterance: &str,
    ) -> Result<String> {
        let mut context = Context::new();
        context.insert("history", &history_lines(persona, history));
        context.insert("confirmation_prompt", confirmation_prompt);
        context.insert("utterance", utterance);
        self.render(CONSENT_TURN, &context)
    }

    fn render(&self, template: &str, context: &Context) -> Result<String> {
        let rendered = self
            .tera
            .render(template, context)
            .with_context(|| format!("failed to render prompt `{template}`"))?;
        Ok(rendered.trim().to_owned())
    }
}

fn history_lines<'a>(
    persona: &'a NpcPersona,
    history: &'a [TranscriptEntry],
) -> Vec<HistoryLine<'a>> {
    history
        .iter()
        .map(|entry| HistoryLine {
            speaker: match entry.speaker {
                Speaker::Player => "Player",
                Speaker::Npc => persona.name.as_str(),
            },
            text: entry.text.as_str(),
        })
        .collect()
}

fn gold(amount: Decimal) -> String {
    format!("{amount:.2}")
}

/// "1 apple", "3 apples". Mirrors the trailing-`s` normalization in reverse.
fn counted(quantity: u32, item: &ItemKind) -> String {
    if quantity == 1 {
        format!("1 {item}")
    } else {
        format!("{quantity} {item}s")
    }
}

fn verb(direction: TradeDirection) -> &'static str {
    match direction {
        TradeDirection::Sell => "sell",
        TradeDirection::Buy | TradeDirection::NoTrade => "buy",
    }
}

/// The question put to the player before a trade. A vague amount is never
/// proposed as "0 apples"; the player is asked to name one instead.
pub fn confirmation_question(intent: &TradeIntent, unit_price: Option<Decimal>) -> String {
    if intent.is_vague() {
        return quantity_question(intent);
    }
    let goods = counted(intent.quantity, &intent.item);
    match unit_price {
        Some(price) => format!(
            "Are ye sure ye want to {} {goods} for {} gold? Let's make a deal!",
            verb(intent.direction),
            gold(price * Decimal::from(intent.quantity)),
        ),
        None => format!(
            "Are ye sure ye want to {} {goods}? Let's make a deal!",
            verb(intent.direction)
        ),
    }
}

pub fn quantity_question(intent: &TradeIntent) -> String {
    format!(
        "How many {}s do ye want to {}? Name a number and we have a deal!",
        intent.item,
        verb(intent.direction)
    )
}

/// The fixed line for an outcome that does not need a catalog lookup.
/// Questions (`ConfirmationRequested`, `QuantityRequested`) return `None`.
pub fn outcome_line(key: &ConversationKey, emit: &NegotiationEmit) -> Option<String> {
    let line = match emit {
        NegotiationEmit::ConfirmationRequested(_) | NegotiationEmit::QuantityRequested(_) => {
            return None
        }
        NegotiationEmit::TradeExecuted(receipt) => executed_line(key, receipt),
        NegotiationEmit::TradeRefused { intent, reason } => refused_line(intent, reason),
        NegotiationEmit::ClarificationRequested(_) => {
            "I'm not sure if you're ready to trade. Let me know when you are!".to_owned()
        }
        NegotiationEmit::TradeCancelled(_) => "Understood. The trade has been cancelled.".to_owned(),
        NegotiationEmit::NegotiationAbandoned(_) => {
            "Arrr, ye keep changin' yer mind. Come back when ye know what ye want!".to_owned()
        }
    };
    Some(line)
}

fn executed_line(key: &ConversationKey, receipt: &TransferReceipt) -> String {
    let goods = counted(receipt.order.quantity, &receipt.order.item);
    let total = gold(receipt.total);
    if receipt.order.to == key.player {
        format!("Ye bought {goods} for {total} gold. Pleasure doing business, matey!")
    } else {
        format!("Sold {goods} for {total} gold. Ye drive a hard bargain!")
    }
}

fn refused_line(intent: &TradeIntent, reason: &DomainError) -> String {
    match (reason, intent.direction) {
        (DomainError::InsufficientStock { item, available, .. }, TradeDirection::Sell) => format!(
            "Ye trying to cheat me? Ye only got {}! Don't play tricks on me!",
            counted(*available, item)
        ),
        (DomainError::InsufficientStock { item, available, .. }, _) => format!(
            "Arrr, I only got {} in me stash! Pick somethin' else!",
            counted(*available, item)
        ),
        (DomainError::UnknownItem(item), _) => {
            format!("Arrr, I ain't got no '{item}' in me ledgers!")
        }
        _ => "Arrr, that trade be cursed. Let's start over, matey.".to_owned(),
    }
}
