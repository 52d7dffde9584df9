//! Player-facing JSON routes.
//!
//! - `POST /npc/chat`                  one player turn, `{"message": "..."}`
//! - `POST /npc/chat/reset`            drop any pending offer (new chat session)
//! - `GET  /api/inventory/{entity_id}` what an entity holds

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parley_agent::{TurnCoordinator, TurnError};
use parley_core::domain::entity::{ConversationKey, EntityId};
use parley_core::errors::{ApplicationError, InterfaceError};
use parley_core::ledger::InventoryLedger;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    coordinator: Arc<TurnCoordinator>,
    ledger: Arc<dyn InventoryLedger>,
    conversation: ConversationKey,
    /// One in-flight turn per conversation.
    turns: Arc<Mutex<()>>,
}

impl ChatState {
    pub fn new(
        coordinator: Arc<TurnCoordinator>,
        ledger: Arc<dyn InventoryLedger>,
        conversation: ConversationKey,
    ) -> Self {
        Self { coordinator, ledger, conversation, turns: Arc::new(Mutex::new(())) }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default, alias = "userprompt")]
    pub message: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    pub text: String,
    pub state: &'static str,
    pub correlation_id: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
    pub dropped_offer: bool,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct InventoryLine {
    pub name: String,
    pub quantity: u32,
    pub price: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct InventoryResponse {
    pub entity_id: String,
    pub inventory: Vec<InventoryLine>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type ApiFailure = (StatusCode, Json<ApiError>);

pub fn router(state: ChatState) -> Router {
    Router::new()
        .route("/npc/chat", post(chat))
        .route("/npc/chat/reset", post(reset))
        .route("/api/inventory/{entity_id}", get(inventory))
        .with_state(state)
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiFailure> {
    let _turn = state.turns.lock().await;
    match state.coordinator.handle_turn(&state.conversation, &body.message).await {
        Ok(reply) => Ok(Json(ChatResponse {
            text: reply.text,
            state: reply.state.as_str(),
            correlation_id: reply.correlation_id,
        })),
        Err(TurnError::EmptyUtterance) => Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "Please provide a message".to_string(), correlation_id: None }),
        )),
        Err(TurnError::Failed(failure)) => Err(turn_failure("chat", failure)),
    }
}

pub async fn reset(State(state): State<ChatState>) -> Result<Json<ResetResponse>, ApiFailure> {
    let _turn = state.turns.lock().await;
    match state.coordinator.reset(&state.conversation).await {
        Ok(dropped_offer) => Ok(Json(ResetResponse { reset: true, dropped_offer })),
        Err(failure) => Err(turn_failure("reset", failure)),
    }
}

pub async fn inventory(
    Path(entity_id): Path<String>,
    State(state): State<ChatState>,
) -> Result<Json<InventoryResponse>, ApiFailure> {
    let holdings = state
        .ledger
        .holdings(&EntityId::new(entity_id.trim()))
        .await
        .map_err(|failure| turn_failure("inventory", failure))?;

    if holdings.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: "No inventory found for this entity.".to_string(),
                correlation_id: None,
            }),
        ));
    }

    let inventory = holdings
        .into_iter()
        .map(|holding| InventoryLine {
            name: holding.item.as_str().to_string(),
            quantity: holding.quantity,
            price: format!("{:.2}", holding.unit_price),
        })
        .collect();
    Ok(Json(InventoryResponse { entity_id, inventory }))
}

fn turn_failure(route: &'static str, failure: ApplicationError) -> ApiFailure {
    let interface = failure.into_interface(Uuid::new_v4().to_string());
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(
            event_name = "http.request_failed",
            correlation_id = %interface.correlation_id(),
            route,
            error = %interface,
            "request failed"
        );
    } else {
        warn!(
            event_name = "http.request_rejected",
            correlation_id = %interface.correlation_id(),
            route,
            error = %interface,
            "request rejected"
        );
    }

    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            correlation_id: Some(interface.correlation_id().to_string()),
        }),
    )
}
