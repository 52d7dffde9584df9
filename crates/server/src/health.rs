use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parley_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    npc_id: String,
}

impl HealthState {
    pub fn new(db_pool: DbPool, npc_id: impl Into<String>) -> Self {
        Self { db_pool, npc_id: npc_id.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub merchant: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// The merchant check never degrades the overall status: an empty stash is
/// a playable state.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let merchant = merchant_check(&state.db_pool, &state.npc_id).await;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        database,
        merchant,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn merchant_check(pool: &DbPool, npc_id: &str) -> HealthCheck {
    let stocked = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM inventory WHERE entity_id = ? AND quantity > 0",
    )
    .bind(npc_id)
    .fetch_one(pool)
    .await;

    match stocked {
        Ok(0) => HealthCheck {
            status: "empty",
            detail: format!("npc `{npc_id}` has nothing to sell"),
        },
        Ok(lines) => HealthCheck {
            status: "ready",
            detail: format!("npc `{npc_id}` stocks {lines} item(s)"),
        },
        Err(error) => HealthCheck {
            status: "unknown",
            detail: format!("inventory query failed: {error}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use parley_db::{connect_with_settings, migrations, DemoSeed};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_with_a_stocked_merchant() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeed::load(&pool).await.expect("seed");

        let (status, Json(payload)) = health(State(HealthState::new(pool.clone(), "1"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.merchant.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn empty_merchant_is_reported_but_not_degraded() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) = health(State(HealthState::new(pool.clone(), "1"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.merchant.status, "empty");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState::new(pool, "1"))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
