use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{Value, json};
use tracing::warn;

use crate::infra::app_state::AppState;

/// Liveness plus a store round-trip. Answers 503 when the store is down.
pub async fn health_handler(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut health = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "jobs": { "tracked": state.jobs.len() },
            "assetstore": { "exists": state.config.assetstore_dir.exists() },
        }
    });

    let store = if state.postgres.is_some() { "postgres" } else { "memory" };
    match state.unit_of_work.users.count_users().await {
        Ok(users) => {
            health["checks"]["database"] = json!({
                "status": "healthy",
                "store": store,
                "users": users,
            });
        }
        Err(e) => {
            warn!("health check failed: {e}");
            health["checks"]["database"] = json!({
                "status": "unhealthy",
                "store": store,
                "error": e.to_string(),
            });
            health["status"] = json!("unhealthy");
            return Err((StatusCode::SERVICE_UNAVAILABLE, Json(health)));
        }
    }

    if let Some(db) = &state.postgres {
        let pool = db.pool_stats();
        health["checks"]["database"]["pool"] = json!({
            "size": pool.size,
            "idle": pool.idle,
            "max_size": pool.max_size,
        });
    }

    Ok(Json(health))
}
