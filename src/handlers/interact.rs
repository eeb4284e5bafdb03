use crate::domain::{Interaction, InteractionKind};
use crate::error::{AppError, Result};
use crate::ingest::InteractionIngest;
use crate::state::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct InteractRequest {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub kind: InteractionKind,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub duration_s: Option<f64>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct InteractResponse {
    pub reward: f64,
    pub updated: bool,
}

/// POST /interact - the single entry point for interaction events (C9).
pub async fn interact_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InteractRequest>,
) -> Result<Json<InteractResponse>> {
    if let Some(duration) = request.duration_s {
        if duration < 0.0 {
            return Err(AppError::Validation("duration_s must not be negative".into()));
        }
    }

    let interaction = Interaction {
        user_id: request.user_id,
        item_id: request.item_id,
        kind: request.kind,
        position: request.position,
        duration_s: request.duration_s,
        timestamp: Utc::now(),
        session_id: request.session_id,
        absorbed_realtime: false,
        absorbed_batch: false,
    };

    let ingest = InteractionIngest::new(state.store.clone());
    let outcome = ingest.record(interaction).await?;

    metrics::counter!("interactions_total", "kind" => format!("{:?}", request.kind)).increment(1);

    Ok(Json(InteractResponse {
        reward: outcome.reward,
        updated: outcome.updated,
    }))
}
