use crate::error::Result;
use crate::state::AppState;
use crate::trainer::{BatchTrainer, TrainingSummary};
use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
}

/// POST /train - kicks off a batch retraining run (C6) over unabsorbed
/// interactions in the requested (or default) window.
pub async fn train_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainingSummary>> {
    let days = request.days.unwrap_or(state.config.trainer.default_days);
    let learning_rate = request
        .learning_rate
        .unwrap_or(state.config.trainer.default_learning_rate);

    let trainer = BatchTrainer::new(state.store.clone());
    let summary = trainer.train(days, learning_rate).await?;

    tracing::info!(
        run_id = %summary.run_id,
        interactions = summary.interactions_processed,
        items_updated = summary.items_updated,
        "batch training run complete"
    );

    Ok(Json(summary))
}
