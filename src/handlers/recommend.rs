use crate::abtest::ABAssigner;
use crate::bandit::ThompsonPolicy;
use crate::domain::RecommendationMethod;
use crate::error::{AppError, Result};
use crate::pipeline::{RecommendationPipeline, RecommendedItem};
use crate::similarity::SimilarityRetriever;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub user_id: Uuid,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_k() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub results: Vec<RecommendedItem>,
}

/// POST /recommend - the outward face of the recommendation pipeline
/// (C5): resolves the A/B group (C7), then retrieves and, if the group
/// calls for it, reranks candidates.
pub async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>> {
    if request.k == 0 || request.k > state.config.recommend_k_max {
        return Err(AppError::Validation(format!(
            "k must be between 1 and {}",
            state.config.recommend_k_max
        )));
    }

    let assigner = ABAssigner::new(state.store.clone());
    let use_rl = assigner.should_use_rl(request.user_id).await?;

    let retriever = SimilarityRetriever::new(
        state.store.clone(),
        state.encoder.clone(),
        state.encoder_semaphore.clone(),
        state.config.cache_ttl_secs,
    );
    let policy = ThompsonPolicy::new(state.store.clone(), state.config.bandit);
    let pipeline = RecommendationPipeline::new(state.store.clone(), retriever, policy, state.config.bandit);

    let deadline = Duration::from_secs(state.config.request_timeout_secs);
    let results = match tokio::time::timeout(
        deadline,
        pipeline.recommend(request.user_id, request.k, use_rl, request.offset),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!(user_id = %request.user_id, "recommend deadline exceeded, falling back to similarity order");
            let fallback = tokio::time::timeout(
                deadline,
                pipeline.recommend(request.user_id, request.k, false, request.offset),
            )
            .await
            .map_err(|_| AppError::Transient("recommendation pipeline timed out".into()))??;
            fallback
                .into_iter()
                .map(|mut item| {
                    item.method = RecommendationMethod::Degraded;
                    item
                })
                .collect()
        }
    };

    metrics::counter!("recommend_requests_total").increment(1);
    metrics::histogram!("recommend_result_count").record(results.len() as f64);

    Ok(Json(RecommendResponse { results }))
}
