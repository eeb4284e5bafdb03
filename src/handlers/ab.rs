use crate::abtest::{significance_test, SignificanceResult};
use crate::domain::{ABGroup, ABTestConfig, ABTestStatus, InteractionKind, TestResult};
use crate::error::{AppError, Result};
use crate::reward::reward;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StartTestRequest {
    pub test_name: String,
    #[serde(default)]
    pub control_pct: Option<u8>,
    #[serde(default)]
    pub duration_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StartTestResponse {
    pub test_id: Uuid,
}

/// POST /ab/start - opens a new test (C7). Only one test may be active at
/// a time; starting a second one is a conflict, not a silent replace.
pub async fn ab_start_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartTestRequest>,
) -> Result<Json<StartTestResponse>> {
    if state.store.ab_active_config().await?.is_some() {
        return Err(AppError::Conflict("an A/B test is already active".into()));
    }

    let control_pct = request.control_pct.unwrap_or(state.config.ab.default_control_pct);
    if control_pct > 100 {
        return Err(AppError::Validation("control_pct must be between 0 and 100".into()));
    }

    let test_id = Uuid::new_v4();
    let start = Utc::now();
    let end = request.duration_days.map(|d| start + chrono::Duration::days(d));

    state
        .store
        .ab_insert_config(ABTestConfig {
            test_id,
            test_name: request.test_name,
            status: ABTestStatus::Active,
            control_pct,
            start,
            end,
            winner: None,
        })
        .await?;

    tracing::info!(test_id = %test_id, control_pct, "A/B test started");
    Ok(Json(StartTestResponse { test_id }))
}

/// Per-group CTR/engagement/reward summary (SPEC_FULL §4.8).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GroupMetrics {
    pub n: u64,
    pub clicks: u64,
    pub bookmarks: u64,
    pub interactions: u64,
    pub ctr: f64,
    pub engagement: f64,
    pub avg_reward: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub test_id: Uuid,
    pub test_name: String,
    pub control: GroupMetrics,
    pub treatment: GroupMetrics,
    pub significance: SignificanceResult,
}

/// GET /ab/dashboard - live CTR and significance (C8) for the active test.
pub async fn ab_dashboard_handler(State(state): State<Arc<AppState>>) -> Result<Json<DashboardResponse>> {
    let config = state
        .store
        .ab_active_config()
        .await?
        .ok_or_else(|| AppError::NotFound("no active A/B test".into()))?;

    let since = config.start;
    let until = config.end.unwrap_or_else(Utc::now).min(Utc::now());

    let control = group_counts(&state, config.test_id, ABGroup::Control, since, until).await?;
    let treatment = group_counts(&state, config.test_id, ABGroup::Treatment, since, until).await?;

    let significance =
        significance_test(control.n, control.clicks, treatment.n, treatment.clicks, &state.config.ab);

    Ok(Json(DashboardResponse {
        test_id: config.test_id,
        test_name: config.test_name,
        control,
        treatment,
        significance,
    }))
}

/// `n` (impressions) comes from recommendation results served to the
/// group; `clicks`/`bookmarks`/`interactions`/`avg_reward` come from
/// interaction rows by users in the group over the same window. Two
/// separate reads because `Store` tracks them in separate tables.
async fn group_counts(
    state: &AppState,
    test_id: Uuid,
    group: ABGroup,
    since: chrono::DateTime<Utc>,
    until: chrono::DateTime<Utc>,
) -> Result<GroupMetrics> {
    let user_ids = state.store.ab_users_in_group(test_id, group).await?;
    if user_ids.is_empty() {
        return Ok(GroupMetrics {
            n: 0,
            clicks: 0,
            bookmarks: 0,
            interactions: 0,
            ctr: 0.0,
            engagement: 0.0,
            avg_reward: 0.0,
        });
    }

    let results = state
        .store
        .read_results_for_group(test_id, &user_ids, since, until)
        .await?;
    let n = results.len() as u64;

    let user_set: HashSet<Uuid> = user_ids.into_iter().collect();
    let all_interactions = state.store.read_interactions(since, until).await?;
    let group_interactions: Vec<_> = all_interactions
        .iter()
        .filter(|i| user_set.contains(&i.user_id))
        .collect();

    let clicks = group_interactions
        .iter()
        .filter(|i| i.kind == InteractionKind::Click)
        .count() as u64;
    let bookmarks = group_interactions
        .iter()
        .filter(|i| i.kind == InteractionKind::Bookmark)
        .count() as u64;
    let non_impressions: Vec<_> = group_interactions
        .iter()
        .filter(|i| i.kind != InteractionKind::Impression)
        .collect();
    let interactions = non_impressions.len() as u64;

    let ctr = if n > 0 { clicks as f64 / n as f64 } else { 0.0 };
    let engagement = if n > 0 { interactions as f64 / n as f64 } else { 0.0 };
    let avg_reward = if interactions > 0 {
        non_impressions.iter().map(|i| reward(i)).sum::<f64>() / interactions as f64
    } else {
        0.0
    };

    Ok(GroupMetrics {
        n,
        clicks,
        bookmarks,
        interactions,
        ctr,
        engagement,
        avg_reward,
    })
}

/// POST /ab/end/:test_id - closes the test and persists the final
/// significance verdict.
pub async fn ab_end_handler(
    State(state): State<Arc<AppState>>,
    Path(test_id): Path<Uuid>,
) -> Result<Json<TestResult>> {
    let config = state
        .store
        .ab_active_config()
        .await?
        .filter(|c| c.test_id == test_id)
        .ok_or_else(|| AppError::NotFound("no active A/B test with that id".into()))?;

    let since = config.start;
    let until = Utc::now();
    let control = group_counts(&state, test_id, ABGroup::Control, since, until).await?;
    let treatment = group_counts(&state, test_id, ABGroup::Treatment, since, until).await?;

    let significance =
        significance_test(control.n, control.clicks, treatment.n, treatment.clicks, &state.config.ab);

    state.store.ab_end_config(test_id, significance.winner).await?;

    let result = TestResult {
        test_id,
        z: significance.z,
        p_value: significance.p_value,
        effect_size: significance.effect_size,
        ctr_control: significance.ctr_control,
        ctr_treatment: significance.ctr_treatment,
        n_control: control.n,
        n_treatment: treatment.n,
        winner: significance.winner,
        recommendation: significance.reason.to_string(),
        ended_at: until,
    };
    state.store.ab_insert_result(result.clone()).await?;

    tracing::info!(test_id = %test_id, winner = ?result.winner, "A/B test ended");
    Ok(Json(result))
}
