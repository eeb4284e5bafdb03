//! In-memory `Store` implementation. Per-item bandit state is sharded by
//! `dashmap` so that updates to different items never contend on a single
//! lock; updates to the *same* item are serialized by that item's shard
//! lock, giving the linearizable-per-item guarantee the pipeline and
//! ingest path rely on.
use super::{BanditDelta, Store};
use crate::domain::{
    ABAssignment, ABGroup, ABTestConfig, ABTestStatus, BanditStat, CachedRecs, Interaction, Item,
    RecommendationResult, TestResult, TrainingRun, UserProfile,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    profiles: DashMap<Uuid, UserProfile>,
    items: DashMap<Uuid, Item>,
    items_version: AtomicU64,
    cache: DashMap<Uuid, CachedRecs>,
    bandit: DashMap<Uuid, BanditStat>,
    interactions: RwLock<Vec<Interaction>>,
    results: RwLock<Vec<RecommendationResult>>,
    training_runs: RwLock<Vec<TrainingRun>>,
    active_test: RwLock<Option<ABTestConfig>>,
    ended_tests: DashMap<Uuid, ABTestConfig>,
    assignments: DashMap<(Uuid, Uuid), ABAssignment>,
    test_results: DashMap<Uuid, TestResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item directly, bumping the items version so cached
    /// similarity lists are invalidated.
    pub fn put_item(&self, item: Item) {
        self.items.insert(item.item_id, item);
        self.items_version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn put_profile(&self, profile: UserProfile) {
        self.profiles.insert(profile.user_id, profile);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.profiles.get(&user_id).map(|r| r.clone()))
    }

    async fn load_items(&self) -> Result<Vec<Item>> {
        Ok(self.items.iter().map(|r| r.value().clone()).collect())
    }

    async fn items_version(&self) -> Result<u64> {
        Ok(self.items_version.load(Ordering::SeqCst))
    }

    async fn get_cache(&self, user_id: Uuid) -> Result<Option<CachedRecs>> {
        Ok(self.cache.get(&user_id).map(|r| r.clone()))
    }

    async fn put_cache(&self, cache: CachedRecs) -> Result<()> {
        self.cache.insert(cache.user_id, cache);
        Ok(())
    }

    async fn get_bandit(&self, item_id: Uuid) -> Result<BanditStat> {
        Ok(self
            .bandit
            .get(&item_id)
            .map(|r| *r)
            .unwrap_or_else(BanditStat::new_prior))
    }

    async fn update_bandit(&self, item_id: Uuid, delta: BanditDelta) -> Result<BanditStat> {
        let mut entry = self.bandit.entry(item_id).or_insert_with(BanditStat::new_prior);
        apply_delta(&mut entry, delta)?;
        Ok(*entry)
    }

    async fn batch_update_bandit(
        &self,
        deltas: Vec<(Uuid, BanditDelta)>,
    ) -> Result<Vec<(Uuid, BanditStat)>> {
        // Validate first so the batch is all-or-nothing.
        for (_, delta) in &deltas {
            if delta.delta_alpha < 0.0 || delta.delta_beta < 0.0 {
                return Err(AppError::Invariant(
                    "batch update must not decrease alpha or beta".into(),
                ));
            }
        }
        let mut updated = Vec::with_capacity(deltas.len());
        for (item_id, delta) in deltas {
            let mut entry = self.bandit.entry(item_id).or_insert_with(BanditStat::new_prior);
            apply_delta(&mut entry, delta)?;
            updated.push((item_id, *entry));
        }
        Ok(updated)
    }

    async fn increment_impression(&self, item_id: Uuid) -> Result<()> {
        let mut entry = self.bandit.entry(item_id).or_insert_with(BanditStat::new_prior);
        entry.total_impressions += 1;
        entry.recompute();
        Ok(())
    }

    async fn increment_click(&self, item_id: Uuid) -> Result<()> {
        let mut entry = self.bandit.entry(item_id).or_insert_with(BanditStat::new_prior);
        entry.total_clicks += 1;
        entry.recompute();
        Ok(())
    }

    async fn insert_interaction(&self, interaction: Interaction) -> Result<()> {
        self.interactions.write().await.push(interaction);
        Ok(())
    }

    async fn read_interactions(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Interaction>> {
        Ok(self
            .interactions
            .read()
            .await
            .iter()
            .filter(|i| i.timestamp >= since && i.timestamp <= until)
            .cloned()
            .collect())
    }

    async fn mark_absorbed_batch(&self, user_id: Uuid, item_id: Uuid, ts: DateTime<Utc>) -> Result<()> {
        let mut guard = self.interactions.write().await;
        for interaction in guard.iter_mut() {
            if interaction.user_id == user_id
                && interaction.item_id == item_id
                && interaction.timestamp == ts
            {
                interaction.absorbed_batch = true;
            }
        }
        Ok(())
    }

    async fn insert_result(&self, result: RecommendationResult) -> Result<()> {
        self.results.write().await.push(result);
        Ok(())
    }

    async fn read_results_for_group(
        &self,
        _test_id: Uuid,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RecommendationResult>> {
        Ok(self
            .results
            .read()
            .await
            .iter()
            .filter(|r| {
                user_ids.contains(&r.user_id) && r.created_at >= since && r.created_at <= until
            })
            .cloned()
            .collect())
    }

    async fn insert_training_run(&self, run: TrainingRun) -> Result<()> {
        self.training_runs.write().await.push(run);
        Ok(())
    }

    async fn ab_active_config(&self) -> Result<Option<ABTestConfig>> {
        Ok(self.active_test.read().await.clone())
    }

    async fn ab_insert_config(&self, config: ABTestConfig) -> Result<()> {
        let mut active = self.active_test.write().await;
        if active.is_some() {
            return Err(AppError::Conflict("an A/B test is already active".into()));
        }
        *active = Some(config);
        Ok(())
    }

    async fn ab_end_config(&self, test_id: Uuid, winner: Option<ABGroup>) -> Result<()> {
        let mut active = self.active_test.write().await;
        match active.as_mut() {
            Some(cfg) if cfg.test_id == test_id => {
                cfg.status = ABTestStatus::Ended;
                cfg.end = Some(Utc::now());
                cfg.winner = winner;
                self.ended_tests.insert(test_id, cfg.clone());
                *active = None;
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("no active test {test_id}"))),
        }
    }

    async fn ab_get_assignment(&self, test_id: Uuid, user_id: Uuid) -> Result<Option<ABAssignment>> {
        Ok(self.assignments.get(&(test_id, user_id)).map(|r| r.clone()))
    }

    async fn ab_get_or_insert_assignment(
        &self,
        test_id: Uuid,
        user_id: Uuid,
        group: ABGroup,
    ) -> Result<ABAssignment> {
        let entry = self
            .assignments
            .entry((test_id, user_id))
            .or_insert_with(|| ABAssignment {
                test_id,
                user_id,
                group,
                assigned_at: Utc::now(),
            });
        Ok(entry.clone())
    }

    async fn ab_users_in_group(&self, test_id: Uuid, group: ABGroup) -> Result<Vec<Uuid>> {
        Ok(self
            .assignments
            .iter()
            .filter(|r| r.key().0 == test_id && r.value().group == group)
            .map(|r| r.key().1)
            .collect())
    }

    async fn ab_insert_result(&self, result: TestResult) -> Result<()> {
        self.test_results.insert(result.test_id, result);
        Ok(())
    }
}

/// Apply a non-negative delta to both parameters, refusing to let either
/// drop below its prior -- the store-level invariant backing C3.
fn apply_delta(stat: &mut BanditStat, delta: BanditDelta) -> Result<()> {
    if delta.delta_alpha < 0.0 || delta.delta_beta < 0.0 {
        return Err(AppError::Invariant(
            "bandit update must not decrease alpha or beta".into(),
        ));
    }
    stat.alpha += delta.delta_alpha;
    stat.beta += delta.delta_beta;
    if stat.alpha < BanditStat::PRIOR_ALPHA || stat.beta < BanditStat::PRIOR_BETA {
        return Err(AppError::Invariant(
            "bandit parameters fell below their priors".into(),
        ));
    }
    stat.recompute();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SkillLevel;

    fn sample_item() -> Item {
        Item {
            item_id: Uuid::new_v4(),
            title: "demo".into(),
            description: "a demo project".into(),
            domain_tag: "web".into(),
            complexity_level: SkillLevel::Beginner,
            embedding: crate::domain::Embedding::new(vec![1.0; crate::domain::EMBEDDING_DIM]),
        }
    }

    #[tokio::test]
    async fn bandit_defaults_to_prior() {
        let store = MemoryStore::new();
        let stat = store.get_bandit(Uuid::new_v4()).await.unwrap();
        assert_eq!(stat.alpha, BanditStat::PRIOR_ALPHA);
        assert_eq!(stat.beta, BanditStat::PRIOR_BETA);
    }

    #[tokio::test]
    async fn update_bandit_accumulates() {
        let store = MemoryStore::new();
        let item_id = Uuid::new_v4();
        store
            .update_bandit(item_id, BanditDelta { delta_alpha: 9.5, delta_beta: 0.0 })
            .await
            .unwrap();
        store
            .update_bandit(item_id, BanditDelta { delta_alpha: 31.5, delta_beta: 0.0 })
            .await
            .unwrap();
        let stat = store
            .update_bandit(item_id, BanditDelta { delta_alpha: 0.0, delta_beta: 3.8 })
            .await
            .unwrap();

        assert!((stat.alpha - 43.0).abs() < 1e-9);
        assert!((stat.beta - 5.8).abs() < 1e-9);
        assert!((stat.estimated_quality - 0.8811).abs() < 1e-3);
    }

    #[tokio::test]
    async fn negative_delta_rejected() {
        let store = MemoryStore::new();
        let item_id = Uuid::new_v4();
        let err = store
            .update_bandit(item_id, BanditDelta { delta_alpha: -1.0, delta_beta: 0.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Invariant(_)));
    }

    #[tokio::test]
    async fn items_version_bumps_on_insert() {
        let store = MemoryStore::new();
        let v0 = store.items_version().await.unwrap();
        store.put_item(sample_item());
        let v1 = store.items_version().await.unwrap();
        assert!(v1 > v0);
    }

    #[tokio::test]
    async fn ab_assignment_is_idempotent() {
        let store = MemoryStore::new();
        let test_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let first = store
            .ab_get_or_insert_assignment(test_id, user_id, ABGroup::Treatment)
            .await
            .unwrap();
        let second = store
            .ab_get_or_insert_assignment(test_id, user_id, ABGroup::Control)
            .await
            .unwrap();
        assert_eq!(first.group, second.group);
    }

    #[tokio::test]
    async fn only_one_active_test_at_a_time() {
        let store = MemoryStore::new();
        let cfg = ABTestConfig {
            test_id: Uuid::new_v4(),
            test_name: "t1".into(),
            status: ABTestStatus::Active,
            control_pct: 50,
            start: Utc::now(),
            end: None,
            winner: None,
        };
        store.ab_insert_config(cfg.clone()).await.unwrap();
        let second = ABTestConfig {
            test_id: Uuid::new_v4(),
            ..cfg
        };
        let err = store.ab_insert_config(second).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
