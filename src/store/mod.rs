//! Abstract persistence boundary. The core never talks to a database
//! directly; every component depends only on this trait.

pub mod memory;
#[cfg(feature = "sql")]
pub mod sqlite;

use crate::domain::{
    ABAssignment, ABTestConfig, BanditStat, CachedRecs, Interaction, Item, RecommendationResult,
    TestResult, TrainingRun, UserProfile,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemoryStore;

/// A delta to apply atomically to a single item's bandit parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct BanditDelta {
    pub delta_alpha: f64,
    pub delta_beta: f64,
}

/// The single persistence interface the core depends on. Every operation
/// that mutates per-item bandit state is a compare-and-swap-style atomic
/// update so that concurrent callers never lose an increment (see the
/// concurrency model: linearizable per item, no global lock).
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;
    async fn load_items(&self) -> Result<Vec<Item>>;
    async fn items_version(&self) -> Result<u64>;

    async fn get_cache(&self, user_id: Uuid) -> Result<Option<CachedRecs>>;
    async fn put_cache(&self, cache: CachedRecs) -> Result<()>;

    async fn get_bandit(&self, item_id: Uuid) -> Result<BanditStat>;
    async fn update_bandit(&self, item_id: Uuid, delta: BanditDelta) -> Result<BanditStat>;
    async fn batch_update_bandit(
        &self,
        deltas: Vec<(Uuid, BanditDelta)>,
    ) -> Result<Vec<(Uuid, BanditStat)>>;
    async fn increment_impression(&self, item_id: Uuid) -> Result<()>;
    async fn increment_click(&self, item_id: Uuid) -> Result<()>;

    async fn insert_interaction(&self, interaction: Interaction) -> Result<()>;
    async fn read_interactions(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Interaction>>;
    async fn mark_absorbed_batch(&self, user_id: Uuid, item_id: Uuid, ts: DateTime<Utc>) -> Result<()>;

    async fn insert_result(&self, result: RecommendationResult) -> Result<()>;
    async fn read_results_for_group(
        &self,
        test_id: Uuid,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RecommendationResult>>;

    async fn insert_training_run(&self, run: TrainingRun) -> Result<()>;

    async fn ab_active_config(&self) -> Result<Option<ABTestConfig>>;
    async fn ab_insert_config(&self, config: ABTestConfig) -> Result<()>;
    async fn ab_end_config(&self, test_id: Uuid, winner: Option<crate::domain::ABGroup>) -> Result<()>;
    async fn ab_get_assignment(&self, test_id: Uuid, user_id: Uuid) -> Result<Option<ABAssignment>>;
    async fn ab_get_or_insert_assignment(
        &self,
        test_id: Uuid,
        user_id: Uuid,
        group: crate::domain::ABGroup,
    ) -> Result<ABAssignment>;
    async fn ab_users_in_group(
        &self,
        test_id: Uuid,
        group: crate::domain::ABGroup,
    ) -> Result<Vec<Uuid>>;
    async fn ab_insert_result(&self, result: TestResult) -> Result<()>;
}
