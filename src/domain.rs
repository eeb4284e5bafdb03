//! Core entities shared by every component: profiles, items, bandit state,
//! interactions, recommendation output, and A/B testing records.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

/// Snapshot of user attributes used to build a retrieval query. Immutable
/// per request; fields are rendered into a deterministic query string by
/// `UserProfile::query_text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub interests: Vec<String>,
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub learning_goals: Option<String>,
    pub skill_level: Option<SkillLevel>,
}

impl UserProfile {
    /// Deterministic query string: fields in a fixed order, multi-valued
    /// fields space-joined with underscores replaced by spaces.
    pub fn query_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.interests.is_empty() {
            parts.push(join_terms(&self.interests));
        }
        if !self.languages.is_empty() {
            parts.push(join_terms(&self.languages));
        }
        if !self.frameworks.is_empty() {
            parts.push(join_terms(&self.frameworks));
        }
        if let Some(goals) = &self.learning_goals {
            if !goals.is_empty() {
                parts.push(goals.replace('_', " "));
            }
        }
        parts.join(" ")
    }

    /// Stable digest over a canonical (sorted, deduplicated) view of the
    /// profile, used as a cache-invalidation key. Reordering an interest
    /// list does not change the hash.
    pub fn profile_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut interests = self.interests.clone();
        let mut languages = self.languages.clone();
        let mut frameworks = self.frameworks.clone();
        interests.sort();
        interests.dedup();
        languages.sort();
        languages.dedup();
        frameworks.sort();
        frameworks.dedup();

        let mut hasher = Sha256::new();
        hasher.update(interests.join(",").as_bytes());
        hasher.update(b"|");
        hasher.update(languages.join(",").as_bytes());
        hasher.update(b"|");
        hasher.update(frameworks.join(",").as_bytes());
        hasher.update(b"|");
        hasher.update(self.learning_goals.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"|");
        if let Some(level) = self.skill_level {
            hasher.update(level.to_string().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

fn join_terms(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| t.replace('_', " "))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A recommendable project. Immutable to the core; ingested out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_id: Uuid,
    pub title: String,
    pub description: String,
    pub domain_tag: String,
    pub complexity_level: SkillLevel,
    pub embedding: Embedding,
}

/// Fixed-length, L2-normalized embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn normalize(&mut self) {
        let norm: f32 = self.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut self.0 {
                *v /= norm;
            }
        }
    }

    /// Dot product; equals cosine similarity when both vectors are unit norm.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }
}

/// Per-item Beta-distribution posterior, with priors alpha0 = beta0 = 2.0.
/// `total_samples`/`estimated_quality`/`last_updated` are derived from
/// `alpha`/`beta` but persisted as real fields -- every `Store` mutation
/// calls `recompute()` after touching `alpha`/`beta` so the derived fields
/// never drift from their source values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BanditStat {
    pub alpha: f64,
    pub beta: f64,
    pub total_impressions: u64,
    pub total_clicks: u64,
    pub total_samples: f64,
    pub estimated_quality: f64,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl BanditStat {
    pub const PRIOR_ALPHA: f64 = 2.0;
    pub const PRIOR_BETA: f64 = 2.0;

    pub fn new_prior() -> Self {
        let mut stat = Self {
            alpha: Self::PRIOR_ALPHA,
            beta: Self::PRIOR_BETA,
            total_impressions: 0,
            total_clicks: 0,
            total_samples: 0.0,
            estimated_quality: 0.0,
            last_updated: chrono::Utc::now(),
        };
        stat.recompute();
        stat
    }

    /// Refresh `estimated_quality`/`total_samples` from `alpha`/`beta` and
    /// stamp `last_updated`. Call after any change to `alpha`/`beta`.
    pub fn recompute(&mut self) {
        self.estimated_quality = self.alpha / (self.alpha + self.beta);
        self.total_samples = self.alpha + self.beta - Self::PRIOR_ALPHA - Self::PRIOR_BETA;
        self.last_updated = chrono::Utc::now();
    }
}

impl Default for BanditStat {
    fn default() -> Self {
        Self::new_prior()
    }
}

/// Closed enumeration of interaction kinds. No string-matching after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Impression,
    Click,
    Bookmark,
    Unbookmark,
    HoverLong,
    GithubVisit,
    QuickExit,
    Feedback1,
    Feedback2,
    Feedback3,
    Feedback4,
    Feedback5,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub kind: InteractionKind,
    pub position: u32,
    pub duration_s: Option<f64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub session_id: Option<Uuid>,
    /// Set once the real-time path (C9) has folded this interaction's
    /// reward into the item's bandit parameters.
    pub absorbed_realtime: bool,
    /// Set once a batch training run has folded this interaction's reward
    /// into the item's bandit parameters.
    pub absorbed_batch: bool,
}

/// Method used to produce a single recommended position; a closed
/// enumeration, never matched by string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMethod {
    Similarity,
    RlExploit,
    RlExplore,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub rank_position: u32,
    pub similarity: f32,
    pub bandit_score: Option<f64>,
    pub method: RecommendationMethod,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecs {
    pub user_id: Uuid,
    pub profile_hash: String,
    /// Stamped from `Store::items_version` at write time; a cached entry
    /// whose version lags the store's current one is stale regardless of
    /// `profile_hash`/TTL and must be recomputed.
    pub items_version: u64,
    pub similarity_list: Vec<(Uuid, f32)>,
    pub rl_list: Option<Vec<(Uuid, f64, RecommendationMethod)>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ABTestStatus {
    Active,
    Paused,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ABGroup {
    Control,
    Treatment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABTestConfig {
    pub test_id: Uuid,
    pub test_name: String,
    pub status: ABTestStatus,
    pub control_pct: u8,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub winner: Option<ABGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABAssignment {
    pub test_id: Uuid,
    pub user_id: Uuid,
    pub group: ABGroup,
    pub assigned_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRun {
    pub run_id: Uuid,
    pub days_processed: u32,
    pub interactions_processed: u64,
    pub items_updated: u64,
    pub succeeded: bool,
    pub ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: Uuid,
    pub z: f64,
    pub p_value: f64,
    pub effect_size: f64,
    pub ctr_control: f64,
    pub ctr_treatment: f64,
    pub n_control: u64,
    pub n_treatment: u64,
    pub winner: Option<ABGroup>,
    pub recommendation: String,
    pub ended_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_hash_ignores_interest_order() {
        let base = UserProfile {
            user_id: Uuid::nil(),
            interests: vec!["rust".into(), "ml".into()],
            languages: vec![],
            frameworks: vec![],
            learning_goals: None,
            skill_level: None,
        };
        let reordered = UserProfile {
            interests: vec!["ml".into(), "rust".into()],
            ..base.clone()
        };
        assert_eq!(base.profile_hash(), reordered.profile_hash());
    }

    #[test]
    fn profile_hash_changes_with_new_interest() {
        let base = UserProfile {
            user_id: Uuid::nil(),
            interests: vec!["rust".into()],
            languages: vec![],
            frameworks: vec![],
            learning_goals: None,
            skill_level: None,
        };
        let changed = UserProfile {
            interests: vec!["rust".into(), "go".into()],
            ..base.clone()
        };
        assert_ne!(base.profile_hash(), changed.profile_hash());
    }

    #[test]
    fn bandit_stat_priors() {
        let stat = BanditStat::new_prior();
        assert_eq!(stat.alpha, 2.0);
        assert_eq!(stat.beta, 2.0);
        assert_eq!(stat.total_samples, 0.0);
        assert!((stat.estimated_quality - 0.5).abs() < 1e-9);
    }

    #[test]
    fn recompute_tracks_alpha_beta_changes() {
        let mut stat = BanditStat::new_prior();
        stat.alpha += 8.0;
        stat.recompute();
        assert_eq!(stat.total_samples, 8.0);
        assert!((stat.estimated_quality - 0.8333).abs() < 1e-3);
    }

    #[test]
    fn cosine_similarity_of_unit_vectors() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.cosine_similarity(&b).abs() < 1e-6);
        assert!((a.cosine_similarity(&a) - 1.0).abs() < 1e-6);
    }
}
