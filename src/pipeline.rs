//! Orchestrates retrieval (C2) and reranking (C4) into the final
//! recommendation response, persisting impressions along the way.

use crate::bandit::ThompsonPolicy;
use crate::config::BanditConfig;
use crate::domain::{RecommendationMethod, RecommendationResult};
use crate::error::Result;
use crate::similarity::SimilarityRetriever;
use crate::store::Store;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RecommendedItem {
    pub item_id: Uuid,
    pub rank: u32,
    pub similarity: f32,
    pub bandit_score: Option<f64>,
    pub method: RecommendationMethod,
}

pub struct RecommendationPipeline {
    store: Arc<dyn Store>,
    retriever: SimilarityRetriever,
    policy: ThompsonPolicy,
    bandit_config: BanditConfig,
}

impl RecommendationPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        retriever: SimilarityRetriever,
        policy: ThompsonPolicy,
        bandit_config: BanditConfig,
    ) -> Self {
        Self {
            store,
            retriever,
            policy,
            bandit_config,
        }
    }

    pub async fn recommend(
        &self,
        user_id: Uuid,
        k: usize,
        use_rl: bool,
        offset: usize,
    ) -> Result<Vec<RecommendedItem>> {
        let profile = match self.store.load_profile(user_id).await? {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };

        let overfetch = (k + offset) * self.bandit_config.overfetch_factor.max(1);
        let candidates = self.retriever.candidates(&profile, overfetch).await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let similarity_page = |candidates: Vec<(Uuid, f32)>| -> Vec<RecommendedItem> {
            candidates
                .into_iter()
                .take(offset + k)
                .enumerate()
                .map(|(i, (item_id, similarity))| RecommendedItem {
                    item_id,
                    rank: (i + 1) as u32,
                    similarity,
                    bandit_score: None,
                    method: RecommendationMethod::Similarity,
                })
                .collect()
        };

        let mut items: Vec<RecommendedItem> = if use_rl {
            let mut rng = StdRng::from_entropy();
            match self.policy.rerank(&candidates, offset + k, &mut rng).await {
                Ok(reranked) => {
                    let similarity_by_id: std::collections::HashMap<Uuid, f32> =
                        candidates.into_iter().collect();
                    reranked
                        .into_iter()
                        .enumerate()
                        .map(|(i, (item_id, score, method))| RecommendedItem {
                            item_id,
                            rank: (i + 1) as u32,
                            similarity: similarity_by_id.get(&item_id).copied().unwrap_or(0.0),
                            bandit_score: Some(score),
                            method,
                        })
                        .collect()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rerank failed, falling back to similarity order");
                    similarity_page(candidates)
                }
            }
        } else {
            similarity_page(candidates)
        };

        if items.len() <= offset {
            return Ok(Vec::new());
        }
        let page: Vec<RecommendedItem> = items
            .drain(offset..)
            .take(k)
            .enumerate()
            .map(|(i, mut item)| {
                item.rank = (i + 1) as u32;
                item
            })
            .collect();

        let now = Utc::now();
        for item in &page {
            self.store
                .insert_result(RecommendationResult {
                    user_id,
                    item_id: item.item_id,
                    rank_position: item.rank,
                    similarity: item.similarity,
                    bandit_score: item.bandit_score,
                    method: item.method,
                    created_at: now,
                })
                .await?;
            self.store.increment_impression(item.item_id).await?;
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Embedding, Item, SkillLevel, UserProfile, EMBEDDING_DIM};
    use crate::encoder::{Encoder, StubEncoder};
    use crate::store::MemoryStore;

    fn bandit_config() -> BanditConfig {
        BanditConfig {
            prior_alpha: 2.0,
            prior_beta: 2.0,
            similarity_weight: 0.6,
            bandit_weight: 0.4,
            exploration_rate: 0.15,
            overfetch_factor: 3,
        }
    }

    fn build_pipeline(store: Arc<dyn Store>) -> RecommendationPipeline {
        let encoder: Arc<dyn Encoder> = Arc::new(StubEncoder);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(4));
        let retriever = SimilarityRetriever::new(store.clone(), encoder, semaphore, 600);
        let policy = ThompsonPolicy::new(store.clone(), bandit_config());
        RecommendationPipeline::new(store, retriever, policy, bandit_config())
    }

    #[tokio::test]
    async fn recommend_returns_empty_for_unknown_user() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let pipeline = build_pipeline(store);
        let result = pipeline.recommend(Uuid::new_v4(), 5, true, 0).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn recommend_caps_results_at_k_and_ranks_from_one() {
        let mem = MemoryStore::new();
        let user_id = Uuid::new_v4();
        mem.put_profile(UserProfile {
            user_id,
            interests: vec!["rust".into()],
            languages: vec![],
            frameworks: vec![],
            learning_goals: None,
            skill_level: None,
        });
        for i in 0..10 {
            mem.put_item(Item {
                item_id: Uuid::new_v4(),
                title: format!("item{i}"),
                description: "d".into(),
                domain_tag: "web".into(),
                complexity_level: SkillLevel::Beginner,
                embedding: Embedding::new(vec![1.0; EMBEDDING_DIM]),
            });
        }
        let store: Arc<dyn Store> = Arc::new(mem);
        let pipeline = build_pipeline(store);

        let result = pipeline.recommend(user_id, 4, true, 0).await.unwrap();
        assert_eq!(result.len(), 4);
        let ranks: Vec<u32> = result.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);

        let ids: std::collections::HashSet<Uuid> = result.iter().map(|r| r.item_id).collect();
        assert_eq!(ids.len(), 4, "no item should appear twice");
    }

    #[tokio::test]
    async fn similarity_only_path_tags_method_similarity() {
        let mem = MemoryStore::new();
        let user_id = Uuid::new_v4();
        mem.put_profile(UserProfile {
            user_id,
            interests: vec!["rust".into()],
            languages: vec![],
            frameworks: vec![],
            learning_goals: None,
            skill_level: None,
        });
        mem.put_item(Item {
            item_id: Uuid::new_v4(),
            title: "item".into(),
            description: "d".into(),
            domain_tag: "web".into(),
            complexity_level: SkillLevel::Beginner,
            embedding: Embedding::new(vec![1.0; EMBEDDING_DIM]),
        });
        let store: Arc<dyn Store> = Arc::new(mem);
        let pipeline = build_pipeline(store);

        let result = pipeline.recommend(user_id, 5, false, 0).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].method, RecommendationMethod::Similarity);
        assert!(result[0].bandit_score.is_none());
    }
}
