//! Content-based candidate retrieval: embed the profile, score every item
//! by cosine similarity, filter by skill level with a soft fallback, and
//! cache the ranked list by profile hash.

use crate::domain::{CachedRecs, Embedding, Item, SkillLevel, UserProfile};
use crate::encoder::Encoder;
use crate::error::{AppError, Result};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// How long a request waits for a free encoder permit before giving up,
/// mirroring the teacher's semaphore-acquire deadline.
const ENCODER_PERMIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SimilarityRetriever {
    store: Arc<dyn Store>,
    encoder: Arc<dyn Encoder>,
    encoder_semaphore: Arc<Semaphore>,
    cache_ttl_secs: i64,
}

impl SimilarityRetriever {
    pub fn new(
        store: Arc<dyn Store>,
        encoder: Arc<dyn Encoder>,
        encoder_semaphore: Arc<Semaphore>,
        cache_ttl_secs: i64,
    ) -> Self {
        Self {
            store,
            encoder,
            encoder_semaphore,
            cache_ttl_secs,
        }
    }

    /// Return up to `k` `(item_id, similarity)` pairs, most similar first.
    /// Empty on encoder failure or an empty catalog -- callers treat that
    /// as a degraded-mode signal, never as an error.
    pub async fn candidates(&self, profile: &UserProfile, k: usize) -> Result<Vec<(Uuid, f32)>> {
        let profile_hash = profile.profile_hash();
        let items_version = self.store.items_version().await?;

        if let Some(cached) = self.store.get_cache(profile.user_id).await? {
            if cached.profile_hash == profile_hash
                && cached.items_version == items_version
                && !cache_expired(&cached, self.cache_ttl_secs)
            {
                return Ok(cached.similarity_list.into_iter().take(k).collect());
            }
        }

        let query_text = profile.query_text();
        let query_embedding = match self.encode_with_retry(&query_text).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "encoder failed twice, returning empty candidate set");
                return Ok(Vec::new());
            }
        };

        let items = self.store.load_items().await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = rank_by_similarity(&query_embedding, &items, profile.skill_level, k);

        self.store
            .put_cache(CachedRecs {
                user_id: profile.user_id,
                profile_hash,
                items_version,
                similarity_list: ranked.clone(),
                rl_list: None,
                updated_at: Utc::now(),
            })
            .await?;

        Ok(ranked)
    }

    /// One retry permitted; a second failure is reported to the caller,
    /// which degrades to an empty candidate set rather than aborting.
    async fn encode_with_retry(&self, query_text: &str) -> Result<Embedding> {
        match self.encode_once(query_text).await {
            Ok(embedding) => Ok(embedding),
            Err(e) => {
                tracing::warn!(error = %e, "encoder call failed, retrying once");
                self.encode_once(query_text).await
            }
        }
    }

    async fn encode_once(&self, query_text: &str) -> Result<Embedding> {
        let _permit = tokio::time::timeout(ENCODER_PERMIT_TIMEOUT, self.encoder_semaphore.acquire())
            .await
            .map_err(|_| AppError::Transient("encoder overloaded, permit acquire timed out".into()))?
            .map_err(|_| AppError::Transient("encoder semaphore closed".into()))?;
        let v = self.encoder.encode(query_text).await?;
        Ok(Embedding::new(v.to_vec()))
    }
}

fn cache_expired(cache: &CachedRecs, ttl_secs: i64) -> bool {
    (Utc::now() - cache.updated_at).num_seconds() > ttl_secs
}

fn rank_by_similarity(
    query: &Embedding,
    items: &[Item],
    skill_level: Option<SkillLevel>,
    k: usize,
) -> Vec<(Uuid, f32)> {
    let mut scored: Vec<(Uuid, f32)> = items
        .iter()
        .filter(|item| skill_level.map_or(true, |level| item.complexity_level == level))
        .map(|item| (item.item_id, query.cosine_similarity(&item.embedding)))
        .collect();

    // Fall back to the unfiltered catalog if the skill filter starved us.
    if skill_level.is_some() && scored.len() < k / 2 {
        scored = items
            .iter()
            .map(|item| (item.item_id, query.cosine_similarity(&item.embedding)))
            .collect();
    }

    scored.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
        Some(std::cmp::Ordering::Equal) | None => a.0.cmp(&b.0),
        Some(ord) => ord,
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EMBEDDING_DIM;
    use crate::encoder::StubEncoder;
    use crate::store::MemoryStore;

    fn item(id: Uuid, level: SkillLevel, vec: Vec<f32>) -> Item {
        Item {
            item_id: id,
            title: "t".into(),
            description: "d".into(),
            domain_tag: "web".into(),
            complexity_level: level,
            embedding: Embedding::new(vec),
        }
    }

    fn profile(skill_level: Option<SkillLevel>) -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            interests: vec!["rust".into()],
            languages: vec![],
            frameworks: vec![],
            learning_goals: None,
            skill_level,
        }
    }

    #[test]
    fn ranks_by_similarity_descending() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let a = item(Uuid::new_v4(), SkillLevel::Beginner, vec![1.0, 0.0]);
        let b = item(Uuid::new_v4(), SkillLevel::Beginner, vec![0.0, 1.0]);
        let ranked = rank_by_similarity(&query, &[b.clone(), a.clone()], None, 2);
        assert_eq!(ranked[0].0, a.item_id);
        assert_eq!(ranked[1].0, b.item_id);
    }

    #[test]
    fn skill_filter_falls_back_when_too_few_matches() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let beginner = item(Uuid::new_v4(), SkillLevel::Beginner, vec![1.0, 0.0]);
        let advanced = item(Uuid::new_v4(), SkillLevel::Advanced, vec![0.9, 0.1]);
        let items = vec![beginner, advanced];
        // Asking for k=4 with only 1 beginner match (< k/2 = 2) should fall
        // back to the unfiltered catalog.
        let ranked = rank_by_similarity(&query, &items, Some(SkillLevel::Beginner), 4);
        assert_eq!(ranked.len(), 2);
    }

    fn semaphore() -> Arc<Semaphore> {
        Arc::new(Semaphore::new(4))
    }

    #[tokio::test]
    async fn candidates_returns_empty_for_empty_catalog() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let encoder: Arc<dyn Encoder> = Arc::new(StubEncoder);
        let retriever = SimilarityRetriever::new(store, encoder, semaphore(), 600);
        let result = retriever.candidates(&profile(None), 5).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn candidates_hit_the_cache_on_second_call() {
        let mem = MemoryStore::new();
        mem.put_item(item(Uuid::new_v4(), SkillLevel::Beginner, vec![1.0; EMBEDDING_DIM]));
        let store: Arc<dyn Store> = Arc::new(mem);
        let encoder: Arc<dyn Encoder> = Arc::new(StubEncoder);
        let retriever = SimilarityRetriever::new(store.clone(), encoder, semaphore(), 600);

        let p = profile(None);
        let first = retriever.candidates(&p, 5).await.unwrap();
        let cached = store.get_cache(p.user_id).await.unwrap();
        assert!(cached.is_some());
        assert_eq!(cached.unwrap().profile_hash, p.profile_hash());
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn cache_is_invalidated_when_the_item_set_changes() {
        let mem = MemoryStore::new();
        mem.put_item(item(Uuid::new_v4(), SkillLevel::Beginner, vec![1.0; EMBEDDING_DIM]));
        let mem = Arc::new(mem);
        let store: Arc<dyn Store> = mem.clone();
        let encoder: Arc<dyn Encoder> = Arc::new(StubEncoder);
        let retriever = SimilarityRetriever::new(store.clone(), encoder, semaphore(), 600);

        let p = profile(None);
        let first = retriever.candidates(&p, 5).await.unwrap();
        assert_eq!(first.len(), 1);

        mem.put_item(item(Uuid::new_v4(), SkillLevel::Beginner, vec![1.0; EMBEDDING_DIM]));
        let second = retriever.candidates(&p, 5).await.unwrap();
        assert_eq!(second.len(), 2, "stale cache entry should have been recomputed");
    }
}
