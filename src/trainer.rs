//! Offline batch retraining: replays interactions not yet absorbed by the
//! real-time path (see `absorbed_realtime`/`absorbed_batch`) and folds
//! their aggregate reward into each item's bandit parameters.

use crate::domain::{InteractionKind, TrainingRun};
use crate::error::{AppError, Result};
use crate::reward::reward_with_decay;
use crate::store::{BanditDelta, Store};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct BatchTrainer {
    store: Arc<dyn Store>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TrainingSummary {
    pub run_id: Uuid,
    pub days_processed: u32,
    pub interactions_processed: u64,
    pub items_updated: u64,
}

impl BatchTrainer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Replay `[now - days, now]`, skipping interactions already folded in
    /// by a prior batch run, and submit one atomic `batch_update` covering
    /// every touched item.
    pub async fn train(&self, days: u32, learning_rate: f64) -> Result<TrainingSummary> {
        let now = Utc::now();
        let since = now - Duration::days(days as i64);

        let interactions = self.store.read_interactions(since, now).await?;
        // Skip anything already folded into (alpha, beta) by either path --
        // C9's real-time fold or a prior batch run -- so replaying the same
        // window twice never double-counts a reward.
        let unabsorbed: Vec<_> = interactions
            .into_iter()
            .filter(|i| !i.absorbed_batch && !i.absorbed_realtime)
            .collect();

        let mut positive: HashMap<Uuid, f64> = HashMap::new();
        let mut negative: HashMap<Uuid, f64> = HashMap::new();
        for interaction in &unabsorbed {
            if interaction.kind == InteractionKind::Impression {
                continue;
            }
            let r = reward_with_decay(interaction, now) * learning_rate;
            if r > 0.0 {
                *positive.entry(interaction.item_id).or_insert(0.0) += r;
            } else if r < 0.0 {
                *negative.entry(interaction.item_id).or_insert(0.0) += -r;
            }
        }

        let mut item_ids: Vec<Uuid> = positive.keys().chain(negative.keys()).cloned().collect();
        item_ids.sort();
        item_ids.dedup();

        let deltas: Vec<(Uuid, BanditDelta)> = item_ids
            .iter()
            .map(|id| {
                (
                    *id,
                    BanditDelta {
                        delta_alpha: *positive.get(id).unwrap_or(&0.0),
                        delta_beta: *negative.get(id).unwrap_or(&0.0),
                    },
                )
            })
            .collect();

        let run_id = Uuid::new_v4();
        let result = self.store.batch_update_bandit(deltas).await;

        let (items_updated, succeeded) = match &result {
            Ok(updated) => (updated.len() as u64, true),
            Err(_) => (0, false),
        };

        self.store
            .insert_training_run(TrainingRun {
                run_id,
                days_processed: days,
                interactions_processed: unabsorbed.len() as u64,
                items_updated,
                succeeded,
                ts: now,
            })
            .await?;

        if let Err(e) = result {
            return Err(AppError::Transient(format!("batch update failed, run rolled back: {e}")));
        }

        for interaction in &unabsorbed {
            self.store
                .mark_absorbed_batch(interaction.user_id, interaction.item_id, interaction.timestamp)
                .await?;
        }

        Ok(TrainingSummary {
            run_id,
            days_processed: days,
            interactions_processed: unabsorbed.len() as u64,
            items_updated,
        })
    }
}
