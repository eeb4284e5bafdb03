//! Single entry point for external interaction events (C9): persists the
//! interaction, folds its real-time reward into the item's bandit
//! parameters, and bumps impression/click counters.

use crate::domain::{Interaction, InteractionKind};
use crate::error::Result;
use crate::reward::reward;
use crate::store::{BanditDelta, Store};
use std::sync::Arc;

pub struct InteractionIngest {
    store: Arc<dyn Store>,
}

pub struct IngestOutcome {
    pub reward: f64,
    pub updated: bool,
}

impl InteractionIngest {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record(&self, mut interaction: Interaction) -> Result<IngestOutcome> {
        let r = reward(&interaction);

        let updated = if r > 0.0 {
            self.store
                .update_bandit(interaction.item_id, BanditDelta { delta_alpha: r, delta_beta: 0.0 })
                .await?;
            true
        } else if r < 0.0 {
            self.store
                .update_bandit(interaction.item_id, BanditDelta { delta_alpha: 0.0, delta_beta: -r })
                .await?;
            true
        } else {
            false
        };

        match interaction.kind {
            InteractionKind::Impression => self.store.increment_impression(interaction.item_id).await?,
            InteractionKind::Click => self.store.increment_click(interaction.item_id).await?,
            _ => {}
        }

        interaction.absorbed_realtime = updated;
        self.store.insert_interaction(interaction).await?;

        Ok(IngestOutcome { reward: r, updated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use uuid::Uuid;

    fn interaction(kind: InteractionKind) -> Interaction {
        Interaction {
            user_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            kind,
            position: 1,
            duration_s: None,
            timestamp: Utc::now(),
            session_id: None,
            absorbed_realtime: false,
            absorbed_batch: false,
        }
    }

    #[tokio::test]
    async fn click_increases_alpha() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ingest = InteractionIngest::new(store.clone());
        let click = interaction(InteractionKind::Click);
        let item_id = click.item_id;

        let outcome = ingest.record(click).await.unwrap();
        assert!(outcome.updated);
        assert!(outcome.reward > 0.0);

        let stat = store.get_bandit(item_id).await.unwrap();
        assert!(stat.alpha > 2.0);
        assert_eq!(stat.beta, 2.0);
    }

    #[tokio::test]
    async fn quick_exit_increases_beta() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ingest = InteractionIngest::new(store.clone());
        let exit = interaction(InteractionKind::QuickExit);
        let item_id = exit.item_id;

        ingest.record(exit).await.unwrap();

        let stat = store.get_bandit(item_id).await.unwrap();
        assert!(stat.beta > 2.0);
        assert_eq!(stat.alpha, 2.0);
    }

    #[tokio::test]
    async fn impression_does_not_update_bandit_but_is_recorded() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ingest = InteractionIngest::new(store.clone());
        let impression = interaction(InteractionKind::Impression);
        let item_id = impression.item_id;

        let outcome = ingest.record(impression).await.unwrap();
        assert!(!outcome.updated);

        let stat = store.get_bandit(item_id).await.unwrap();
        assert_eq!(stat.alpha, 2.0);
        assert_eq!(stat.beta, 2.0);
    }
}
