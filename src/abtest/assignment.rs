//! Deterministic hashed bucketing (C7). `bucket(user_id)` never depends on
//! persistence: the assignment table is a cache of a pure function, not
//! its source of truth, so a lost or rehosted table is survivable.

use crate::domain::{ABAssignment, ABGroup};
use crate::error::Result;
use crate::store::Store;
use std::sync::Arc;
use uuid::Uuid;

pub struct ABAssigner {
    store: Arc<dyn Store>,
}

/// `int(MD5(utf8(user_id)).hex(), 16) mod 100`, computed from the first 4
/// bytes of the digest interpreted as a big-endian integer -- enough
/// entropy for a mod-100 bucket while staying cheap.
pub fn bucket(user_id: Uuid) -> u8 {
    let digest = md5::compute(user_id.to_string().as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (value % 100) as u8
}

impl ABAssigner {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the group this user falls into under the active test, or
    /// `None` if no test is active.
    pub async fn assign(&self, user_id: Uuid) -> Result<Option<ABAssignment>> {
        let config = match self.store.ab_active_config().await? {
            Some(c) => c,
            None => return Ok(None),
        };

        if let Some(existing) = self.store.ab_get_assignment(config.test_id, user_id).await? {
            return Ok(Some(existing));
        }

        let group = if bucket(user_id) < config.control_pct {
            ABGroup::Control
        } else {
            ABGroup::Treatment
        };

        let assignment = self
            .store
            .ab_get_or_insert_assignment(config.test_id, user_id, group)
            .await?;
        Ok(Some(assignment))
    }

    /// No active test -> RL is on by default. An active test -> RL only
    /// for the treatment group.
    pub async fn should_use_rl(&self, user_id: Uuid) -> Result<bool> {
        Ok(match self.assign(user_id).await? {
            None => true,
            Some(a) => a.group == ABGroup::Treatment,
        })
    }
}
