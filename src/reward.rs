//! Pure reward function: maps an interaction to a scalar reward. No I/O,
//! no randomness -- easy to unit test against the worked scenarios.

use crate::domain::{Interaction, InteractionKind};
use chrono::Utc;

fn base_reward(kind: InteractionKind) -> f64 {
    match kind {
        InteractionKind::Click => 5.0,
        InteractionKind::Bookmark => 10.0,
        InteractionKind::GithubVisit => 3.0,
        InteractionKind::HoverLong => 0.8,
        InteractionKind::Impression => 0.0,
        InteractionKind::QuickExit => -2.0,
        InteractionKind::Unbookmark => -3.0,
        InteractionKind::Feedback5 => 10.0,
        InteractionKind::Feedback4 => 5.0,
        InteractionKind::Feedback3 => 0.0,
        InteractionKind::Feedback2 => -2.0,
        InteractionKind::Feedback1 => -5.0,
    }
}

fn position_multiplier(position: u32) -> f64 {
    1.0 + 0.1 * (12i64 - position as i64).max(0) as f64
}

fn duration_multiplier(duration_s: Option<f64>) -> f64 {
    match duration_s {
        Some(d) if d >= 60.0 => 1.5,
        Some(d) if d < 10.0 => 0.5,
        _ => 1.0,
    }
}

/// Decay applied only on offline (batch) replay, never on the real-time
/// ingest path.
fn time_decay(timestamp: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> f64 {
    let days_old = (now - timestamp).num_seconds() as f64 / 86_400.0;
    (-std::f64::consts::LN_2 * days_old.max(0.0) / 7.0).exp()
}

/// Real-time reward: position and duration adjustments, no time decay.
pub fn reward(interaction: &Interaction) -> f64 {
    base_reward(interaction.kind)
        * position_multiplier(interaction.position)
        * duration_multiplier(interaction.duration_s)
}

/// Offline reward: same as `reward`, plus exponential time decay relative
/// to `now`. Used only by the batch trainer.
pub fn reward_with_decay(interaction: &Interaction, now: chrono::DateTime<Utc>) -> f64 {
    reward(interaction) * time_decay(interaction.timestamp, now)
}
