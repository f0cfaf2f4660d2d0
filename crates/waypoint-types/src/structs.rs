//! Core entity structs for the Waypoint progression engine.
//!
//! Catalog entities (`Experience`, `ExperienceComponent`,
//! `ExperienceRequirement`, `ExperienceReward`) are authored elsewhere and
//! read by the engine. Progress entities (`UserExperienceProgress`,
//! `UserComponentCompletion`) are owned and mutated by the engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::ProgressStatus;
use crate::ids::{ComponentId, ExperienceId, ProgressId, UserId};
use crate::outcomes::RequirementSpec;

/// One hundred, the scale of a completion percentage.
pub const ONE_HUNDRED: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Milliseconds in one minute, the unit of `average_completion_time`.
const MILLIS_PER_MINUTE: Decimal = Decimal::from_parts(60_000, 0, 0, false, 0);

/// Two, the divisor of the two-point average blend.
const TWO: Decimal = Decimal::from_parts(2, 0, 0, false, 0);

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A named, orderable journey made of components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    /// Catalog key.
    pub id: ExperienceId,
    /// Stable machine-readable key (e.g. `"first_steps"`).
    pub key: String,
    /// Display title.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Number of progress rows ever created for this experience.
    pub start_count: u64,
    /// Number of progress rows that reached `completed`.
    pub completion_count: u64,
    /// Blended completion time in minutes. See [`blend_average_completion_time`].
    pub average_completion_time: Decimal,
}

impl Experience {
    /// Completion rate as a percentage of starts; zero when never started.
    pub fn completion_rate(&self) -> Decimal {
        if self.start_count == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.completion_count)
            .checked_mul(ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(Decimal::from(self.start_count)))
            .unwrap_or(Decimal::ZERO)
    }
}

/// One ordered step of an experience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceComponent {
    /// Catalog key.
    pub id: ComponentId,
    /// Owning experience.
    pub experience_id: ExperienceId,
    /// Position within the experience. Unique per experience.
    pub sequence_order: i32,
    /// Display title.
    pub title: String,
    /// Caller-facing tag, e.g. `narrative_fragment` or `mission`.
    pub component_type: String,
    /// Rewards paid out when this component is completed, keyed by reward type.
    pub completion_rewards: BTreeMap<String, serde_json::Value>,
}

impl ExperienceComponent {
    /// Expand the reward map into one grantable spec per entry.
    pub fn reward_specs(&self) -> Vec<RewardSpec> {
        self.completion_rewards
            .iter()
            .map(|(reward_type, reward_value)| RewardSpec {
                reward_type: reward_type.clone(),
                reward_value: reward_value.clone(),
            })
            .collect()
    }
}

/// A stored precondition gating the start of an experience.
///
/// The payload is kept as raw JSON; the requirement evaluator parses it into
/// a typed requirement and fails closed on anything it does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceRequirement {
    /// Owning experience.
    pub experience_id: ExperienceId,
    /// Requirement type name as stored (e.g. `"level"`).
    pub requirement_type: String,
    /// Type-specific payload (e.g. `{"min_level": 3}`).
    pub requirement_value: serde_json::Value,
}

impl ExperienceRequirement {
    /// The untyped spec handed to the evaluator.
    pub fn spec(&self) -> RequirementSpec {
        RequirementSpec {
            requirement_type: self.requirement_type.clone(),
            requirement_value: self.requirement_value.clone(),
        }
    }
}

/// A payout granted on experience completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceReward {
    /// Owning experience.
    pub experience_id: ExperienceId,
    /// Reward type name (e.g. `"currency"`, `"item"`).
    pub reward_type: String,
    /// Type-specific payload.
    pub reward_value: serde_json::Value,
}

impl ExperienceReward {
    /// The grantable spec for this reward.
    pub fn spec(&self) -> RewardSpec {
        RewardSpec {
            reward_type: self.reward_type.clone(),
            reward_value: self.reward_value.clone(),
        }
    }
}

/// A single reward handed to the external reward-granting capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSpec {
    /// Reward type name.
    pub reward_type: String,
    /// Type-specific payload.
    pub reward_value: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// The per-user state machine instance for one experience.
///
/// At most one row exists per (user, experience) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserExperienceProgress {
    /// Row key.
    pub id: ProgressId,
    /// The user progressing.
    pub user_id: UserId,
    /// The experience being progressed.
    pub experience_id: ExperienceId,
    /// Current state.
    pub status: ProgressStatus,
    /// The component the user is expected to complete next.
    pub current_component_id: Option<ComponentId>,
    /// When the row was created.
    pub started_at: DateTime<Utc>,
    /// When the row reached `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last mutation time.
    pub last_activity_at: DateTime<Utc>,
    /// `components_completed / components_total * 100`; 100 once completed.
    pub completion_percentage: Decimal,
    /// Number of completion facts recorded for this row.
    pub components_completed: u32,
    /// Component count snapshotted at start. Never changes afterwards.
    pub components_total: u32,
}

impl UserExperienceProgress {
    /// Whether the row is terminal.
    pub fn is_completed(&self) -> bool {
        self.status == ProgressStatus::Completed
    }

    /// Record one more completed component and recompute the percentage.
    pub fn record_component(&mut self, next: Option<ComponentId>, now: DateTime<Utc>) {
        self.components_completed = self.components_completed.saturating_add(1);
        self.completion_percentage =
            completion_percentage(self.components_completed, self.components_total);
        self.current_component_id = next;
        self.last_activity_at = now;
    }

    /// Move the row to its terminal state.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = ProgressStatus::Completed;
        self.completed_at = Some(now);
        self.completion_percentage = ONE_HUNDRED;
        self.last_activity_at = now;
    }

    /// Minutes between `started_at` and `completed_at` (or `now` if unset).
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> Decimal {
        let end = self.completed_at.unwrap_or(now);
        let millis = end
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0);
        Decimal::from(millis)
            .checked_div(MILLIS_PER_MINUTE)
            .unwrap_or(Decimal::ZERO)
    }
}

/// An append-only fact that a component was completed within a progress row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserComponentCompletion {
    /// Owning progress row.
    pub user_progress_id: ProgressId,
    /// The completed component.
    pub component_id: ComponentId,
    /// When the completion was recorded.
    pub completed_at: DateTime<Utc>,
    /// Caller-supplied payload, opaque to the engine.
    pub completion_data: serde_json::Value,
}

/// `completed / total * 100`, or zero for an empty experience.
pub fn completion_percentage(completed: u32, total: u32) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(completed)
        .checked_mul(ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(Decimal::from(total)))
        .unwrap_or(Decimal::ZERO)
}

/// Blend a new completion-time sample into the stored average.
///
/// The first-ever completion stores the sample as-is. Every later completion
/// stores the mean of the previous value and the new sample, which weights
/// recent completions more heavily than a true running mean would.
pub fn blend_average_completion_time(
    previous_completions: u64,
    previous_average: Decimal,
    sample_minutes: Decimal,
) -> Decimal {
    if previous_completions == 0 {
        return sample_minutes;
    }
    previous_average
        .checked_add(sample_minutes)
        .and_then(|sum| sum.checked_div(TWO))
        .unwrap_or(previous_average)
}
