//! Result payloads returned by the evaluator and the progression engine.
//!
//! These are the machine-readable shapes a caller (chat command handler,
//! admin surface, CLI) renders. Every failure-adjacent payload carries enough
//! detail to explain "why you can't proceed" without re-querying the
//! subsystems that were consulted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::{ExperienceState, StartStatus};
use crate::ids::{AchievementId, ExperienceId, ItemId};
use crate::structs::{
    Experience, ExperienceComponent, RewardSpec, UserComponentCompletion, UserExperienceProgress,
};

// ---------------------------------------------------------------------------
// Requirement evaluation
// ---------------------------------------------------------------------------

/// An untyped requirement as stored: a type name plus a JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    /// Requirement type name (e.g. `"level"`).
    pub requirement_type: String,
    /// Type-specific payload (e.g. `{"min_level": 3}`).
    pub requirement_value: serde_json::Value,
}

/// Why the evaluator could not judge a requirement. Always treated as not met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum EvaluationFailure {
    /// The requirement type is not one the evaluator knows.
    UnknownRequirementType {
        /// The unrecognized type name.
        requirement_type: String,
    },
    /// The type is known but its payload could not be parsed.
    MalformedPayload {
        /// Parser message.
        message: String,
    },
}

/// Type-specific explanation attached to every requirement result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementDetails {
    /// Level gate.
    Level {
        /// Minimum level required.
        required_level: i64,
        /// The user's level at evaluation time.
        current_level: i64,
        /// Levels still to gain; zero when met.
        missing_levels: i64,
    },
    /// Paid-membership gate.
    Membership {
        /// Whether the gate is active at all.
        membership_required: bool,
        /// Whether the user had an active membership. `None` when the gate
        /// is inactive and the provider was not queried.
        has_membership: Option<bool>,
    },
    /// Item-ownership gate.
    Item {
        /// Items named by the requirement.
        required_items: Vec<ItemId>,
        /// Required items the user owns.
        owned_items: Vec<ItemId>,
        /// Whether every item is needed or any one suffices.
        all_required: bool,
        /// Items whose acquisition would satisfy the gate.
        missing_items: Vec<ItemId>,
    },
    /// Achievement gate.
    Achievement {
        /// Achievements named by the requirement.
        required_achievements: Vec<AchievementId>,
        /// Required achievements the user has unlocked.
        unlocked_achievements: Vec<AchievementId>,
        /// Required achievements still locked.
        missing_achievements: Vec<AchievementId>,
    },
    /// Prior-experience gate.
    ExperienceCompleted {
        /// Experiences named by the requirement.
        required_experiences: Vec<ExperienceId>,
        /// Required experiences the user has completed.
        completed_experiences: Vec<ExperienceId>,
        /// Required experiences not yet completed.
        missing_experiences: Vec<ExperienceId>,
    },
    /// Currency-balance gate.
    Currency {
        /// Minimum balance required.
        required_amount: i64,
        /// The user's balance at evaluation time. `None` when nothing is
        /// required and the provider was not queried.
        current_balance: Option<i64>,
        /// Shortfall; zero when met.
        missing_currency: i64,
    },
    /// The evaluator failed closed.
    Error {
        /// What went wrong.
        #[serde(flatten)]
        failure: EvaluationFailure,
    },
}

/// Outcome of evaluating one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementResult {
    /// The requirement as supplied.
    pub requirement: RequirementSpec,
    /// Whether the user satisfies it.
    pub met: bool,
    /// Type-specific detail, present whether or not it was met.
    pub details: RequirementDetails,
}

/// Outcome of evaluating a requirement list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Logical AND over every result. True for an empty list.
    pub all_met: bool,
    /// One entry per input requirement, in input order.
    pub results: Vec<RequirementResult>,
}

impl ValidationReport {
    /// The results that were not met.
    pub fn missing(&self) -> Vec<RequirementResult> {
        self.results.iter().filter(|r| !r.met).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Reward grants
// ---------------------------------------------------------------------------

/// What happened when a reward was handed to the reward capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GrantOutcome {
    /// The capability accepted the grant.
    Granted,
    /// The capability rejected or failed the grant. Progress is not rolled back.
    Failed {
        /// Capability error message.
        reason: String,
    },
}

/// One reward and its grant outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardGrantResult {
    /// The reward that was attempted.
    pub reward: RewardSpec,
    /// The outcome.
    pub outcome: GrantOutcome,
}

impl RewardGrantResult {
    /// Whether the grant failed.
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, GrantOutcome::Failed { .. })
    }
}

/// Failed grants, for surfacing as warnings next to a successful result.
pub fn grant_warnings(grants: &[RewardGrantResult]) -> Vec<&RewardGrantResult> {
    grants.iter().filter(|g| g.is_failure()).collect()
}

// ---------------------------------------------------------------------------
// Engine operations
// ---------------------------------------------------------------------------

/// Successful result of `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    /// Whether the row was created or resumed.
    pub status: StartStatus,
    /// The progress row.
    pub progress: UserExperienceProgress,
    /// The component the user should complete next.
    pub current_component: Option<ExperienceComponent>,
}

/// Successful result of `complete` (directly or via the final `advance`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    /// The now-terminal progress row.
    pub progress: UserExperienceProgress,
    /// One entry per experience-level reward.
    pub rewards_granted: Vec<RewardGrantResult>,
}

/// Where the user goes after completing a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "next", rename_all = "snake_case")]
pub enum NextStep {
    /// Another component remains.
    Component {
        /// The new current component.
        component: ExperienceComponent,
    },
    /// That was the final component; the experience is complete.
    ExperienceCompleted {
        /// Completion result, including experience-level reward grants.
        completion: CompletionOutcome,
    },
}

/// Successful result of `advance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    /// The component that was just completed.
    pub component_completed: ExperienceComponent,
    /// The progress row after the completion was recorded.
    pub progress: UserExperienceProgress,
    /// Grants of the completed component's rewards.
    pub rewards_granted: Vec<RewardGrantResult>,
    /// The next component, or the completion result.
    pub next: NextStep,
}

impl AdvanceOutcome {
    /// Whether this advance completed the experience.
    pub const fn experience_completed(&self) -> bool {
        matches!(self.next, NextStep::ExperienceCompleted { .. })
    }

    /// Failed grants across the component and (if any) experience rewards.
    pub fn warnings(&self) -> Vec<&RewardGrantResult> {
        let mut warnings = grant_warnings(&self.rewards_granted);
        if let NextStep::ExperienceCompleted { completion } = &self.next {
            warnings.extend(grant_warnings(&completion.rewards_granted));
        }
        warnings
    }
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// The experience queried.
    pub experience: Experience,
    /// Three-state view of the pair.
    pub state: ExperienceState,
    /// The progress row, when one exists.
    pub progress: Option<UserExperienceProgress>,
    /// The current component, when one is set.
    pub current_component: Option<ExperienceComponent>,
    /// Every completion fact recorded for the row.
    pub completed_components: Vec<UserComponentCompletion>,
    /// Set only for `not_started`: whether every requirement is met.
    pub can_start: Option<bool>,
    /// Set only for `not_started`: the unmet requirements.
    pub missing_requirements: Vec<RequirementResult>,
}

/// Aggregate statistics for one experience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceStats {
    /// The experience.
    pub experience_id: ExperienceId,
    /// Stable key.
    pub key: String,
    /// Progress rows ever created.
    pub start_count: u64,
    /// Progress rows completed.
    pub completion_count: u64,
    /// Blended completion time in minutes.
    pub average_completion_time: Decimal,
    /// `completion_count / start_count * 100`.
    pub completion_rate: Decimal,
}

impl From<&Experience> for ExperienceStats {
    fn from(experience: &Experience) -> Self {
        Self {
            experience_id: experience.id,
            key: experience.key.clone(),
            start_count: experience.start_count,
            completion_count: experience.completion_count,
            average_completion_time: experience.average_completion_time,
            completion_rate: experience.completion_rate(),
        }
    }
}
