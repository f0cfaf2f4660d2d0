//! Capability interfaces the evaluator reads from.
//!
//! Level, membership, inventory, achievements and balance belong to external
//! subsystems; [`ProfileSource`] abstracts how they are queried. Experience
//! completion is answered by the progression engine's own records through
//! [`CompletionHistory`], which progress stores implement.
//!
//! Methods return `impl Future + Send` so engines built on these traits can
//! be driven from multi-threaded runtimes.

use std::collections::BTreeSet;
use std::future::Future;

use waypoint_types::{AchievementId, ExperienceId, ItemId, UserId};

/// A capability provider failed to answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{capability} unavailable: {message}")]
pub struct CapabilityError {
    /// Which capability failed (e.g. `"user_level"`).
    pub capability: &'static str,
    /// Provider error message.
    pub message: String,
}

impl CapabilityError {
    /// Build an error for the named capability.
    pub fn new(capability: &'static str, message: impl Into<String>) -> Self {
        Self {
            capability,
            message: message.into(),
        }
    }
}

/// Read access to the user-facing subsystems that gate experiences.
pub trait ProfileSource: Send + Sync {
    /// The user's current level.
    fn user_level(&self, user: UserId) -> impl Future<Output = Result<i64, CapabilityError>> + Send;

    /// Whether the user holds an active paid membership right now.
    fn has_active_membership(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<bool, CapabilityError>> + Send;

    /// Every item the user owns.
    fn owned_items(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<BTreeSet<ItemId>, CapabilityError>> + Send;

    /// Every achievement the user has unlocked.
    fn unlocked_achievements(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<BTreeSet<AchievementId>, CapabilityError>> + Send;

    /// The user's spendable-currency balance.
    fn currency_balance(
        &self,
        user: UserId,
    ) -> impl Future<Output = Result<i64, CapabilityError>> + Send;
}

/// Whether a user has completed an experience.
pub trait CompletionHistory: Send + Sync {
    /// True iff a `completed` progress row exists for the pair.
    fn has_completed_experience(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> impl Future<Output = Result<bool, CapabilityError>> + Send;
}
