//! Reward granting seam.
//!
//! The engine never writes to the reward subsystem's state directly. It
//! hands each [`RewardSpec`] to a [`RewardGranter`] after the progress write
//! has committed. Grant failures are reported on the operation result and
//! never undo progress.

use std::future::Future;
use std::sync::Mutex;

use waypoint_requirements::CapabilityError;
use waypoint_types::{RewardSpec, UserId};

/// Write access to the reward subsystem.
pub trait RewardGranter: Send + Sync {
    /// Grant one reward to `user`.
    fn grant_reward(
        &self,
        user: UserId,
        reward: &RewardSpec,
    ) -> impl Future<Output = Result<(), CapabilityError>> + Send;
}

/// A granter that records every grant in memory.
///
/// Reward types listed in `failing` are rejected instead, which lets tests
/// exercise the best-effort path.
#[derive(Debug, Default)]
pub struct RecordingRewardGranter {
    granted: Mutex<Vec<(UserId, RewardSpec)>>,
    failing: Vec<String>,
}

impl RecordingRewardGranter {
    /// Create a granter that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject grants of the given reward type.
    #[must_use]
    pub fn failing_on(mut self, reward_type: &str) -> Self {
        self.failing.push(reward_type.to_owned());
        self
    }

    /// Every successful grant so far, in grant order.
    pub fn granted(&self) -> Vec<(UserId, RewardSpec)> {
        match self.granted.lock() {
            Ok(granted) => granted.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of successful grants of `reward_type`.
    pub fn count_of(&self, reward_type: &str) -> usize {
        self.granted()
            .iter()
            .filter(|(_, reward)| reward.reward_type == reward_type)
            .count()
    }
}

impl RewardGranter for RecordingRewardGranter {
    async fn grant_reward(&self, user: UserId, reward: &RewardSpec) -> Result<(), CapabilityError> {
        if self.failing.contains(&reward.reward_type) {
            return Err(CapabilityError::new(
                "reward",
                format!("{} rewards are unavailable", reward.reward_type),
            ));
        }
        self.granted
            .lock()
            .map_err(|e| CapabilityError::new("reward", e.to_string()))?
            .push((user, reward.clone()));
        Ok(())
    }
}
