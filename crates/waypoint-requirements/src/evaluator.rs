//! The composite requirement evaluator.
//!
//! [`RequirementEvaluator::validate`] checks a user against a list of stored
//! requirements and returns one [`RequirementResult`] per requirement plus the
//! logical AND of them all. Details are returned for met requirements too so
//! callers can render progress toward gates that are already satisfied.
//!
//! Evaluation is a pure read. A requirement that cannot be parsed fails
//! closed; a capability provider that cannot answer aborts the whole call
//! with a [`CapabilityError`].

use std::collections::BTreeSet;

use waypoint_types::{
    AchievementId, ExperienceId, ItemId, RequirementDetails, RequirementResult, RequirementSpec,
    UserId, ValidationReport,
};

use crate::capability::{CapabilityError, CompletionHistory, ProfileSource};
use crate::requirement::Requirement;

/// Evaluates requirements against a profile source and completion history.
pub struct RequirementEvaluator<'a, P, H> {
    profile: &'a P,
    history: &'a H,
}

impl<'a, P: ProfileSource, H: CompletionHistory> RequirementEvaluator<'a, P, H> {
    /// Create an evaluator bound to its capability providers.
    pub const fn new(profile: &'a P, history: &'a H) -> Self {
        Self { profile, history }
    }

    /// Evaluate every requirement for `user`.
    ///
    /// `all_met` is true for an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] if any provider fails to answer.
    pub async fn validate(
        &self,
        user: UserId,
        requirements: &[RequirementSpec],
    ) -> Result<ValidationReport, CapabilityError> {
        let mut results = Vec::with_capacity(requirements.len());
        for spec in requirements {
            results.push(self.evaluate(user, spec).await?);
        }
        let all_met = results.iter().all(|r| r.met);

        tracing::debug!(
            user_id = %user,
            requirements = results.len(),
            all_met,
            "Evaluated requirements"
        );

        Ok(ValidationReport { all_met, results })
    }

    /// Evaluate a single requirement for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError`] if the provider for this requirement fails.
    pub async fn evaluate(
        &self,
        user: UserId,
        spec: &RequirementSpec,
    ) -> Result<RequirementResult, CapabilityError> {
        let requirement = match Requirement::parse(spec) {
            Ok(requirement) => requirement,
            Err(err) => {
                tracing::warn!(
                    user_id = %user,
                    requirement_type = spec.requirement_type.as_str(),
                    error = %err,
                    "Requirement cannot be evaluated, treating as not met"
                );
                return Ok(RequirementResult {
                    requirement: spec.clone(),
                    met: false,
                    details: RequirementDetails::Error {
                        failure: (&err).into(),
                    },
                });
            }
        };

        let (met, details) = match requirement {
            Requirement::Level { min_level } => self.check_level(user, min_level).await?,
            Requirement::Membership { required } => self.check_membership(user, required).await?,
            Requirement::Item {
                item_ids,
                all_required,
            } => self.check_items(user, item_ids, all_required).await?,
            Requirement::Achievement { achievement_ids } => {
                self.check_achievements(user, achievement_ids).await?
            }
            Requirement::ExperienceCompleted { experience_ids } => {
                self.check_experiences(user, experience_ids).await?
            }
            Requirement::Currency { min_amount } => self.check_currency(user, min_amount).await?,
        };

        Ok(RequirementResult {
            requirement: spec.clone(),
            met,
            details,
        })
    }

    async fn check_level(
        &self,
        user: UserId,
        min_level: i64,
    ) -> Result<(bool, RequirementDetails), CapabilityError> {
        let current_level = self.profile.user_level(user).await?;
        Ok((
            current_level >= min_level,
            RequirementDetails::Level {
                required_level: min_level,
                current_level,
                missing_levels: min_level.saturating_sub(current_level).max(0),
            },
        ))
    }

    async fn check_membership(
        &self,
        user: UserId,
        required: bool,
    ) -> Result<(bool, RequirementDetails), CapabilityError> {
        if !required {
            return Ok((
                true,
                RequirementDetails::Membership {
                    membership_required: false,
                    has_membership: None,
                },
            ));
        }
        let has_membership = self.profile.has_active_membership(user).await?;
        Ok((
            has_membership,
            RequirementDetails::Membership {
                membership_required: true,
                has_membership: Some(has_membership),
            },
        ))
    }

    async fn check_items(
        &self,
        user: UserId,
        item_ids: Vec<ItemId>,
        all_required: bool,
    ) -> Result<(bool, RequirementDetails), CapabilityError> {
        if item_ids.is_empty() {
            return Ok((true, item_details(item_ids, Vec::new(), all_required, Vec::new())));
        }

        let owned = self.profile.owned_items(user).await?;
        let (held, lacking) = partition_owned(&item_ids, &owned);

        let (met, missing) = if all_required {
            (lacking.is_empty(), lacking)
        } else if held.is_empty() {
            (false, item_ids.clone())
        } else {
            (true, Vec::new())
        };

        Ok((met, item_details(item_ids, held, all_required, missing)))
    }

    async fn check_achievements(
        &self,
        user: UserId,
        achievement_ids: Vec<AchievementId>,
    ) -> Result<(bool, RequirementDetails), CapabilityError> {
        let unlocked = if achievement_ids.is_empty() {
            BTreeSet::new()
        } else {
            self.profile.unlocked_achievements(user).await?
        };
        let (held, missing) = partition_owned(&achievement_ids, &unlocked);
        Ok((
            missing.is_empty(),
            RequirementDetails::Achievement {
                required_achievements: achievement_ids,
                unlocked_achievements: held,
                missing_achievements: missing,
            },
        ))
    }

    async fn check_experiences(
        &self,
        user: UserId,
        experience_ids: Vec<ExperienceId>,
    ) -> Result<(bool, RequirementDetails), CapabilityError> {
        let mut completed = Vec::new();
        let mut missing = Vec::new();
        for &experience in &experience_ids {
            if self.history.has_completed_experience(user, experience).await? {
                completed.push(experience);
            } else {
                missing.push(experience);
            }
        }
        Ok((
            missing.is_empty(),
            RequirementDetails::ExperienceCompleted {
                required_experiences: experience_ids,
                completed_experiences: completed,
                missing_experiences: missing,
            },
        ))
    }

    async fn check_currency(
        &self,
        user: UserId,
        min_amount: i64,
    ) -> Result<(bool, RequirementDetails), CapabilityError> {
        if min_amount <= 0 {
            return Ok((
                true,
                RequirementDetails::Currency {
                    required_amount: min_amount,
                    current_balance: None,
                    missing_currency: 0,
                },
            ));
        }
        let current_balance = self.profile.currency_balance(user).await?;
        Ok((
            current_balance >= min_amount,
            RequirementDetails::Currency {
                required_amount: min_amount,
                current_balance: Some(current_balance),
                missing_currency: min_amount.saturating_sub(current_balance).max(0),
            },
        ))
    }
}

/// Split `required` into (held, lacking), preserving input order.
fn partition_owned<T: Ord + Copy>(required: &[T], owned: &BTreeSet<T>) -> (Vec<T>, Vec<T>) {
    required.iter().copied().partition(|id| owned.contains(id))
}

const fn item_details(
    required_items: Vec<ItemId>,
    owned_items: Vec<ItemId>,
    all_required: bool,
    missing_items: Vec<ItemId>,
) -> RequirementDetails {
    RequirementDetails::Item {
        required_items,
        owned_items,
        all_required,
        missing_items,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use waypoint_types::EvaluationFailure;

    use super::*;
    use crate::profile::{StaticProfileSource, UserProfile};

    /// Completion history backed by a fixed set of pairs.
    struct CompletedSet(BTreeSet<(UserId, ExperienceId)>);

    impl CompletionHistory for CompletedSet {
        async fn has_completed_experience(
            &self,
            user: UserId,
            experience: ExperienceId,
        ) -> Result<bool, CapabilityError> {
            Ok(self.0.contains(&(user, experience)))
        }
    }

    /// Profile source whose every query fails.
    struct Offline;

    impl ProfileSource for Offline {
        async fn user_level(&self, _user: UserId) -> Result<i64, CapabilityError> {
            Err(CapabilityError::new("user_level", "connection refused"))
        }
        async fn has_active_membership(&self, _user: UserId) -> Result<bool, CapabilityError> {
            Err(CapabilityError::new("membership", "connection refused"))
        }
        async fn owned_items(&self, _user: UserId) -> Result<BTreeSet<ItemId>, CapabilityError> {
            Err(CapabilityError::new("inventory", "connection refused"))
        }
        async fn unlocked_achievements(
            &self,
            _user: UserId,
        ) -> Result<BTreeSet<AchievementId>, CapabilityError> {
            Err(CapabilityError::new("achievements", "connection refused"))
        }
        async fn currency_balance(&self, _user: UserId) -> Result<i64, CapabilityError> {
            Err(CapabilityError::new("balance", "connection refused"))
        }
    }

    const USER: UserId = UserId::new(7);

    fn spec(kind: &str, value: serde_json::Value) -> RequirementSpec {
        RequirementSpec {
            requirement_type: kind.to_owned(),
            requirement_value: value,
        }
    }

    fn no_history() -> CompletedSet {
        CompletedSet(BTreeSet::new())
    }

    #[tokio::test]
    async fn level_gap_reported_but_currency_met() {
        let profile = StaticProfileSource::new().with_user(
            USER,
            UserProfile::default().with_level(2).with_balance(600),
        );
        let history = no_history();
        let evaluator = RequirementEvaluator::new(&profile, &history);

        let report = evaluator
            .validate(
                USER,
                &[
                    spec("level", serde_json::json!({"min_level": 3})),
                    spec("currency", serde_json::json!({"min_amount": 500})),
                ],
            )
            .await
            .unwrap();

        assert!(!report.all_met);
        assert_eq!(report.results.len(), 2);
        let missing = report.missing();
        assert_eq!(missing.len(), 1);
        assert_eq!(
            missing.first().map(|r| r.details.clone()),
            Some(RequirementDetails::Level {
                required_level: 3,
                current_level: 2,
                missing_levels: 1,
            })
        );
    }

    #[tokio::test]
    async fn empty_requirement_list_is_met() {
        let profile = StaticProfileSource::new();
        let history = no_history();
        let report = RequirementEvaluator::new(&profile, &history)
            .validate(USER, &[])
            .await
            .unwrap();
        assert!(report.all_met);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn membership_not_required_always_passes() {
        let profile = StaticProfileSource::new();
        let history = no_history();
        let evaluator = RequirementEvaluator::new(&profile, &history);

        let optional = evaluator
            .evaluate(USER, &spec("membership", serde_json::json!({"required": false})))
            .await
            .unwrap();
        assert!(optional.met);
        assert_eq!(
            optional.details,
            RequirementDetails::Membership {
                membership_required: false,
                has_membership: None,
            }
        );

        let required = evaluator
            .evaluate(USER, &spec("vip_membership", serde_json::json!({"required": true})))
            .await
            .unwrap();
        assert!(!required.met);
        assert_eq!(
            required.details,
            RequirementDetails::Membership {
                membership_required: true,
                has_membership: Some(false),
            }
        );
    }

    #[tokio::test]
    async fn items_all_required_lists_missing() {
        let profile = StaticProfileSource::new()
            .with_user(USER, UserProfile::default().with_items([1, 3]));
        let history = no_history();
        let result = RequirementEvaluator::new(&profile, &history)
            .evaluate(USER, &spec("item", serde_json::json!({"item_ids": [1, 2, 3]})))
            .await
            .unwrap();

        assert!(!result.met);
        assert_eq!(
            result.details,
            RequirementDetails::Item {
                required_items: vec![ItemId::new(1), ItemId::new(2), ItemId::new(3)],
                owned_items: vec![ItemId::new(1), ItemId::new(3)],
                all_required: true,
                missing_items: vec![ItemId::new(2)],
            }
        );
    }

    #[tokio::test]
    async fn items_any_of_needs_one() {
        let history = no_history();
        let any_of = spec("item", serde_json::json!({"item_ids": [4, 5], "all_required": false}));

        let owns_one = StaticProfileSource::new()
            .with_user(USER, UserProfile::default().with_items([5]));
        let result = RequirementEvaluator::new(&owns_one, &history)
            .evaluate(USER, &any_of)
            .await
            .unwrap();
        assert!(result.met);

        let owns_none = StaticProfileSource::new();
        let result = RequirementEvaluator::new(&owns_none, &history)
            .evaluate(USER, &any_of)
            .await
            .unwrap();
        assert!(!result.met);
        assert!(matches!(
            result.details,
            RequirementDetails::Item { ref missing_items, .. } if missing_items.len() == 2
        ));
    }

    #[tokio::test]
    async fn achievements_require_every_id() {
        let profile = StaticProfileSource::new()
            .with_user(USER, UserProfile::default().with_achievements([10, 11]));
        let history = no_history();
        let evaluator = RequirementEvaluator::new(&profile, &history);

        let met = evaluator
            .evaluate(USER, &spec("achievement", serde_json::json!({"achievement_ids": [10]})))
            .await
            .unwrap();
        assert!(met.met);

        let unmet = evaluator
            .evaluate(
                USER,
                &spec("achievement", serde_json::json!({"achievement_ids": [10, 12]})),
            )
            .await
            .unwrap();
        assert!(!unmet.met);
        assert!(matches!(
            unmet.details,
            RequirementDetails::Achievement { ref missing_achievements, .. }
                if missing_achievements == &vec![AchievementId::new(12)]
        ));
    }

    #[tokio::test]
    async fn prior_experience_checked_against_history() {
        let profile = StaticProfileSource::new();
        let history = CompletedSet([(USER, ExperienceId::new(1))].into_iter().collect());
        let evaluator = RequirementEvaluator::new(&profile, &history);

        let result = evaluator
            .evaluate(
                USER,
                &spec("experience_completed", serde_json::json!({"experience_ids": [1, 2]})),
            )
            .await
            .unwrap();
        assert!(!result.met);
        assert_eq!(
            result.details,
            RequirementDetails::ExperienceCompleted {
                required_experiences: vec![ExperienceId::new(1), ExperienceId::new(2)],
                completed_experiences: vec![ExperienceId::new(1)],
                missing_experiences: vec![ExperienceId::new(2)],
            }
        );
    }

    #[tokio::test]
    async fn currency_shortfall_reported() {
        let profile = StaticProfileSource::new()
            .with_user(USER, UserProfile::default().with_balance(120));
        let history = no_history();
        let result = RequirementEvaluator::new(&profile, &history)
            .evaluate(USER, &spec("besitos", serde_json::json!({"min_besitos": 500})))
            .await
            .unwrap();
        assert!(!result.met);
        assert_eq!(
            result.details,
            RequirementDetails::Currency {
                required_amount: 500,
                current_balance: Some(120),
                missing_currency: 380,
            }
        );
    }

    #[tokio::test]
    async fn zero_currency_gate_reports_no_balance() {
        let history = no_history();
        let result = RequirementEvaluator::new(&Offline, &history)
            .evaluate(USER, &spec("currency", serde_json::json!({"min_amount": 0})))
            .await
            .unwrap();
        assert!(result.met);
        assert_eq!(
            result.details,
            RequirementDetails::Currency {
                required_amount: 0,
                current_balance: None,
                missing_currency: 0,
            }
        );
    }

    #[tokio::test]
    async fn unknown_type_fails_closed() {
        let profile = StaticProfileSource::new();
        let history = no_history();
        let report = RequirementEvaluator::new(&profile, &history)
            .validate(USER, &[spec("karma", serde_json::json!({"min": 1}))])
            .await
            .unwrap();

        assert!(!report.all_met);
        assert_eq!(
            report.results.first().map(|r| r.details.clone()),
            Some(RequirementDetails::Error {
                failure: EvaluationFailure::UnknownRequirementType {
                    requirement_type: "karma".to_owned(),
                },
            })
        );
    }

    #[tokio::test]
    async fn provider_failure_aborts_validation() {
        let history = no_history();
        let result = RequirementEvaluator::new(&Offline, &history)
            .validate(USER, &[spec("level", serde_json::json!({"min_level": 2}))])
            .await;
        assert_eq!(result.err().map(|e| e.capability), Some("user_level"));
    }

    #[tokio::test]
    async fn gates_with_nothing_to_check_skip_the_provider() {
        let history = no_history();
        let evaluator = RequirementEvaluator::new(&Offline, &history);
        let report = evaluator
            .validate(
                USER,
                &[
                    spec("item", serde_json::json!({"item_ids": []})),
                    spec("currency", serde_json::json!({"min_amount": 0})),
                    spec("membership", serde_json::json!({})),
                ],
            )
            .await
            .unwrap();
        assert!(report.all_met);
    }
}
