//! The progression engine.
//!
//! [`ProgressionEngine`] drives the per-(user, experience) state machine:
//!
//! ```text
//! NOT_STARTED --start--> IN_PROGRESS --advance (last component)--> COMPLETED
//!                              |                                       ^
//!                              +---------------complete----------------+
//! ```
//!
//! Absence of a progress row means `not_started`; `completed` is terminal.
//!
//! # Operation order
//!
//! Every mutating operation first validates, then performs one atomic store
//! write, then grants rewards. Rewards are granted only after the write has
//! committed and are best-effort: a failed grant is reported on the result
//! as a [`GrantOutcome::Failed`] entry and never undoes progress.
//!
//! # Component ordering
//!
//! With [`ComponentOrdering::Permissive`] any not-yet-completed component of
//! the experience may be reported and the cursor moves to the component
//! after the one reported. With [`ComponentOrdering::Sequential`] only the
//! current component is accepted.

use std::sync::Arc;

use tracing::{debug, info, warn};

use waypoint_requirements::{
    CapabilityError, CompletionHistory, ProfileSource, RequirementEvaluator,
};
use waypoint_types::{
    AdvanceOutcome, ComponentId, CompletionOutcome, Experience, ExperienceComponent,
    ExperienceId, ExperienceState, ExperienceStats, GrantOutcome, NextStep, RequirementResult,
    RequirementSpec, RewardGrantResult, RewardSpec, StartOutcome, StartStatus, StatusReport,
    UserExperienceProgress, UserId, ValidationReport,
};

use crate::clock::{Clock, SystemClock};
use crate::config::{ComponentOrdering, ProgressionConfig};
use crate::reward::RewardGranter;
use crate::store::{
    CatalogStore, CreateProgress, NewProgress, ProgressStore, RecordCompletion, StoreError,
};

/// Coarse classification of an [`EngineError`] for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request is not allowed in the current state.
    Validation,
    /// An experience, component or progress row does not exist.
    NotFound,
    /// A dependency failed. Nothing was committed.
    Fatal,
}

/// Errors returned by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// At least one requirement is not met.
    #[error("requirements not met for experience {experience_id} ({} missing)", .missing.len())]
    RequirementsNotMet {
        /// The experience.
        experience_id: ExperienceId,
        /// Every unmet requirement with its details.
        missing: Vec<RequirementResult>,
    },

    /// The user has already completed the experience.
    #[error("experience {experience_id} already completed")]
    AlreadyCompleted {
        /// The experience.
        experience_id: ExperienceId,
    },

    /// The progress row is not `in_progress`.
    #[error("experience {experience_id} is not in progress")]
    NotInProgress {
        /// The experience.
        experience_id: ExperienceId,
    },

    /// The experience has no components and cannot be started.
    #[error("experience {experience_id} has no components")]
    NoComponents {
        /// The experience.
        experience_id: ExperienceId,
    },

    /// The component was already completed in this progress row.
    #[error("component {component_id} already completed")]
    DuplicateCompletion {
        /// The component.
        component_id: ComponentId,
    },

    /// Sequential ordering is on and the component is not the current one.
    #[error("component {component_id} is out of order")]
    ComponentOutOfOrder {
        /// The component reported.
        component_id: ComponentId,
        /// The component expected.
        current: Option<ComponentId>,
    },

    /// The experience does not exist.
    #[error("experience {experience_id} not found")]
    ExperienceNotFound {
        /// The experience.
        experience_id: ExperienceId,
    },

    /// The component does not belong to the experience.
    #[error("component {component_id} not found in experience {experience_id}")]
    ComponentNotFound {
        /// The experience.
        experience_id: ExperienceId,
        /// The component.
        component_id: ComponentId,
    },

    /// The user has no progress row for the experience.
    #[error("user {user_id} has not started experience {experience_id}")]
    ProgressNotFound {
        /// The user.
        user_id: UserId,
        /// The experience.
        experience_id: ExperienceId,
    },

    /// A capability provider failed during requirement evaluation.
    #[error("capability error: {source}")]
    Capability {
        /// The underlying provider error.
        #[from]
        source: CapabilityError,
    },

    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

impl EngineError {
    /// Classify the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RequirementsNotMet { .. }
            | Self::AlreadyCompleted { .. }
            | Self::NotInProgress { .. }
            | Self::NoComponents { .. }
            | Self::DuplicateCompletion { .. }
            | Self::ComponentOutOfOrder { .. } => ErrorKind::Validation,
            Self::ExperienceNotFound { .. }
            | Self::ComponentNotFound { .. }
            | Self::ProgressNotFound { .. } => ErrorKind::NotFound,
            Self::Capability { .. } | Self::Store { .. } => ErrorKind::Fatal,
        }
    }

    /// Stable machine-readable code for the error.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RequirementsNotMet { .. } => "requirements_not_met",
            Self::AlreadyCompleted { .. } => "already_completed",
            Self::NotInProgress { .. } => "not_in_progress",
            Self::NoComponents { .. } => "no_components",
            Self::DuplicateCompletion { .. } => "duplicate_completion",
            Self::ComponentOutOfOrder { .. } => "component_out_of_order",
            Self::ExperienceNotFound { .. } => "experience_not_found",
            Self::ComponentNotFound { .. } => "component_not_found",
            Self::ProgressNotFound { .. } => "progress_not_found",
            Self::Capability { .. } => "capability_unavailable",
            Self::Store { .. } => "storage_failure",
        }
    }

    /// The unmet requirements carried by [`Self::RequirementsNotMet`].
    pub fn missing_requirements(&self) -> &[RequirementResult] {
        match self {
            Self::RequirementsNotMet { missing, .. } => missing,
            _ => &[],
        }
    }

    /// Translate a store error raised while acting on `experience_id`.
    fn from_store(err: StoreError, user_id: UserId, experience_id: ExperienceId) -> Self {
        match err {
            StoreError::DuplicateCompletion { component_id, .. } => {
                Self::DuplicateCompletion { component_id }
            }
            StoreError::NotInProgress { .. } => Self::NotInProgress { experience_id },
            StoreError::OutOfOrder {
                component_id,
                current,
                ..
            } => Self::ComponentOutOfOrder {
                component_id,
                current,
            },
            StoreError::ProgressNotFound { .. } => Self::ProgressNotFound {
                user_id,
                experience_id,
            },
            StoreError::ExperienceNotFound { experience_id } => {
                Self::ExperienceNotFound { experience_id }
            }
            source @ StoreError::Backend { .. } => Self::Store { source },
        }
    }
}

/// The experience progression engine.
///
/// Holds its collaborators by value; share it across tasks behind an
/// [`Arc`].
pub struct ProgressionEngine<S, P, R> {
    store: S,
    profile: P,
    rewards: R,
    clock: Arc<dyn Clock>,
    ordering: ComponentOrdering,
}

impl<S, P, R> ProgressionEngine<S, P, R>
where
    S: CatalogStore + ProgressStore + CompletionHistory,
    P: ProfileSource,
    R: RewardGranter,
{
    /// Create an engine using the system clock.
    pub fn new(store: S, profile: P, rewards: R, config: ProgressionConfig) -> Self {
        Self {
            store,
            profile,
            rewards,
            clock: Arc::new(SystemClock),
            ordering: config.component_ordering,
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The reward granter.
    pub const fn rewards(&self) -> &R {
        &self.rewards
    }

    /// The configured ordering policy.
    pub const fn ordering(&self) -> ComponentOrdering {
        self.ordering
    }

    // -----------------------------------------------------------------------
    // Requirements
    // -----------------------------------------------------------------------

    /// Evaluate an arbitrary requirement list for `user`.
    pub async fn validate_requirements(
        &self,
        user: UserId,
        requirements: &[RequirementSpec],
    ) -> Result<ValidationReport, EngineError> {
        let evaluator = RequirementEvaluator::new(&self.profile, &self.store);
        Ok(evaluator.validate(user, requirements).await?)
    }

    /// Whether `user` meets every requirement of `experience_id`, and which
    /// requirements are unmet.
    pub async fn can_start(
        &self,
        user: UserId,
        experience_id: ExperienceId,
    ) -> Result<(bool, Vec<RequirementResult>), EngineError> {
        self.require_experience(experience_id).await?;
        let report = self.experience_requirements(user, experience_id).await?;
        let missing = report.missing();
        Ok((report.all_met, missing))
    }

    /// The unmet requirements of `experience_id` for `user`.
    pub async fn missing_requirements(
        &self,
        user: UserId,
        experience_id: ExperienceId,
    ) -> Result<Vec<RequirementResult>, EngineError> {
        let (_, missing) = self.can_start(user, experience_id).await?;
        Ok(missing)
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    /// Start (or resume) an experience.
    ///
    /// Fails with [`EngineError::RequirementsNotMet`] when any requirement is
    /// unmet, [`EngineError::AlreadyCompleted`] when the experience is done,
    /// and [`EngineError::NoComponents`] when there is nothing to start. An
    /// existing `in_progress` row is returned unchanged as
    /// [`StartStatus::Resumed`].
    pub async fn start(
        &self,
        user: UserId,
        experience_id: ExperienceId,
    ) -> Result<StartOutcome, EngineError> {
        self.require_experience(experience_id).await?;

        let report = self.experience_requirements(user, experience_id).await?;
        if !report.all_met {
            let missing = report.missing();
            info!(
                user_id = %user,
                experience_id = %experience_id,
                missing = missing.len(),
                "Start rejected: requirements not met"
            );
            return Err(EngineError::RequirementsNotMet {
                experience_id,
                missing,
            });
        }

        let components = self.store.components(experience_id).await?;
        if let Some(existing) = self.store.find_progress(user, experience_id).await? {
            return resume(existing, &components);
        }

        let Some(first) = components.first() else {
            return Err(EngineError::NoComponents { experience_id });
        };
        let components_total = u32::try_from(components.len()).unwrap_or(u32::MAX);

        let created = self
            .store
            .create_progress(NewProgress {
                user_id: user,
                experience_id,
                first_component_id: first.id,
                components_total,
                now: self.clock.now(),
            })
            .await
            .map_err(|e| EngineError::from_store(e, user, experience_id))?;

        match created {
            CreateProgress::Created(progress) => {
                info!(
                    user_id = %user,
                    experience_id = %experience_id,
                    progress_id = %progress.id,
                    components_total,
                    "Experience started"
                );
                Ok(StartOutcome {
                    status: StartStatus::Started,
                    progress,
                    current_component: Some(first.clone()),
                })
            }
            // Another caller inserted the row between our read and write.
            CreateProgress::Existing(progress) => resume(progress, &components),
        }
    }

    /// Record completion of one component.
    ///
    /// Grants the component's rewards, then moves to the next component by
    /// `sequence_order`. When no component follows, the experience is
    /// completed in the same write and its rewards are granted too.
    pub async fn advance(
        &self,
        user: UserId,
        experience_id: ExperienceId,
        component_id: ComponentId,
        completion_data: serde_json::Value,
    ) -> Result<AdvanceOutcome, EngineError> {
        let progress = self.require_progress(user, experience_id).await?;
        if progress.is_completed() {
            return Err(EngineError::NotInProgress { experience_id });
        }

        let components = self.store.components(experience_id).await?;
        let Some(component) = components.iter().find(|c| c.id == component_id) else {
            return Err(EngineError::ComponentNotFound {
                experience_id,
                component_id,
            });
        };

        let require_current = self.ordering == ComponentOrdering::Sequential;
        if require_current && progress.current_component_id != Some(component_id) {
            return Err(EngineError::ComponentOutOfOrder {
                component_id,
                current: progress.current_component_id,
            });
        }

        let next = components
            .iter()
            .find(|c| c.sequence_order > component.sequence_order);
        let experience_rewards = if next.is_none() {
            self.store.rewards(experience_id).await?
        } else {
            Vec::new()
        };

        let now = self.clock.now();
        let recorded = self
            .store
            .record_completion(RecordCompletion {
                progress_id: progress.id,
                component_id,
                completion_data,
                next_component_id: next.map(|c| c.id),
                require_current,
                now,
            })
            .await
            .map_err(|e| EngineError::from_store(e, user, experience_id))?;

        info!(
            user_id = %user,
            experience_id = %experience_id,
            component_id = %component_id,
            completed = recorded.components_completed,
            total = recorded.components_total,
            "Component completed"
        );

        let rewards_granted = self.grant_all(user, &component.reward_specs()).await;

        let next_step = match next {
            Some(next) if !recorded.is_completed() => NextStep::Component {
                component: next.clone(),
            },
            _ => {
                info!(
                    user_id = %user,
                    experience_id = %experience_id,
                    progress_id = %recorded.id,
                    "Experience completed"
                );
                NextStep::ExperienceCompleted {
                    completion: CompletionOutcome {
                        progress: recorded.clone(),
                        rewards_granted: self.grant_all(user, &experience_rewards).await,
                    },
                }
            }
        };

        Ok(AdvanceOutcome {
            component_completed: component.clone(),
            progress: recorded,
            rewards_granted,
            next: next_step,
        })
    }

    /// Complete an `in_progress` experience without reporting its remaining
    /// components, granting every experience-level reward.
    ///
    /// This is an administrative override. Normal progression reaches
    /// `completed` only through [`Self::advance`] on the final component;
    /// `complete` skips whatever components remain and records no completion
    /// facts for them.
    pub async fn complete(
        &self,
        user: UserId,
        experience_id: ExperienceId,
    ) -> Result<CompletionOutcome, EngineError> {
        let progress = self.require_progress(user, experience_id).await?;
        if progress.is_completed() {
            return Err(EngineError::AlreadyCompleted { experience_id });
        }

        let experience_rewards = self.store.rewards(experience_id).await?;
        let completed = self
            .store
            .complete_progress(progress.id, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::NotInProgress { .. } => EngineError::AlreadyCompleted { experience_id },
                other => EngineError::from_store(other, user, experience_id),
            })?;

        info!(
            user_id = %user,
            experience_id = %experience_id,
            progress_id = %completed.id,
            "Experience completed"
        );

        let rewards_granted = self.grant_all(user, &experience_rewards).await;
        Ok(CompletionOutcome {
            progress: completed,
            rewards_granted,
        })
    }

    /// Report where `user` stands in `experience_id`.
    ///
    /// With no progress row, requirements are evaluated and the report
    /// carries `can_start` and the unmet requirements.
    pub async fn status(
        &self,
        user: UserId,
        experience_id: ExperienceId,
    ) -> Result<StatusReport, EngineError> {
        let experience = self.require_experience(experience_id).await?;

        let Some(progress) = self.store.find_progress(user, experience_id).await? else {
            let report = self.experience_requirements(user, experience_id).await?;
            let missing_requirements = report.missing();
            return Ok(StatusReport {
                experience,
                state: ExperienceState::NotStarted,
                progress: None,
                current_component: None,
                completed_components: Vec::new(),
                can_start: Some(report.all_met),
                missing_requirements,
            });
        };

        let components = self.store.components(experience_id).await?;
        let completed_components = self.store.completions(progress.id).await?;
        debug!(
            user_id = %user,
            experience_id = %experience_id,
            status = %progress.status,
            "Status read"
        );

        Ok(StatusReport {
            experience,
            state: progress.status.into(),
            current_component: find_component(&components, progress.current_component_id),
            progress: Some(progress),
            completed_components,
            can_start: None,
            missing_requirements: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Aggregate statistics for one experience.
    pub async fn experience_stats(
        &self,
        experience_id: ExperienceId,
    ) -> Result<ExperienceStats, EngineError> {
        let experience = self.require_experience(experience_id).await?;
        Ok(ExperienceStats::from(&experience))
    }

    /// The `limit` most-started experiences.
    pub async fn popular_experiences(
        &self,
        limit: usize,
    ) -> Result<Vec<ExperienceStats>, EngineError> {
        let experiences = self.store.popular_experiences(limit).await?;
        Ok(experiences.iter().map(ExperienceStats::from).collect())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn require_experience(
        &self,
        experience_id: ExperienceId,
    ) -> Result<Experience, EngineError> {
        self.store
            .experience(experience_id)
            .await?
            .ok_or(EngineError::ExperienceNotFound { experience_id })
    }

    async fn require_progress(
        &self,
        user: UserId,
        experience_id: ExperienceId,
    ) -> Result<UserExperienceProgress, EngineError> {
        self.store
            .find_progress(user, experience_id)
            .await?
            .ok_or(EngineError::ProgressNotFound {
                user_id: user,
                experience_id,
            })
    }

    async fn experience_requirements(
        &self,
        user: UserId,
        experience_id: ExperienceId,
    ) -> Result<ValidationReport, EngineError> {
        let requirements = self.store.requirements(experience_id).await?;
        self.validate_requirements(user, &requirements).await
    }

    /// Grant each reward independently, collecting one result per reward.
    async fn grant_all(&self, user: UserId, rewards: &[RewardSpec]) -> Vec<RewardGrantResult> {
        let mut results = Vec::with_capacity(rewards.len());
        for reward in rewards {
            let outcome = match self.rewards.grant_reward(user, reward).await {
                Ok(()) => GrantOutcome::Granted,
                Err(err) => {
                    warn!(
                        user_id = %user,
                        reward_type = reward.reward_type.as_str(),
                        error = %err,
                        "Reward grant failed"
                    );
                    GrantOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            results.push(RewardGrantResult {
                reward: reward.clone(),
                outcome,
            });
        }
        results
    }
}

fn resume(
    progress: UserExperienceProgress,
    components: &[ExperienceComponent],
) -> Result<StartOutcome, EngineError> {
    if progress.is_completed() {
        return Err(EngineError::AlreadyCompleted {
            experience_id: progress.experience_id,
        });
    }
    debug!(
        user_id = %progress.user_id,
        experience_id = %progress.experience_id,
        "Experience resumed"
    );
    Ok(StartOutcome {
        status: StartStatus::Resumed,
        current_component: find_component(components, progress.current_component_id),
        progress,
    })
}

fn find_component(
    components: &[ExperienceComponent],
    id: Option<ComponentId>,
) -> Option<ExperienceComponent> {
    let id = id?;
    components.iter().find(|c| c.id == id).cloned()
}
