//! Storage seams for the progression engine.
//!
//! [`CatalogStore`] reads authored experience definitions and the aggregate
//! statistics the engine maintains on them. [`ProgressStore`] owns the
//! per-user progress rows and completion facts.
//!
//! Each mutating operation is atomic: it either applies every change it
//! describes or none. Exclusivity comes from the store, not from the
//! engine. Two concurrent [`ProgressStore::create_progress`] calls for one
//! pair produce one row, and two concurrent
//! [`ProgressStore::record_completion`] calls for one component produce one
//! completion fact.

use std::future::Future;

use chrono::{DateTime, Utc};

use waypoint_types::{
    ComponentId, Experience, ExperienceComponent, ExperienceId, ProgressId, RequirementSpec,
    RewardSpec, UserComponentCompletion, UserExperienceProgress, UserId,
};

/// Errors raised by store implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A completion fact already exists for this (progress, component).
    #[error("component {component_id} already completed in progress row {progress_id}")]
    DuplicateCompletion {
        /// The progress row.
        progress_id: ProgressId,
        /// The component reported twice.
        component_id: ComponentId,
    },

    /// The progress row is no longer `in_progress`.
    #[error("progress row {progress_id} is not in progress")]
    NotInProgress {
        /// The progress row.
        progress_id: ProgressId,
    },

    /// The reported component is not the row's current component.
    #[error("component {component_id} is not current in progress row {progress_id}")]
    OutOfOrder {
        /// The progress row.
        progress_id: ProgressId,
        /// The component reported.
        component_id: ComponentId,
        /// The row's current component at the time of the write.
        current: Option<ComponentId>,
    },

    /// The progress row does not exist.
    #[error("progress row {progress_id} not found")]
    ProgressNotFound {
        /// The missing row.
        progress_id: ProgressId,
    },

    /// The experience row does not exist.
    #[error("experience {experience_id} not found")]
    ExperienceNotFound {
        /// The missing experience.
        experience_id: ExperienceId,
    },

    /// The backend failed. The operation was rolled back.
    #[error("storage backend error: {message}")]
    Backend {
        /// Backend error message.
        message: String,
    },
}

impl StoreError {
    /// Wrap a backend failure.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// A new progress row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgress {
    /// The user starting.
    pub user_id: UserId,
    /// The experience started.
    pub experience_id: ExperienceId,
    /// The first component by `sequence_order`.
    pub first_component_id: ComponentId,
    /// Component count snapshotted now.
    pub components_total: u32,
    /// Creation time.
    pub now: DateTime<Utc>,
}

/// Result of [`ProgressStore::create_progress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateProgress {
    /// The row was inserted and `start_count` incremented.
    Created(UserExperienceProgress),
    /// A row already existed for the pair. Nothing was written.
    Existing(UserExperienceProgress),
}

impl CreateProgress {
    /// Whether a new row was inserted.
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    /// The row, new or existing.
    pub fn into_progress(self) -> UserExperienceProgress {
        match self {
            Self::Created(progress) | Self::Existing(progress) => progress,
        }
    }
}

/// A component completion to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCompletion {
    /// The progress row.
    pub progress_id: ProgressId,
    /// The completed component.
    pub component_id: ComponentId,
    /// Caller payload stored with the completion fact.
    pub completion_data: serde_json::Value,
    /// The new current component. `None` finishes the experience in the
    /// same write.
    pub next_component_id: Option<ComponentId>,
    /// When set, the write fails with [`StoreError::OutOfOrder`] unless the
    /// row's current component equals `component_id`.
    pub require_current: bool,
    /// Completion time.
    pub now: DateTime<Utc>,
}

/// Read access to authored experience definitions and their statistics.
pub trait CatalogStore: Send + Sync {
    /// Fetch one experience.
    fn experience(
        &self,
        experience: ExperienceId,
    ) -> impl Future<Output = Result<Option<Experience>, StoreError>> + Send;

    /// Every component of an experience, ascending by `sequence_order`.
    fn components(
        &self,
        experience: ExperienceId,
    ) -> impl Future<Output = Result<Vec<ExperienceComponent>, StoreError>> + Send;

    /// The experience's requirement rows.
    fn requirements(
        &self,
        experience: ExperienceId,
    ) -> impl Future<Output = Result<Vec<RequirementSpec>, StoreError>> + Send;

    /// The experience-level rewards granted on completion.
    fn rewards(
        &self,
        experience: ExperienceId,
    ) -> impl Future<Output = Result<Vec<RewardSpec>, StoreError>> + Send;

    /// Experiences ordered by `start_count` descending, then by id.
    fn popular_experiences(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Experience>, StoreError>> + Send;
}

/// Ownership of per-user progress rows and completion facts.
pub trait ProgressStore: Send + Sync {
    /// Insert a progress row unless one exists for the pair.
    ///
    /// On insert, the experience's `start_count` is incremented in the same
    /// atomic write.
    fn create_progress(
        &self,
        new: NewProgress,
    ) -> impl Future<Output = Result<CreateProgress, StoreError>> + Send;

    /// The progress row for a pair, if any.
    fn find_progress(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> impl Future<Output = Result<Option<UserExperienceProgress>, StoreError>> + Send;

    /// Record a completion fact and move the row forward.
    ///
    /// Increments `components_completed`, recomputes the percentage, stamps
    /// `last_activity_at` and sets the current component. When
    /// `next_component_id` is `None` the row is also completed and the
    /// experience statistics are updated, all in one atomic write.
    fn record_completion(
        &self,
        completion: RecordCompletion,
    ) -> impl Future<Output = Result<UserExperienceProgress, StoreError>> + Send;

    /// Complete an `in_progress` row and update the experience statistics.
    fn complete_progress(
        &self,
        progress: ProgressId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<UserExperienceProgress, StoreError>> + Send;

    /// Every completion fact for a row, in completion order.
    fn completions(
        &self,
        progress: ProgressId,
    ) -> impl Future<Output = Result<Vec<UserComponentCompletion>, StoreError>> + Send;
}
