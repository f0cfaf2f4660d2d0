//! Row types read from the engine's tables.
//!
//! Columns are decoded into database-native types first and converted into
//! the domain types afterwards, so a value the domain cannot represent
//! surfaces as [`DbError::InvalidRow`] instead of a decode panic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use waypoint_types::{
    ComponentId, Experience, ExperienceComponent, ExperienceId, ProgressId, ProgressStatus,
    RequirementSpec, RewardSpec, UserComponentCompletion, UserExperienceProgress, UserId,
};

use crate::error::DbError;

/// Column list for [`ExperienceRow`].
pub(crate) const EXPERIENCE_COLUMNS: &str =
    "id, key, title, description, start_count, completion_count, average_completion_time";

/// Column list for [`ProgressRow`].
pub(crate) const PROGRESS_COLUMNS: &str = "id, user_id, experience_id, status, \
     current_component_id, started_at, completed_at, last_activity_at, \
     completion_percentage, components_completed, components_total";

/// A row from the `experiences` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExperienceRow {
    /// Experience key.
    pub id: i64,
    /// Stable machine-readable key.
    pub key: String,
    /// Display title.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Progress rows ever created.
    pub start_count: i64,
    /// Progress rows completed.
    pub completion_count: i64,
    /// Blended completion time in minutes.
    pub average_completion_time: Decimal,
}

impl From<ExperienceRow> for Experience {
    fn from(row: ExperienceRow) -> Self {
        Self {
            id: ExperienceId::new(row.id),
            key: row.key,
            title: row.title,
            description: row.description,
            start_count: u64::try_from(row.start_count).unwrap_or(0),
            completion_count: u64::try_from(row.completion_count).unwrap_or(0),
            average_completion_time: row.average_completion_time,
        }
    }
}

/// A row from the `experience_components` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ComponentRow {
    /// Component key.
    pub id: i64,
    /// Owning experience.
    pub experience_id: i64,
    /// Position within the experience.
    pub sequence_order: i32,
    /// Display title.
    pub title: String,
    /// Free-form type tag.
    pub component_type: String,
    /// Reward type to payload.
    pub completion_rewards: Json<BTreeMap<String, serde_json::Value>>,
}

impl From<ComponentRow> for ExperienceComponent {
    fn from(row: ComponentRow) -> Self {
        Self {
            id: ComponentId::new(row.id),
            experience_id: ExperienceId::new(row.experience_id),
            sequence_order: row.sequence_order,
            title: row.title,
            component_type: row.component_type,
            completion_rewards: row.completion_rewards.0,
        }
    }
}

/// A `(type, payload)` pair from `experience_requirements` or
/// `experience_rewards`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TypedValueRow {
    /// Requirement or reward type name.
    pub kind: String,
    /// Type-specific payload.
    pub value: serde_json::Value,
}

impl From<TypedValueRow> for RequirementSpec {
    fn from(row: TypedValueRow) -> Self {
        Self {
            requirement_type: row.kind,
            requirement_value: row.value,
        }
    }
}

impl From<TypedValueRow> for RewardSpec {
    fn from(row: TypedValueRow) -> Self {
        Self {
            reward_type: row.kind,
            reward_value: row.value,
        }
    }
}

/// A row from the `user_experience_progress` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProgressRow {
    /// Row key.
    pub id: i64,
    /// The user.
    pub user_id: i64,
    /// The experience.
    pub experience_id: i64,
    /// `in_progress` or `completed`.
    pub status: String,
    /// Current component, if any.
    pub current_component_id: Option<i64>,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last mutation time.
    pub last_activity_at: DateTime<Utc>,
    /// Completion percentage.
    pub completion_percentage: Decimal,
    /// Completion facts recorded.
    pub components_completed: i32,
    /// Component count snapshotted at start.
    pub components_total: i32,
}

impl TryFrom<ProgressRow> for UserExperienceProgress {
    type Error = DbError;

    fn try_from(row: ProgressRow) -> Result<Self, Self::Error> {
        let status = ProgressStatus::parse(&row.status).ok_or_else(|| {
            DbError::InvalidRow(format!(
                "progress row {} has unknown status {:?}",
                row.id, row.status
            ))
        })?;
        let components_completed = u32::try_from(row.components_completed).map_err(|e| {
            DbError::InvalidRow(format!("progress row {}: components_completed: {e}", row.id))
        })?;
        let components_total = u32::try_from(row.components_total).map_err(|e| {
            DbError::InvalidRow(format!("progress row {}: components_total: {e}", row.id))
        })?;

        Ok(Self {
            id: ProgressId::new(row.id),
            user_id: UserId::new(row.user_id),
            experience_id: ExperienceId::new(row.experience_id),
            status,
            current_component_id: row.current_component_id.map(ComponentId::new),
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_activity_at: row.last_activity_at,
            completion_percentage: row.completion_percentage,
            components_completed,
            components_total,
        })
    }
}

/// A row from the `user_component_completions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompletionRow {
    /// Owning progress row.
    pub user_progress_id: i64,
    /// Completed component.
    pub component_id: i64,
    /// When it was recorded.
    pub completed_at: DateTime<Utc>,
    /// Caller payload.
    pub completion_data: serde_json::Value,
}

impl From<CompletionRow> for UserComponentCompletion {
    fn from(row: CompletionRow) -> Self {
        Self {
            user_progress_id: ProgressId::new(row.user_progress_id),
            component_id: ComponentId::new(row.component_id),
            completed_at: row.completed_at,
            completion_data: row.completion_data,
        }
    }
}

/// Clamp a domain counter into a `PostgreSQL` `INTEGER`.
pub(crate) fn to_db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn progress_row(status: &str, completed: i32) -> ProgressRow {
        let now = Utc::now();
        ProgressRow {
            id: 5,
            user_id: 7,
            experience_id: 1,
            status: status.to_owned(),
            current_component_id: Some(11),
            started_at: now,
            completed_at: None,
            last_activity_at: now,
            completion_percentage: Decimal::ZERO,
            components_completed: completed,
            components_total: 3,
        }
    }

    #[test]
    fn progress_row_converts() {
        let progress = UserExperienceProgress::try_from(progress_row("in_progress", 1)).unwrap();
        assert_eq!(progress.status, ProgressStatus::InProgress);
        assert_eq!(progress.components_completed, 1);
        assert_eq!(progress.current_component_id, Some(ComponentId::new(11)));
    }

    #[test]
    fn unknown_status_is_invalid() {
        let err = UserExperienceProgress::try_from(progress_row("paused", 0)).unwrap_err();
        assert!(matches!(err, DbError::InvalidRow(_)));
    }

    #[test]
    fn negative_counter_is_invalid() {
        let err = UserExperienceProgress::try_from(progress_row("completed", -1)).unwrap_err();
        assert!(matches!(err, DbError::InvalidRow(_)));
    }

    #[test]
    fn counts_clamp_into_integer() {
        assert_eq!(to_db_count(3), 3);
        assert_eq!(to_db_count(u32::MAX), i32::MAX);
    }
}
