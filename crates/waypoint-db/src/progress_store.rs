//! Catalog reads and progress state on `PostgreSQL`.
//!
//! [`PgProgressStore`] implements the engine's [`CatalogStore`] and
//! [`ProgressStore`] traits, plus [`CompletionHistory`] for the
//! `experience_completed` requirement.
//!
//! Exclusivity is enforced by the schema, not by read-then-write checks:
//!
//! - `UNIQUE (user_id, experience_id)` with `ON CONFLICT DO NOTHING` makes
//!   concurrent starts create one row.
//! - `UNIQUE (user_progress_id, component_id)` with `ON CONFLICT DO NOTHING`
//!   makes concurrent duplicate advances record one completion.
//! - The progress row is locked `FOR UPDATE` while a completion is recorded,
//!   so advances on different components of one row serialize.
//!
//! Each mutating call runs in one transaction. Returning early drops the
//! transaction, which rolls it back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use waypoint_core::{
    CatalogStore, CreateProgress, NewProgress, ProgressStore, RecordCompletion, StoreError,
};
use waypoint_requirements::{CapabilityError, CompletionHistory};
use waypoint_types::{
    ComponentId, Experience, ExperienceComponent, ExperienceId, ProgressId, ProgressStatus,
    RequirementSpec, RewardSpec, UserComponentCompletion, UserExperienceProgress, UserId,
};

use crate::error::DbError;
use crate::rows::{
    CompletionRow, ComponentRow, EXPERIENCE_COLUMNS, ExperienceRow, PROGRESS_COLUMNS, ProgressRow,
    TypedValueRow, to_db_count,
};

/// Operations on the experience catalog and progress tables.
#[derive(Debug, Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Return a reference to the underlying pool.
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_experience(&self, id: ExperienceId) -> Result<Option<Experience>, DbError> {
        let row = sqlx::query_as::<_, ExperienceRow>(&format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE id = $1"
        ))
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Experience::from))
    }

    async fn fetch_components(
        &self,
        id: ExperienceId,
    ) -> Result<Vec<ExperienceComponent>, DbError> {
        let rows = sqlx::query_as::<_, ComponentRow>(
            r"SELECT id, experience_id, sequence_order, title, component_type, completion_rewards
              FROM experience_components
              WHERE experience_id = $1
              ORDER BY sequence_order",
        )
        .bind(id.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ExperienceComponent::from).collect())
    }

    async fn fetch_typed_values(
        &self,
        query: &str,
        id: ExperienceId,
    ) -> Result<Vec<TypedValueRow>, DbError> {
        let rows = sqlx::query_as::<_, TypedValueRow>(query)
            .bind(id.into_inner())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_popular(&self, limit: usize) -> Result<Vec<Experience>, DbError> {
        let rows = sqlx::query_as::<_, ExperienceRow>(&format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experiences \
             ORDER BY start_count DESC, id LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Experience::from).collect())
    }

    async fn fetch_progress(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> Result<Option<UserExperienceProgress>, DbError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_experience_progress \
             WHERE user_id = $1 AND experience_id = $2"
        ))
        .bind(user.into_inner())
        .bind(experience.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserExperienceProgress::try_from).transpose()
    }

    async fn insert_progress(&self, new: NewProgress) -> Result<CreateProgress, StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let inserted = sqlx::query_as::<_, ProgressRow>(&format!(
            "INSERT INTO user_experience_progress \
               (user_id, experience_id, status, current_component_id, started_at, \
                last_activity_at, completion_percentage, components_completed, components_total) \
             VALUES ($1, $2, 'in_progress', $3, $4, $4, 0, 0, $5) \
             ON CONFLICT (user_id, experience_id) DO NOTHING \
             RETURNING {PROGRESS_COLUMNS}"
        ))
        .bind(new.user_id.into_inner())
        .bind(new.experience_id.into_inner())
        .bind(new.first_component_id.into_inner())
        .bind(new.now)
        .bind(to_db_count(new.components_total))
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from)?;

        let Some(row) = inserted else {
            drop(tx);
            let existing = self
                .fetch_progress(new.user_id, new.experience_id)
                .await?
                .ok_or_else(|| StoreError::backend("progress row vanished after conflict"))?;
            return Ok(CreateProgress::Existing(existing));
        };

        let bumped =
            sqlx::query("UPDATE experiences SET start_count = start_count + 1 WHERE id = $1")
                .bind(new.experience_id.into_inner())
                .execute(&mut *tx)
                .await
                .map_err(DbError::from)?;
        if bumped.rows_affected() == 0 {
            return Err(StoreError::ExperienceNotFound {
                experience_id: new.experience_id,
            });
        }

        tx.commit().await.map_err(DbError::from)?;
        let progress = UserExperienceProgress::try_from(row)?;
        tracing::debug!(progress_id = %progress.id, "Inserted progress row");
        Ok(CreateProgress::Created(progress))
    }

    async fn insert_completion(
        &self,
        completion: RecordCompletion,
    ) -> Result<UserExperienceProgress, StoreError> {
        let progress_id = completion.progress_id;
        let component_id = completion.component_id;
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let mut progress = lock_progress(&mut tx, progress_id).await?;
        if progress.is_completed() {
            return Err(StoreError::NotInProgress { progress_id });
        }
        if completion.require_current && progress.current_component_id != Some(component_id) {
            return Err(StoreError::OutOfOrder {
                progress_id,
                component_id,
                current: progress.current_component_id,
            });
        }

        let inserted = sqlx::query(
            r"INSERT INTO user_component_completions
                (user_progress_id, component_id, completed_at, completion_data)
              VALUES ($1, $2, $3, $4)
              ON CONFLICT (user_progress_id, component_id) DO NOTHING",
        )
        .bind(progress_id.into_inner())
        .bind(component_id.into_inner())
        .bind(completion.now)
        .bind(&completion.completion_data)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;
        if inserted.rows_affected() == 0 {
            return Err(StoreError::DuplicateCompletion {
                progress_id,
                component_id,
            });
        }

        progress.record_component(completion.next_component_id, completion.now);
        sqlx::query(
            r"UPDATE user_experience_progress
              SET components_completed = $2,
                  completion_percentage = $3,
                  current_component_id = $4,
                  last_activity_at = $5
              WHERE id = $1",
        )
        .bind(progress_id.into_inner())
        .bind(to_db_count(progress.components_completed))
        .bind(progress.completion_percentage)
        .bind(progress.current_component_id.map(ComponentId::into_inner))
        .bind(progress.last_activity_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        if completion.next_component_id.is_none() {
            finish_progress(&mut tx, &mut progress, completion.now).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(progress)
    }

    async fn finish(
        &self,
        progress_id: ProgressId,
        now: DateTime<Utc>,
    ) -> Result<UserExperienceProgress, StoreError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let mut progress = lock_progress(&mut tx, progress_id).await?;
        if progress.is_completed() {
            return Err(StoreError::NotInProgress { progress_id });
        }
        finish_progress(&mut tx, &mut progress, now).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(progress)
    }

    async fn fetch_completions(
        &self,
        progress: ProgressId,
    ) -> Result<Vec<UserComponentCompletion>, DbError> {
        let rows = sqlx::query_as::<_, CompletionRow>(
            r"SELECT user_progress_id, component_id, completed_at, completion_data
              FROM user_component_completions
              WHERE user_progress_id = $1
              ORDER BY completed_at, id",
        )
        .bind(progress.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(UserComponentCompletion::from).collect())
    }

    async fn fetch_has_completed(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> Result<bool, DbError> {
        let completed: bool = sqlx::query_scalar(
            r"SELECT EXISTS (
                SELECT 1 FROM user_experience_progress
                WHERE user_id = $1 AND experience_id = $2 AND status = $3
              )",
        )
        .bind(user.into_inner())
        .bind(experience.into_inner())
        .bind(ProgressStatus::Completed.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(completed)
    }
}

/// Read a progress row and hold its lock until the transaction ends.
async fn lock_progress(
    tx: &mut Transaction<'_, Postgres>,
    progress_id: ProgressId,
) -> Result<UserExperienceProgress, StoreError> {
    let row = sqlx::query_as::<_, ProgressRow>(&format!(
        "SELECT {PROGRESS_COLUMNS} FROM user_experience_progress WHERE id = $1 FOR UPDATE"
    ))
    .bind(progress_id.into_inner())
    .fetch_optional(&mut **tx)
    .await
    .map_err(DbError::from)?;

    let row = row.ok_or(StoreError::ProgressNotFound { progress_id })?;
    Ok(UserExperienceProgress::try_from(row)?)
}

/// Complete a locked row and fold its completion time into the statistics.
///
/// The blend reads `completion_count` and `average_completion_time` from the
/// pre-update row inside the same `UPDATE`, so concurrent completions of one
/// experience never lose a sample.
async fn finish_progress(
    tx: &mut Transaction<'_, Postgres>,
    progress: &mut UserExperienceProgress,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    progress.mark_completed(now);
    let sample_minutes: Decimal = progress.elapsed_minutes(now);

    sqlx::query(
        r"UPDATE user_experience_progress
          SET status = $2,
              completed_at = $3,
              completion_percentage = $4,
              last_activity_at = $3
          WHERE id = $1",
    )
    .bind(progress.id.into_inner())
    .bind(ProgressStatus::Completed.as_str())
    .bind(now)
    .bind(progress.completion_percentage)
    .execute(&mut **tx)
    .await
    .map_err(DbError::from)?;

    let updated = sqlx::query(
        r"UPDATE experiences
          SET average_completion_time = CASE
                WHEN completion_count = 0 THEN $2
                ELSE (average_completion_time + $2) / 2
              END,
              completion_count = completion_count + 1
          WHERE id = $1",
    )
    .bind(progress.experience_id.into_inner())
    .bind(sample_minutes)
    .execute(&mut **tx)
    .await
    .map_err(DbError::from)?;
    if updated.rows_affected() == 0 {
        return Err(StoreError::ExperienceNotFound {
            experience_id: progress.experience_id,
        });
    }

    tracing::debug!(
        progress_id = %progress.id,
        sample_minutes = %sample_minutes,
        "Recorded experience completion"
    );
    Ok(())
}

impl CatalogStore for PgProgressStore {
    async fn experience(&self, experience: ExperienceId) -> Result<Option<Experience>, StoreError> {
        Ok(self.fetch_experience(experience).await?)
    }

    async fn components(
        &self,
        experience: ExperienceId,
    ) -> Result<Vec<ExperienceComponent>, StoreError> {
        Ok(self.fetch_components(experience).await?)
    }

    async fn requirements(
        &self,
        experience: ExperienceId,
    ) -> Result<Vec<RequirementSpec>, StoreError> {
        let rows = self
            .fetch_typed_values(
                r"SELECT requirement_type AS kind, requirement_value AS value
                  FROM experience_requirements
                  WHERE experience_id = $1
                  ORDER BY id",
                experience,
            )
            .await?;
        Ok(rows.into_iter().map(RequirementSpec::from).collect())
    }

    async fn rewards(&self, experience: ExperienceId) -> Result<Vec<RewardSpec>, StoreError> {
        let rows = self
            .fetch_typed_values(
                r"SELECT reward_type AS kind, reward_value AS value
                  FROM experience_rewards
                  WHERE experience_id = $1
                  ORDER BY id",
                experience,
            )
            .await?;
        Ok(rows.into_iter().map(RewardSpec::from).collect())
    }

    async fn popular_experiences(&self, limit: usize) -> Result<Vec<Experience>, StoreError> {
        Ok(self.fetch_popular(limit).await?)
    }
}

impl ProgressStore for PgProgressStore {
    async fn create_progress(&self, new: NewProgress) -> Result<CreateProgress, StoreError> {
        self.insert_progress(new).await
    }

    async fn find_progress(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> Result<Option<UserExperienceProgress>, StoreError> {
        Ok(self.fetch_progress(user, experience).await?)
    }

    async fn record_completion(
        &self,
        completion: RecordCompletion,
    ) -> Result<UserExperienceProgress, StoreError> {
        self.insert_completion(completion).await
    }

    async fn complete_progress(
        &self,
        progress: ProgressId,
        now: DateTime<Utc>,
    ) -> Result<UserExperienceProgress, StoreError> {
        self.finish(progress, now).await
    }

    async fn completions(
        &self,
        progress: ProgressId,
    ) -> Result<Vec<UserComponentCompletion>, StoreError> {
        Ok(self.fetch_completions(progress).await?)
    }
}

impl CompletionHistory for PgProgressStore {
    async fn has_completed_experience(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> Result<bool, CapabilityError> {
        self.fetch_has_completed(user, experience)
            .await
            .map_err(|e| e.into_capability("experience_history"))
    }
}
