//! In-memory store.
//!
//! [`MemoryStore`] implements [`CatalogStore`], [`ProgressStore`] and
//! [`CompletionHistory`] over plain collections behind one mutex. Every
//! operation runs under a single lock acquisition with no suspension point
//! inside, which gives the same per-key exclusivity the `PostgreSQL` store
//! gets from its unique constraints.
//!
//! Used by tests and by embedders that do not need durable state.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use waypoint_requirements::{CapabilityError, CompletionHistory};
use waypoint_types::{
    Experience, ExperienceComponent, ExperienceId, ExperienceRequirement, ExperienceReward,
    ProgressId, ProgressStatus, RequirementSpec, RewardSpec, UserComponentCompletion,
    UserExperienceProgress, UserId, blend_average_completion_time,
};

use crate::store::{
    CatalogStore, CreateProgress, NewProgress, ProgressStore, RecordCompletion, StoreError,
};

#[derive(Debug, Default)]
struct MemoryState {
    experiences: BTreeMap<ExperienceId, Experience>,
    components: BTreeMap<ExperienceId, Vec<ExperienceComponent>>,
    requirements: BTreeMap<ExperienceId, Vec<RequirementSpec>>,
    rewards: BTreeMap<ExperienceId, Vec<RewardSpec>>,
    progress: BTreeMap<(UserId, ExperienceId), UserExperienceProgress>,
    completions: BTreeMap<ProgressId, Vec<UserComponentCompletion>>,
    last_progress_id: i64,
}

impl MemoryState {
    fn progress_mut(
        &mut self,
        progress_id: ProgressId,
    ) -> Result<&mut UserExperienceProgress, StoreError> {
        self.progress
            .values_mut()
            .find(|p| p.id == progress_id)
            .ok_or(StoreError::ProgressNotFound { progress_id })
    }

    /// Bump `completion_count` and blend the completion time sample.
    fn record_experience_completion(
        &mut self,
        experience_id: ExperienceId,
        sample_minutes: rust_decimal::Decimal,
    ) -> Result<(), StoreError> {
        let experience = self
            .experiences
            .get_mut(&experience_id)
            .ok_or(StoreError::ExperienceNotFound { experience_id })?;
        experience.average_completion_time = blend_average_completion_time(
            experience.completion_count,
            experience.average_completion_time,
            sample_minutes,
        );
        experience.completion_count = experience.completion_count.saturating_add(1);
        Ok(())
    }

    /// Complete the row and update statistics. Validates before mutating.
    fn finish(
        &mut self,
        progress_id: ProgressId,
        now: DateTime<Utc>,
    ) -> Result<UserExperienceProgress, StoreError> {
        let progress = self.progress_mut(progress_id)?;
        if progress.is_completed() {
            return Err(StoreError::NotInProgress { progress_id });
        }
        let experience_id = progress.experience_id;
        if !self.experiences.contains_key(&experience_id) {
            return Err(StoreError::ExperienceNotFound { experience_id });
        }

        let progress = self.progress_mut(progress_id)?;
        progress.mark_completed(now);
        let sample = progress.elapsed_minutes(now);
        let completed = progress.clone();
        self.record_experience_completion(experience_id, sample)?;
        Ok(completed)
    }
}

/// A [`CatalogStore`] + [`ProgressStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::backend(format!("memory store lock poisoned: {e}")))
    }

    /// Add or replace an experience.
    pub fn insert_experience(&self, experience: Experience) -> Result<(), StoreError> {
        self.lock()?
            .experiences
            .insert(experience.id, experience);
        Ok(())
    }

    /// Add a component, keeping the experience's list ordered.
    pub fn insert_component(&self, component: ExperienceComponent) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let list = state.components.entry(component.experience_id).or_default();
        list.retain(|c| c.id != component.id);
        list.push(component);
        list.sort_by_key(|c| c.sequence_order);
        Ok(())
    }

    /// Add a requirement row.
    pub fn insert_requirement(
        &self,
        requirement: &ExperienceRequirement,
    ) -> Result<(), StoreError> {
        self.lock()?
            .requirements
            .entry(requirement.experience_id)
            .or_default()
            .push(requirement.spec());
        Ok(())
    }

    /// Add an experience-level reward row.
    pub fn insert_reward(&self, reward: &ExperienceReward) -> Result<(), StoreError> {
        self.lock()?
            .rewards
            .entry(reward.experience_id)
            .or_default()
            .push(reward.spec());
        Ok(())
    }
}

impl CatalogStore for MemoryStore {
    async fn experience(&self, experience: ExperienceId) -> Result<Option<Experience>, StoreError> {
        Ok(self.lock()?.experiences.get(&experience).cloned())
    }

    async fn components(
        &self,
        experience: ExperienceId,
    ) -> Result<Vec<ExperienceComponent>, StoreError> {
        Ok(self
            .lock()?
            .components
            .get(&experience)
            .cloned()
            .unwrap_or_default())
    }

    async fn requirements(
        &self,
        experience: ExperienceId,
    ) -> Result<Vec<RequirementSpec>, StoreError> {
        Ok(self
            .lock()?
            .requirements
            .get(&experience)
            .cloned()
            .unwrap_or_default())
    }

    async fn rewards(&self, experience: ExperienceId) -> Result<Vec<RewardSpec>, StoreError> {
        Ok(self
            .lock()?
            .rewards
            .get(&experience)
            .cloned()
            .unwrap_or_default())
    }

    async fn popular_experiences(&self, limit: usize) -> Result<Vec<Experience>, StoreError> {
        let state = self.lock()?;
        let mut experiences: Vec<Experience> = state.experiences.values().cloned().collect();
        experiences.sort_by(|a, b| b.start_count.cmp(&a.start_count).then(a.id.cmp(&b.id)));
        experiences.truncate(limit);
        Ok(experiences)
    }
}

impl ProgressStore for MemoryStore {
    async fn create_progress(&self, new: NewProgress) -> Result<CreateProgress, StoreError> {
        let mut state = self.lock()?;
        let key = (new.user_id, new.experience_id);
        if let Some(existing) = state.progress.get(&key) {
            return Ok(CreateProgress::Existing(existing.clone()));
        }

        let experience = state
            .experiences
            .get_mut(&new.experience_id)
            .ok_or(StoreError::ExperienceNotFound {
                experience_id: new.experience_id,
            })?;
        experience.start_count = experience.start_count.saturating_add(1);

        let id = state
            .last_progress_id
            .checked_add(1)
            .ok_or_else(|| StoreError::backend("progress id space exhausted"))?;
        state.last_progress_id = id;

        let progress = UserExperienceProgress {
            id: ProgressId::new(id),
            user_id: new.user_id,
            experience_id: new.experience_id,
            status: ProgressStatus::InProgress,
            current_component_id: Some(new.first_component_id),
            started_at: new.now,
            completed_at: None,
            last_activity_at: new.now,
            completion_percentage: rust_decimal::Decimal::ZERO,
            components_completed: 0,
            components_total: new.components_total,
        };
        state.progress.insert(key, progress.clone());
        Ok(CreateProgress::Created(progress))
    }

    async fn find_progress(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> Result<Option<UserExperienceProgress>, StoreError> {
        Ok(self.lock()?.progress.get(&(user, experience)).cloned())
    }

    async fn record_completion(
        &self,
        completion: RecordCompletion,
    ) -> Result<UserExperienceProgress, StoreError> {
        let mut state = self.lock()?;
        let progress_id = completion.progress_id;
        let component_id = completion.component_id;

        // Validate everything before the first mutation.
        let progress = state.progress_mut(progress_id)?;
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
        let already_done = state
            .completions
            .get(&progress_id)
            .is_some_and(|facts| facts.iter().any(|f| f.component_id == component_id));
        if already_done {
            return Err(StoreError::DuplicateCompletion {
                progress_id,
                component_id,
            });
        }

        if completion.next_component_id.is_none() {
            let experience_id = state.progress_mut(progress_id)?.experience_id;
            if !state.experiences.contains_key(&experience_id) {
                return Err(StoreError::ExperienceNotFound { experience_id });
            }
        }

        let progress = state.progress_mut(progress_id)?;
        progress.record_component(completion.next_component_id, completion.now);
        let recorded = progress.clone();

        state
            .completions
            .entry(progress_id)
            .or_default()
            .push(UserComponentCompletion {
                user_progress_id: progress_id,
                component_id,
                completed_at: completion.now,
                completion_data: completion.completion_data,
            });

        if completion.next_component_id.is_none() {
            return state.finish(progress_id, completion.now);
        }
        Ok(recorded)
    }

    async fn complete_progress(
        &self,
        progress: ProgressId,
        now: DateTime<Utc>,
    ) -> Result<UserExperienceProgress, StoreError> {
        self.lock()?.finish(progress, now)
    }

    async fn completions(
        &self,
        progress: ProgressId,
    ) -> Result<Vec<UserComponentCompletion>, StoreError> {
        Ok(self
            .lock()?
            .completions
            .get(&progress)
            .cloned()
            .unwrap_or_default())
    }
}

impl CompletionHistory for MemoryStore {
    async fn has_completed_experience(
        &self,
        user: UserId,
        experience: ExperienceId,
    ) -> Result<bool, CapabilityError> {
        let state = self
            .state
            .lock()
            .map_err(|e| CapabilityError::new("experience_history", e.to_string()))?;
        Ok(state
            .progress
            .get(&(user, experience))
            .is_some_and(UserExperienceProgress::is_completed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use waypoint_types::ComponentId;

    use super::*;

    const USER: UserId = UserId::new(7);
    const EXP: ExperienceId = ExperienceId::new(1);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_experience(Experience {
                id: EXP,
                key: "first_steps".to_owned(),
                title: "First Steps".to_owned(),
                description: String::new(),
                start_count: 0,
                completion_count: 0,
                average_completion_time: Decimal::ZERO,
            })
            .unwrap();
        for (id, order) in [(12, 2), (11, 1)] {
            store
                .insert_component(ExperienceComponent {
                    id: ComponentId::new(id),
                    experience_id: EXP,
                    sequence_order: order,
                    title: format!("Step {order}"),
                    component_type: "mission".to_owned(),
                    completion_rewards: BTreeMap::new(),
                })
                .unwrap();
        }
        store
    }

    fn new_progress() -> NewProgress {
        NewProgress {
            user_id: USER,
            experience_id: EXP,
            first_component_id: ComponentId::new(11),
            components_total: 2,
            now: t0(),
        }
    }

    fn record(progress_id: ProgressId, component: i64, next: Option<i64>) -> RecordCompletion {
        RecordCompletion {
            progress_id,
            component_id: ComponentId::new(component),
            completion_data: serde_json::json!({}),
            next_component_id: next.map(ComponentId::new),
            require_current: false,
            now: t0().checked_add_signed(Duration::minutes(15)).unwrap(),
        }
    }

    #[tokio::test]
    async fn components_come_back_ordered() {
        let store = seeded();
        let ids: Vec<i64> = store
            .components(EXP)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id.into_inner())
            .collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[tokio::test]
    async fn second_create_returns_existing_without_counting() {
        let store = seeded();
        let first = store.create_progress(new_progress()).await.unwrap();
        let second = store.create_progress(new_progress()).await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.into_progress(), second.into_progress());
        let experience = store.experience(EXP).await.unwrap().unwrap();
        assert_eq!(experience.start_count, 1);
    }

    #[tokio::test]
    async fn duplicate_completion_changes_nothing() {
        let store = seeded();
        let progress = store
            .create_progress(new_progress())
            .await
            .unwrap()
            .into_progress();

        store.record_completion(record(progress.id, 11, Some(12))).await.unwrap();
        let err = store
            .record_completion(record(progress.id, 11, Some(12)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCompletion { .. }));

        let row = store.find_progress(USER, EXP).await.unwrap().unwrap();
        assert_eq!(row.components_completed, 1);
        assert_eq!(store.completions(progress.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn final_completion_finishes_and_updates_stats() {
        let store = seeded();
        let progress = store
            .create_progress(new_progress())
            .await
            .unwrap()
            .into_progress();
        store.record_completion(record(progress.id, 11, Some(12))).await.unwrap();
        let done = store.record_completion(record(progress.id, 12, None)).await.unwrap();

        assert!(done.is_completed());
        assert_eq!(done.completion_percentage, waypoint_types::ONE_HUNDRED);
        let experience = store.experience(EXP).await.unwrap().unwrap();
        assert_eq!(experience.completion_count, 1);
        assert_eq!(experience.average_completion_time, Decimal::from(15));
        assert!(store.has_completed_experience(USER, EXP).await.unwrap());
    }

    #[tokio::test]
    async fn require_current_rejects_other_components() {
        let store = seeded();
        let progress = store
            .create_progress(new_progress())
            .await
            .unwrap()
            .into_progress();
        let mut skip = record(progress.id, 12, None);
        skip.require_current = true;
        let err = store.record_completion(skip).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::OutOfOrder {
                progress_id: progress.id,
                component_id: ComponentId::new(12),
                current: Some(ComponentId::new(11)),
            }
        );
    }

    #[tokio::test]
    async fn completed_rows_cannot_be_completed_again() {
        let store = seeded();
        let progress = store
            .create_progress(new_progress())
            .await
            .unwrap()
            .into_progress();
        store.complete_progress(progress.id, t0()).await.unwrap();
        let err = store.complete_progress(progress.id, t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotInProgress { .. }));
        let experience = store.experience(EXP).await.unwrap().unwrap();
        assert_eq!(experience.completion_count, 1);
    }
}
