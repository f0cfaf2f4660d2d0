//! Shared type definitions for the Waypoint experience progression engine.
//!
//! This crate is the single source of truth for the entities, identifiers,
//! and result payloads used across the workspace.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe integer wrappers for all entity identifiers
//! - [`enums`] -- Progress status, start status, requirement types
//! - [`structs`] -- Catalog and progress entities
//! - [`outcomes`] -- Evaluator and engine result payloads

pub mod enums;
pub mod ids;
pub mod outcomes;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ExperienceState, ProgressStatus, RequirementType, StartStatus};
pub use ids::{AchievementId, ComponentId, ExperienceId, ItemId, ProgressId, UserId};
pub use outcomes::{
    AdvanceOutcome, CompletionOutcome, EvaluationFailure, ExperienceStats, GrantOutcome,
    NextStep, RequirementDetails, RequirementResult, RequirementSpec, RewardGrantResult,
    StartOutcome, StatusReport, ValidationReport, grant_warnings,
};
pub use structs::{
    Experience, ExperienceComponent, ExperienceRequirement, ExperienceReward, ONE_HUNDRED,
    RewardSpec, UserComponentCompletion, UserExperienceProgress, blend_average_completion_time,
    completion_percentage,
};
