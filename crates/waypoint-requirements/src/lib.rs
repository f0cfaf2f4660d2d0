//! Composite requirement evaluation for the Waypoint progression engine.
//!
//! Experiences are gated by requirements stored as `(type, payload)` pairs.
//! This crate parses them and evaluates them against a user's profile.
//!
//! # Architecture
//!
//! - [`requirement`] -- The [`Requirement`] enum and payload parsing.
//! - [`capability`] -- The [`ProfileSource`] and [`CompletionHistory`] traits
//!   the evaluator reads from.
//! - [`evaluator`] -- The [`RequirementEvaluator`].
//! - [`profile`] -- [`StaticProfileSource`], an in-memory profile source.
//!
//! # Requirement types
//!
//! | Type | Payload | Met when |
//! |------|---------|----------|
//! | `level` | `min_level` (default 1) | level >= `min_level` |
//! | `membership` | `required` (default false) | not required, or membership active |
//! | `item` | `item_ids`, `all_required` (default true) | owns all / any listed item |
//! | `achievement` | `achievement_ids` | every listed achievement unlocked |
//! | `experience_completed` | `experience_ids` | every listed experience completed |
//! | `currency` | `min_amount` (default 0) | balance >= `min_amount` |
//!
//! Unknown types and malformed payloads are reported as not met. Evaluation
//! never panics.

pub mod capability;
pub mod evaluator;
pub mod profile;
pub mod requirement;

pub use capability::{CapabilityError, CompletionHistory, ProfileSource};
pub use evaluator::RequirementEvaluator;
pub use profile::{StaticProfileSource, UserProfile};
pub use requirement::{Requirement, RequirementError};
