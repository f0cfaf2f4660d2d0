//! `PostgreSQL` persistence for the Waypoint progression engine.
//!
//! This crate implements the storage and capability seams that
//! `waypoint-core` and `waypoint-requirements` define, so the engine can run
//! against a shared database where the schema's unique constraints and row
//! locks provide exclusivity across processes.
//!
//! # Architecture
//!
//! ```text
//! ProgressionEngine
//!     |
//!     +-- CatalogStore / ProgressStore --> PgProgressStore
//!     |       |-- experiences, experience_components
//!     |       |-- experience_requirements, experience_rewards
//!     |       +-- user_experience_progress, user_component_completions
//!     |
//!     +-- ProfileSource ----------------> PgProfileSource (read-only)
//!     |
//!     +-- RewardGranter ----------------> PgRewardOutbox (reward_grants)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration and migrations
//! - [`progress_store`] -- Catalog reads and transactional progress writes
//! - [`profile_source`] -- Level, membership, inventory, achievement and balance reads
//! - [`reward_outbox`] -- Reward grants queued for the reward service
//! - [`rows`] -- Row types and their domain conversions
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod profile_source;
pub mod progress_store;
pub mod reward_outbox;
pub mod rows;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use profile_source::PgProfileSource;
pub use progress_store::PgProgressStore;
pub use reward_outbox::{PgRewardOutbox, RewardGrantRow};
