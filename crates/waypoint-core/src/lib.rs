//! Experience progression engine for Waypoint.
//!
//! This crate owns the per-user, per-experience state machine: starting an
//! experience behind its requirement gates, advancing through its ordered
//! components, completing it, and keeping the aggregate statistics.
//!
//! # Modules
//!
//! - [`engine`] -- [`ProgressionEngine`] and its error taxonomy.
//! - [`store`] -- [`CatalogStore`] and [`ProgressStore`] storage traits.
//! - [`memory`] -- [`MemoryStore`], an in-memory implementation of both.
//! - [`reward`] -- [`RewardGranter`] trait and [`RecordingRewardGranter`].
//! - [`clock`] -- [`Clock`] trait with system and manual clocks.
//! - [`config`] -- Configuration loading from `waypoint-config.yaml` into
//!   strongly-typed structs.

pub mod clock;
pub mod config;
pub mod engine;
pub mod memory;
pub mod reward;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ComponentOrdering, ConfigError, DatabaseConfig, LoggingConfig, ProgressionConfig,
    WaypointConfig,
};
pub use engine::{EngineError, ErrorKind, ProgressionEngine};
pub use memory::MemoryStore;
pub use reward::{RecordingRewardGranter, RewardGranter};
pub use store::{
    CatalogStore, CreateProgress, NewProgress, ProgressStore, RecordCompletion, StoreError,
};
