//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`serde_json`] errors. At the store-trait boundary they are
//! converted into [`StoreError`] or [`CapabilityError`], which carry only a
//! message.

use waypoint_core::StoreError;
use waypoint_requirements::CapabilityError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row holds a value the domain types cannot represent.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::backend(err.to_string())
    }
}

impl DbError {
    /// Convert into a capability failure for the named capability.
    pub fn into_capability(self, capability: &'static str) -> CapabilityError {
        CapabilityError::new(capability, self.to_string())
    }
}
