//! Reward grants written to an outbox table.
//!
//! [`PgRewardOutbox`] implements [`RewardGranter`] by inserting one
//! `pending` row into `reward_grants` per grant. The reward service claims
//! and applies those rows on its own schedule, so a slow or unavailable
//! reward service never blocks progression.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use waypoint_core::RewardGranter;
use waypoint_requirements::CapabilityError;
use waypoint_types::{RewardSpec, UserId};

use crate::error::DbError;

/// A row from the `reward_grants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RewardGrantRow {
    /// Grant id (UUID v7, time-ordered).
    pub id: Uuid,
    /// Recipient.
    pub user_id: i64,
    /// Reward type name.
    pub reward_type: String,
    /// Type-specific payload.
    pub reward_value: serde_json::Value,
    /// `pending`, `granted` or `failed`.
    pub status: String,
    /// When the grant was queued.
    pub created_at: DateTime<Utc>,
}

/// Queues reward grants in `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgRewardOutbox {
    pool: PgPool,
}

impl PgRewardOutbox {
    /// Create an outbox bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one pending grant and return its id.
    pub async fn enqueue(&self, user: UserId, reward: &RewardSpec) -> Result<Uuid, DbError> {
        let id = Uuid::now_v7();
        sqlx::query(
            r"INSERT INTO reward_grants (id, user_id, reward_type, reward_value, status)
              VALUES ($1, $2, $3, $4, 'pending')",
        )
        .bind(id)
        .bind(user.into_inner())
        .bind(&reward.reward_type)
        .bind(&reward.reward_value)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            grant_id = %id,
            user_id = %user,
            reward_type = %reward.reward_type,
            "Queued reward grant"
        );
        Ok(id)
    }

    /// Pending grants for a user, oldest first.
    pub async fn pending_for(&self, user: UserId) -> Result<Vec<RewardGrantRow>, DbError> {
        let rows = sqlx::query_as::<_, RewardGrantRow>(
            r"SELECT id, user_id, reward_type, reward_value, status, created_at
              FROM reward_grants
              WHERE user_id = $1 AND status = 'pending'
              ORDER BY id",
        )
        .bind(user.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

impl RewardGranter for PgRewardOutbox {
    async fn grant_reward(&self, user: UserId, reward: &RewardSpec) -> Result<(), CapabilityError> {
        self.enqueue(user, reward)
            .await
            .map(|_| ())
            .map_err(|e| e.into_capability("reward"))
    }
}
