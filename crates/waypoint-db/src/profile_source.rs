//! Capability queries against the user-facing subsystems' tables.
//!
//! [`PgProfileSource`] reads level, membership, inventory, achievements and
//! balance from tables owned by other services. It never writes to them.
//!
//! | Capability   | Table               | Rule                                                  |
//! |--------------|---------------------|-------------------------------------------------------|
//! | level        | `user_levels`       | missing row means level 1                             |
//! | membership   | `vip_subscriptions` | `is_active` and not past `expires_at`                 |
//! | items        | `user_inventory`    | rows with `quantity > 0`                              |
//! | achievements | `user_achievements` | every row                                             |
//! | balance      | `user_balances`     | `besitos` column; missing row means zero              |

use std::collections::BTreeSet;

use sqlx::PgPool;
use waypoint_requirements::{CapabilityError, ProfileSource};
use waypoint_types::{AchievementId, ItemId, UserId};

use crate::error::DbError;

const DEFAULT_LEVEL: i64 = 1;

/// Reads the gating capabilities from `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct PgProfileSource {
    pool: PgPool,
}

impl PgProfileSource {
    /// Create a source bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_level(&self, user: UserId) -> Result<i64, DbError> {
        let level: Option<i64> =
            sqlx::query_scalar("SELECT level::BIGINT FROM user_levels WHERE user_id = $1")
                .bind(user.into_inner())
                .fetch_optional(&self.pool)
                .await?;
        Ok(level.unwrap_or(DEFAULT_LEVEL))
    }

    async fn fetch_membership(&self, user: UserId) -> Result<bool, DbError> {
        let active: bool = sqlx::query_scalar(
            r"SELECT EXISTS (
                SELECT 1 FROM vip_subscriptions
                WHERE user_id = $1
                  AND is_active
                  AND (expires_at IS NULL OR expires_at > now())
              )",
        )
        .bind(user.into_inner())
        .fetch_one(&self.pool)
        .await?;
        Ok(active)
    }

    async fn fetch_items(&self, user: UserId) -> Result<BTreeSet<ItemId>, DbError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT item_id::BIGINT FROM user_inventory WHERE user_id = $1 AND quantity > 0",
        )
        .bind(user.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(ItemId::new).collect())
    }

    async fn fetch_achievements(&self, user: UserId) -> Result<BTreeSet<AchievementId>, DbError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT achievement_id::BIGINT FROM user_achievements WHERE user_id = $1",
        )
        .bind(user.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(AchievementId::new).collect())
    }

    async fn fetch_balance(&self, user: UserId) -> Result<i64, DbError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT besitos::BIGINT FROM user_balances WHERE user_id = $1")
                .bind(user.into_inner())
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance.unwrap_or(0))
    }
}

impl ProfileSource for PgProfileSource {
    async fn user_level(&self, user: UserId) -> Result<i64, CapabilityError> {
        self.fetch_level(user)
            .await
            .map_err(|e| e.into_capability("user_level"))
    }

    async fn has_active_membership(&self, user: UserId) -> Result<bool, CapabilityError> {
        self.fetch_membership(user)
            .await
            .map_err(|e| e.into_capability("membership"))
    }

    async fn owned_items(&self, user: UserId) -> Result<BTreeSet<ItemId>, CapabilityError> {
        self.fetch_items(user)
            .await
            .map_err(|e| e.into_capability("inventory"))
    }

    async fn unlocked_achievements(
        &self,
        user: UserId,
    ) -> Result<BTreeSet<AchievementId>, CapabilityError> {
        self.fetch_achievements(user)
            .await
            .map_err(|e| e.into_capability("achievements"))
    }

    async fn currency_balance(&self, user: UserId) -> Result<i64, CapabilityError> {
        self.fetch_balance(user)
            .await
            .map_err(|e| e.into_capability("currency"))
    }
}
