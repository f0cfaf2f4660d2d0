//! In-process profile source.
//!
//! [`StaticProfileSource`] answers capability queries from profiles held in
//! memory. It lets the engine run without the external subsystems, for
//! tests and local tooling. Users without a stored profile get
//! [`UserProfile::default`]: level 1, no membership, nothing owned, zero
//! balance.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use waypoint_types::{AchievementId, ItemId, UserId};

use crate::capability::{CapabilityError, ProfileSource};

/// A snapshot of the user-facing state the requirement gates read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Current level.
    pub level: i64,
    /// Whether a paid membership is active.
    pub membership_active: bool,
    /// Items owned.
    pub items: BTreeSet<ItemId>,
    /// Achievements unlocked.
    pub achievements: BTreeSet<AchievementId>,
    /// Spendable-currency balance.
    pub balance: i64,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            level: 1,
            membership_active: false,
            items: BTreeSet::new(),
            achievements: BTreeSet::new(),
            balance: 0,
        }
    }
}

impl UserProfile {
    /// Set the level.
    #[must_use]
    pub const fn with_level(mut self, level: i64) -> Self {
        self.level = level;
        self
    }

    /// Set membership status.
    #[must_use]
    pub const fn with_membership(mut self, active: bool) -> Self {
        self.membership_active = active;
        self
    }

    /// Set the currency balance.
    #[must_use]
    pub const fn with_balance(mut self, balance: i64) -> Self {
        self.balance = balance;
        self
    }

    /// Add owned items by raw id.
    #[must_use]
    pub fn with_items(mut self, items: impl IntoIterator<Item = i64>) -> Self {
        self.items.extend(items.into_iter().map(ItemId::new));
        self
    }

    /// Add unlocked achievements by raw id.
    #[must_use]
    pub fn with_achievements(mut self, achievements: impl IntoIterator<Item = i64>) -> Self {
        self.achievements
            .extend(achievements.into_iter().map(AchievementId::new));
        self
    }
}

/// A [`ProfileSource`] over profiles held in memory.
#[derive(Debug, Default)]
pub struct StaticProfileSource {
    profiles: RwLock<BTreeMap<UserId, UserProfile>>,
}

impl StaticProfileSource {
    /// Create a source with no stored profiles.
    pub const fn new() -> Self {
        Self {
            profiles: RwLock::new(BTreeMap::new()),
        }
    }

    /// Builder form of [`Self::set_user`].
    #[must_use]
    pub fn with_user(self, user: UserId, profile: UserProfile) -> Self {
        self.set_user(user, profile);
        self
    }

    /// Store or replace the profile for `user`.
    pub fn set_user(&self, user: UserId, profile: UserProfile) {
        match self.profiles.write() {
            Ok(mut profiles) => {
                profiles.insert(user, profile);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(user, profile);
            }
        }
    }

    fn read<T>(
        &self,
        capability: &'static str,
        user: UserId,
        f: impl FnOnce(&UserProfile) -> T,
    ) -> Result<T, CapabilityError> {
        let profiles = self
            .profiles
            .read()
            .map_err(|e| CapabilityError::new(capability, e.to_string()))?;
        Ok(match profiles.get(&user) {
            Some(profile) => f(profile),
            None => f(&UserProfile::default()),
        })
    }
}

impl ProfileSource for StaticProfileSource {
    async fn user_level(&self, user: UserId) -> Result<i64, CapabilityError> {
        self.read("user_level", user, |p| p.level)
    }

    async fn has_active_membership(&self, user: UserId) -> Result<bool, CapabilityError> {
        self.read("membership", user, |p| p.membership_active)
    }

    async fn owned_items(&self, user: UserId) -> Result<BTreeSet<ItemId>, CapabilityError> {
        self.read("inventory", user, |p| p.items.clone())
    }

    async fn unlocked_achievements(
        &self,
        user: UserId,
    ) -> Result<BTreeSet<AchievementId>, CapabilityError> {
        self.read("achievements", user, |p| p.achievements.clone())
    }

    async fn currency_balance(&self, user: UserId) -> Result<i64, CapabilityError> {
        self.read("balance", user, |p| p.balance)
    }
}
