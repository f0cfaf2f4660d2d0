//! Enumeration types for the Waypoint progression engine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Progress status
// ---------------------------------------------------------------------------

/// Stored status of a progress row.
///
/// The absence of a row means "not started", so there is no variant for it
/// here; see [`ExperienceState`] for the three-state view reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// The user is working through the experience's components.
    InProgress,
    /// Terminal. No further mutation of the row is permitted.
    Completed,
}

impl ProgressStatus {
    /// The database / wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    /// Parse the database representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl core::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a (user, experience) pair as reported by a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceState {
    /// No progress row exists.
    NotStarted,
    /// A progress row exists and is in progress.
    InProgress,
    /// A progress row exists and is terminal.
    Completed,
}

impl From<ProgressStatus> for ExperienceState {
    fn from(status: ProgressStatus) -> Self {
        match status {
            ProgressStatus::InProgress => Self::InProgress,
            ProgressStatus::Completed => Self::Completed,
        }
    }
}

/// Whether a `start` call created a new row or resumed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    /// A new progress row was created.
    Started,
    /// An in-progress row already existed and was returned unchanged.
    Resumed,
}

// ---------------------------------------------------------------------------
// Requirement types
// ---------------------------------------------------------------------------

/// The subsystem a requirement gate is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    /// Minimum user level.
    Level,
    /// Active paid membership.
    Membership,
    /// Ownership of inventory items.
    Item,
    /// Unlocked achievements.
    Achievement,
    /// Prior completion of other experiences.
    ExperienceCompleted,
    /// Minimum spendable-currency balance.
    Currency,
}

impl RequirementType {
    /// The canonical stored name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Level => "level",
            Self::Membership => "membership",
            Self::Item => "item",
            Self::Achievement => "achievement",
            Self::ExperienceCompleted => "experience_completed",
            Self::Currency => "currency",
        }
    }

    /// Parse a stored requirement type name.
    ///
    /// Accepts the legacy `vip_membership` and `besitos` spellings used by
    /// older catalog rows.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "level" => Some(Self::Level),
            "membership" | "vip_membership" => Some(Self::Membership),
            "item" => Some(Self::Item),
            "achievement" => Some(Self::Achievement),
            "experience_completed" => Some(Self::ExperienceCompleted),
            "currency" | "besitos" => Some(Self::Currency),
            _ => None,
        }
    }
}

impl core::fmt::Display for RequirementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_status_db_roundtrip() {
        for status in [ProgressStatus::InProgress, ProgressStatus::Completed] {
            assert_eq!(ProgressStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProgressStatus::parse("not_started"), None);
    }

    #[test]
    fn requirement_type_accepts_legacy_names() {
        assert_eq!(
            RequirementType::parse("vip_membership"),
            Some(RequirementType::Membership)
        );
        assert_eq!(RequirementType::parse("besitos"), Some(RequirementType::Currency));
        assert_eq!(RequirementType::parse("karma"), None);
    }

    #[test]
    fn requirement_type_serializes_snake_case() {
        let json = serde_json::to_string(&RequirementType::ExperienceCompleted).ok();
        assert_eq!(json.as_deref(), Some("\"experience_completed\""));
    }
}
