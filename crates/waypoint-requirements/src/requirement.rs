//! Typed requirements parsed from stored `(type, payload)` pairs.
//!
//! Catalog rows store requirements as a type name plus a JSON payload. This
//! module turns them into a closed [`Requirement`] enum. Anything that cannot
//! be parsed is reported as a [`RequirementError`], which the evaluator turns
//! into a failed result: an unrecognized gate is never treated as passing.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use waypoint_types::{
    AchievementId, EvaluationFailure, ExperienceId, ItemId, RequirementSpec, RequirementType,
};

/// Errors produced while parsing a stored requirement.
#[derive(Debug, thiserror::Error)]
pub enum RequirementError {
    /// The type name is not recognized.
    #[error("unknown requirement type: {requirement_type}")]
    UnknownType {
        /// The unrecognized type name.
        requirement_type: String,
    },

    /// The payload does not match the shape expected for the type.
    #[error("malformed {requirement_type} payload: {source}")]
    MalformedPayload {
        /// The requirement type being parsed.
        requirement_type: RequirementType,
        /// The underlying parse error.
        source: serde_json::Error,
    },
}

impl From<&RequirementError> for EvaluationFailure {
    fn from(err: &RequirementError) -> Self {
        match err {
            RequirementError::UnknownType { requirement_type } => Self::UnknownRequirementType {
                requirement_type: requirement_type.clone(),
            },
            RequirementError::MalformedPayload { .. } => Self::MalformedPayload {
                message: err.to_string(),
            },
        }
    }
}

/// A requirement gate with its payload parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// User level must be at least `min_level`.
    Level {
        /// Minimum level.
        min_level: i64,
    },
    /// User must hold an active paid membership when `required` is set.
    Membership {
        /// Whether the gate is active.
        required: bool,
    },
    /// User must own all (or any) of the listed items.
    Item {
        /// Items named by the gate.
        item_ids: Vec<ItemId>,
        /// All items needed when true; any one suffices when false.
        all_required: bool,
    },
    /// User must have unlocked every listed achievement.
    Achievement {
        /// Achievements named by the gate.
        achievement_ids: Vec<AchievementId>,
    },
    /// User must have completed every listed experience.
    ExperienceCompleted {
        /// Experiences named by the gate.
        experience_ids: Vec<ExperienceId>,
    },
    /// User balance must be at least `min_amount`.
    Currency {
        /// Minimum balance.
        min_amount: i64,
    },
}

impl Requirement {
    /// The type this requirement was parsed as.
    pub const fn requirement_type(&self) -> RequirementType {
        match self {
            Self::Level { .. } => RequirementType::Level,
            Self::Membership { .. } => RequirementType::Membership,
            Self::Item { .. } => RequirementType::Item,
            Self::Achievement { .. } => RequirementType::Achievement,
            Self::ExperienceCompleted { .. } => RequirementType::ExperienceCompleted,
            Self::Currency { .. } => RequirementType::Currency,
        }
    }

    /// Parse a stored requirement.
    ///
    /// A `null` payload is read as an empty object so every field takes its
    /// default.
    pub fn parse(spec: &RequirementSpec) -> Result<Self, RequirementError> {
        let Some(requirement_type) = RequirementType::parse(&spec.requirement_type) else {
            return Err(RequirementError::UnknownType {
                requirement_type: spec.requirement_type.clone(),
            });
        };

        let value = &spec.requirement_value;
        let requirement = match requirement_type {
            RequirementType::Level => {
                let payload: LevelPayload = payload(requirement_type, value)?;
                Self::Level {
                    min_level: payload.min_level,
                }
            }
            RequirementType::Membership => {
                let payload: MembershipPayload = payload(requirement_type, value)?;
                Self::Membership {
                    required: payload.required,
                }
            }
            RequirementType::Item => {
                let payload: ItemPayload = payload(requirement_type, value)?;
                Self::Item {
                    item_ids: payload.item_ids,
                    all_required: payload.all_required,
                }
            }
            RequirementType::Achievement => {
                let payload: AchievementPayload = payload(requirement_type, value)?;
                Self::Achievement {
                    achievement_ids: payload.achievement_ids,
                }
            }
            RequirementType::ExperienceCompleted => {
                let payload: ExperiencePayload = payload(requirement_type, value)?;
                Self::ExperienceCompleted {
                    experience_ids: payload.experience_ids,
                }
            }
            RequirementType::Currency => {
                let payload: CurrencyPayload = payload(requirement_type, value)?;
                Self::Currency {
                    min_amount: payload.min_amount,
                }
            }
        };
        Ok(requirement)
    }
}

fn payload<T: DeserializeOwned>(
    requirement_type: RequirementType,
    value: &serde_json::Value,
) -> Result<T, RequirementError> {
    let parsed = if value.is_null() {
        serde_json::from_value(serde_json::Value::Object(serde_json::Map::new()))
    } else {
        T::deserialize(value)
    };
    parsed.map_err(|source| RequirementError::MalformedPayload {
        requirement_type,
        source,
    })
}

// ---------------------------------------------------------------------------
// Payload shapes (serde default requires named functions)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LevelPayload {
    #[serde(default = "default_min_level")]
    min_level: i64,
}

#[derive(Debug, Deserialize)]
struct MembershipPayload {
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
struct ItemPayload {
    #[serde(default)]
    item_ids: Vec<ItemId>,
    #[serde(default = "default_true")]
    all_required: bool,
}

#[derive(Debug, Deserialize)]
struct AchievementPayload {
    #[serde(default)]
    achievement_ids: Vec<AchievementId>,
}

#[derive(Debug, Deserialize)]
struct ExperiencePayload {
    #[serde(default)]
    experience_ids: Vec<ExperienceId>,
}

#[derive(Debug, Deserialize)]
struct CurrencyPayload {
    #[serde(default, alias = "min_besitos")]
    min_amount: i64,
}

const fn default_min_level() -> i64 {
    1
}

const fn default_true() -> bool {
    true
}
