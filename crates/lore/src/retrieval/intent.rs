//! Query intents and the intent × memory-type boost matrix
//!
//! A weight of 1.0 is neutral, above promotes and below demotes. Every
//! weight lies in [`MIN_INTENT_WEIGHT`, `MAX_INTENT_WEIGHT`]; pairs missing
//! from the table, unknown intents and unknown memory types all weigh 1.0.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::memory::types::MemoryType;

pub const MIN_INTENT_WEIGHT: f64 = 0.5;
pub const MAX_INTENT_WEIGHT: f64 = 2.0;

/// What the caller is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    General,
    AddFeature,
    FixBug,
    Refactor,
    SecurityAudit,
    UnderstandCode,
    AddTest,
    ReviewCode,
    DeployMigrate,
    Investigate,
    Decide,
    Recall,
    Learn,
}

impl Intent {
    pub const ALL: [Intent; 13] = [
        Intent::General,
        Intent::AddFeature,
        Intent::FixBug,
        Intent::Refactor,
        Intent::SecurityAudit,
        Intent::UnderstandCode,
        Intent::AddTest,
        Intent::ReviewCode,
        Intent::DeployMigrate,
        Intent::Investigate,
        Intent::Decide,
        Intent::Recall,
        Intent::Learn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::General => "general",
            Intent::AddFeature => "add_feature",
            Intent::FixBug => "fix_bug",
            Intent::Refactor => "refactor",
            Intent::SecurityAudit => "security_audit",
            Intent::UnderstandCode => "understand_code",
            Intent::AddTest => "add_test",
            Intent::ReviewCode => "review_code",
            Intent::DeployMigrate => "deploy_migrate",
            Intent::Investigate => "investigate",
            Intent::Decide => "decide",
            Intent::Recall => "recall",
            Intent::Learn => "learn",
        }
    }

    /// Lenient parse: unknown strings become [`Intent::General`]
    pub fn parse_lenient(s: &str) -> Intent {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == normalized)
            .unwrap_or_default()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Intent::parse_lenient(s))
    }
}

/// Boost multipliers keyed by (intent, memory type)
#[derive(Debug, Clone)]
pub struct IntentWeights {
    weights: HashMap<(Intent, MemoryType), f64>,
}

impl Default for IntentWeights {
    fn default() -> Self {
        use MemoryType::*;

        let table: &[(Intent, &[(MemoryType, f64)])] = &[
            (
                Intent::FixBug,
                &[
                    (Tribal, 2.0),
                    (CodeSmell, 1.5),
                    (PatternRationale, 1.3),
                    (DecisionContext, 1.2),
                ],
            ),
            (
                Intent::AddFeature,
                &[
                    (PatternRationale, 2.0),
                    (ConstraintOverride, 1.5),
                    (DecisionContext, 1.5),
                    (Core, 1.3),
                ],
            ),
            (
                Intent::Refactor,
                &[
                    (CodeSmell, 2.0),
                    (PatternRationale, 1.8),
                    (DecisionContext, 1.5),
                    (ConstraintOverride, 1.3),
                ],
            ),
            (
                Intent::SecurityAudit,
                &[
                    (ConstraintOverride, 2.0),
                    (Tribal, 1.8),
                    (CodeSmell, 1.5),
                    (PatternRationale, 1.3),
                    (Episodic, 0.7),
                ],
            ),
            (
                Intent::UnderstandCode,
                &[
                    (DecisionContext, 1.8),
                    (PatternRationale, 1.5),
                    (Tribal, 1.5),
                    (Core, 1.3),
                ],
            ),
            (
                Intent::AddTest,
                &[
                    (PatternRationale, 1.8),
                    (CodeSmell, 1.5),
                    (ConstraintOverride, 1.3),
                ],
            ),
            (
                Intent::ReviewCode,
                &[(PatternRationale, 1.8), (Tribal, 1.5), (CodeSmell, 1.5)],
            ),
            (
                Intent::DeployMigrate,
                &[(Procedural, 2.0), (Tribal, 1.5), (ConstraintOverride, 1.3)],
            ),
            (
                Intent::Investigate,
                &[(Episodic, 1.8), (DecisionContext, 1.5), (Tribal, 1.3)],
            ),
            (
                Intent::Decide,
                &[
                    (DecisionContext, 2.0),
                    (PatternRationale, 1.3),
                    (ConstraintOverride, 1.3),
                    (Episodic, 0.8),
                ],
            ),
            (Intent::Recall, &[(Core, 1.2), (Tribal, 1.2)]),
            (
                Intent::Learn,
                &[(Semantic, 1.8), (Procedural, 1.5), (Core, 1.3)],
            ),
        ];

        let mut weights = HashMap::new();
        for (intent, boosts) in table {
            for (memory_type, weight) in *boosts {
                weights.insert((*intent, *memory_type), *weight);
            }
        }
        Self { weights }
    }
}

impl IntentWeights {
    /// Weight for a type tag, 1.0 for unknown tags and unlisted pairs
    pub fn weight(&self, intent: Intent, type_name: &str) -> f64 {
        match type_name.parse::<MemoryType>() {
            Ok(memory_type) => self.weight_for(intent, memory_type),
            Err(_) => 1.0,
        }
    }

    pub fn weight_for(&self, intent: Intent, memory_type: MemoryType) -> f64 {
        self.weights
            .get(&(intent, memory_type))
            .copied()
            .unwrap_or(1.0)
    }

    /// Override one entry; the value is clamped into the allowed range and
    /// a NaN leaves the table unchanged
    pub fn set(&mut self, intent: Intent, memory_type: MemoryType, weight: f64) {
        if weight.is_nan() {
            return;
        }
        self.weights.insert(
            (intent, memory_type),
            weight.clamp(MIN_INTENT_WEIGHT, MAX_INTENT_WEIGHT),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_lenient() {
        assert_eq!(Intent::parse_lenient("fix_bug"), Intent::FixBug);
        assert_eq!(Intent::parse_lenient("Fix-Bug"), Intent::FixBug);
        assert_eq!(Intent::parse_lenient(" security audit "), Intent::SecurityAudit);
        assert_eq!(Intent::parse_lenient("summon_demons"), Intent::General);
        assert_eq!(Intent::parse_lenient(""), Intent::General);
        assert_eq!("learn".parse::<Intent>().unwrap(), Intent::Learn);
    }

    #[test]
    fn test_known_weights() {
        let weights = IntentWeights::default();
        assert_eq!(weights.weight(Intent::FixBug, "tribal"), 2.0);
        assert_eq!(weights.weight(Intent::FixBug, "code_smell"), 1.5);
        assert_eq!(weights.weight(Intent::SecurityAudit, "constraint_override"), 2.0);
        assert_eq!(weights.weight(Intent::SecurityAudit, "tribal"), 1.8);
    }

    #[test]
    fn test_defaults_to_neutral() {
        let weights = IntentWeights::default();
        assert_eq!(weights.weight(Intent::FixBug, "core"), 1.0);
        assert_eq!(weights.weight(Intent::FixBug, "hologram"), 1.0);
        for memory_type in MemoryType::ALL {
            assert_eq!(weights.weight_for(Intent::General, memory_type), 1.0);
        }
    }

    #[test]
    fn test_all_weights_bounded() {
        let weights = IntentWeights::default();
        for intent in Intent::ALL {
            for memory_type in MemoryType::ALL {
                let w = weights.weight_for(intent, memory_type);
                assert!((MIN_INTENT_WEIGHT..=MAX_INTENT_WEIGHT).contains(&w));
            }
        }
    }

    #[test]
    fn test_set_clamps() {
        let mut weights = IntentWeights::default();
        weights.set(Intent::Recall, MemoryType::Core, 9.0);
        assert_eq!(weights.weight_for(Intent::Recall, MemoryType::Core), MAX_INTENT_WEIGHT);
        weights.set(Intent::Recall, MemoryType::Core, f64::NAN);
        assert_eq!(weights.weight_for(Intent::Recall, MemoryType::Core), MAX_INTENT_WEIGHT);
        weights.set(Intent::Recall, MemoryType::Core, 0.0);
        assert_eq!(weights.weight_for(Intent::Recall, MemoryType::Core), MIN_INTENT_WEIGHT);
    }
}
