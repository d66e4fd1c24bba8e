//! Confidence decay
//!
//! Trust in a memory erodes with age, with invalidated citations, and is
//! nudged back up by use:
//!
//! ```text
//! final = clamp(confidence * temporal * citation + usage, 0, 1)
//! ```
//!
//! All functions here are pure. NaN confidence propagates to a NaN result;
//! infinite confidence clamps to the nearest bound.

use std::collections::BTreeMap;
use std::f64::consts::LN_2;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{LoreError, Result};
use crate::memory::links::Citation;
use crate::memory::types::{Memory, MemoryType};

/// Temporal decay never drops below this, however old the memory
pub const MIN_TEMPORAL_DECAY: f64 = 1e-6;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Decay tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DecayConfig {
    /// Half-life in days for types without an override
    #[serde(default = "default_half_life_days")]
    pub default_half_life_days: f64,
    /// Per-type half-life in days, keyed by type tag; `inf` disables decay
    #[serde(default = "default_half_life_overrides")]
    pub half_life_overrides: BTreeMap<String, f64>,
    /// Reduction applied when every citation is invalid
    #[serde(default = "default_citation_penalty")]
    pub citation_penalty: f64,
    /// Multiplier on `log10(access + 1)`
    #[serde(default = "default_usage_weight")]
    pub usage_weight: f64,
    /// Saturation cap of the usage boost
    #[serde(default = "default_max_usage_boost")]
    pub max_usage_boost: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            default_half_life_days: default_half_life_days(),
            half_life_overrides: default_half_life_overrides(),
            citation_penalty: default_citation_penalty(),
            usage_weight: default_usage_weight(),
            max_usage_boost: default_max_usage_boost(),
        }
    }
}

fn default_half_life_days() -> f64 {
    90.0
}

fn default_half_life_overrides() -> BTreeMap<String, f64> {
    [
        (MemoryType::Core, f64::INFINITY),
        (MemoryType::Tribal, 365.0),
        (MemoryType::Procedural, 180.0),
        (MemoryType::Semantic, 180.0),
        (MemoryType::Episodic, 7.0),
        (MemoryType::PatternRationale, 180.0),
        (MemoryType::ConstraintOverride, 90.0),
        (MemoryType::DecisionContext, 180.0),
        (MemoryType::CodeSmell, 90.0),
    ]
    .into_iter()
    .map(|(t, days)| (t.as_str().to_string(), days))
    .collect()
}

fn default_citation_penalty() -> f64 {
    0.5
}

fn default_usage_weight() -> f64 {
    0.05
}

fn default_max_usage_boost() -> f64 {
    0.15
}

impl DecayConfig {
    /// Half-life for a type tag
    pub fn half_life_for(&self, type_name: &str) -> f64 {
        self.half_life_overrides
            .get(type_name)
            .copied()
            .unwrap_or(self.default_half_life_days)
    }

    pub fn validate(&self) -> Result<()> {
        let half_lives =
            std::iter::once(self.default_half_life_days).chain(self.half_life_overrides.values().copied());
        for half_life in half_lives {
            if half_life.is_nan() || half_life <= 0.0 {
                return Err(LoreError::Config(format!(
                    "decay half-life must be positive, got {half_life}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.citation_penalty) {
            return Err(LoreError::Config(format!(
                "decay.citation_penalty must be within [0, 1], got {}",
                self.citation_penalty
            )));
        }
        if !(self.usage_weight >= 0.0 && self.max_usage_boost >= 0.0) {
            return Err(LoreError::Config(
                "decay usage weight and cap must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Breakdown of a decay computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayFactors {
    pub age_days: f64,
    pub temporal_decay: f64,
    pub citation_decay: f64,
    pub usage_boost: f64,
    pub final_confidence: f64,
}

/// Stateless decay calculator
#[derive(Debug, Clone, Default)]
pub struct DecayCalculator {
    config: DecayConfig,
}

impl DecayCalculator {
    pub fn new(config: DecayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    pub fn calculate(&self, memory: &Memory) -> DecayFactors {
        self.calculate_at(memory, Utc::now())
    }

    /// Decay of `memory` as observed at `now`
    pub fn calculate_at(&self, memory: &Memory, now: DateTime<Utc>) -> DecayFactors {
        let age_days = (now - memory.created_at).num_seconds() as f64 / SECONDS_PER_DAY;
        let half_life = self.config.half_life_for(memory.type_name());

        let temporal = temporal_decay(age_days, half_life);
        let citation = citation_decay(memory.citations(), self.config.citation_penalty);
        let usage = usage_boost(
            memory.access_count,
            self.config.usage_weight,
            self.config.max_usage_boost,
        );

        DecayFactors {
            age_days,
            temporal_decay: temporal,
            citation_decay: citation,
            usage_boost: usage,
            final_confidence: final_confidence(memory.confidence, temporal, citation, usage),
        }
    }
}

/// Exponential half-life decay, floored at [`MIN_TEMPORAL_DECAY`].
///
/// Negative (future-dated) and NaN ages count as age zero.
pub fn temporal_decay(age_days: f64, half_life_days: f64) -> f64 {
    let age = if age_days.is_nan() { 0.0 } else { age_days.max(0.0) };
    (-LN_2 * age / half_life_days)
        .exp()
        .max(MIN_TEMPORAL_DECAY)
}

/// 1.0 unless some citation is explicitly invalid; then reduced by
/// `penalty * invalid / total`.
pub fn citation_decay<'a>(citations: impl IntoIterator<Item = &'a Citation>, penalty: f64) -> f64 {
    let (total, invalid) = citations
        .into_iter()
        .fold((0usize, 0usize), |(total, invalid), c| {
            (total + 1, invalid + usize::from(c.is_invalid()))
        });
    if invalid == 0 {
        return 1.0;
    }
    1.0 - penalty * (invalid as f64 / total as f64)
}

/// Saturating log-scaled boost for frequently read memories
pub fn usage_boost(access_count: i64, weight: f64, cap: f64) -> f64 {
    let accesses = access_count.max(0) as f64;
    (weight * (accesses + 1.0).log10()).min(cap)
}

pub fn final_confidence(confidence: f64, temporal: f64, citation: f64, usage: f64) -> f64 {
    if confidence.is_infinite() {
        return if confidence > 0.0 { 1.0 } else { 0.0 };
    }
    (confidence * temporal * citation + usage).clamp(0.0, 1.0)
}
