//! Variant payloads carried by a memory.
//!
//! The payload is stored as a JSON blob next to a `type` column. Rows whose
//! type tag is not one of the known variants load as [`MemoryContent::Unknown`]
//! so that data written by newer versions can still be read and rendered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::types::MemoryType;

/// Severity of a piece of tribal knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreContent {
    pub project_name: String,
    pub description: String,
    pub conventions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TribalContent {
    pub topic: String,
    pub knowledge: String,
    pub severity: Severity,
    pub warnings: Vec<String>,
    pub consequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProceduralContent {
    pub title: String,
    pub steps: Vec<String>,
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticContent {
    pub knowledge: String,
    pub source_episodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodicContent {
    pub interaction: String,
    pub context: String,
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternRationaleContent {
    pub pattern_name: String,
    pub rationale: String,
    pub business_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintOverrideContent {
    pub constraint_name: String,
    pub override_reason: String,
    pub approved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionContextContent {
    pub decision_summary: String,
    pub business_context: String,
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeSmellContent {
    pub pattern: String,
    pub reason: String,
    pub suggestion: Option<String>,
}

/// Type-specific body of a memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContent", into = "RawContent")]
pub enum MemoryContent {
    Core(CoreContent),
    Tribal(TribalContent),
    Procedural(ProceduralContent),
    Semantic(SemanticContent),
    Episodic(EpisodicContent),
    PatternRationale(PatternRationaleContent),
    ConstraintOverride(ConstraintOverrideContent),
    DecisionContext(DecisionContextContent),
    CodeSmell(CodeSmellContent),
    /// A type tag this build does not know about, kept verbatim
    Unknown { type_name: String, payload: Value },
}

/// Wire form: the type tag plus the untyped payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContent {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub payload: Value,
}

impl MemoryContent {
    /// Rebuild a payload from its type tag and JSON body.
    ///
    /// Known tags with malformed bodies are an error; unknown tags never are.
    pub fn from_parts(type_name: &str, payload: Value) -> Result<Self, serde_json::Error> {
        let payload = if payload.is_null() {
            Value::Object(Default::default())
        } else {
            payload
        };
        let Ok(memory_type) = type_name.parse::<MemoryType>() else {
            return Ok(MemoryContent::Unknown {
                type_name: type_name.to_string(),
                payload,
            });
        };
        Ok(match memory_type {
            MemoryType::Core => MemoryContent::Core(serde_json::from_value(payload)?),
            MemoryType::Tribal => MemoryContent::Tribal(serde_json::from_value(payload)?),
            MemoryType::Procedural => MemoryContent::Procedural(serde_json::from_value(payload)?),
            MemoryType::Semantic => MemoryContent::Semantic(serde_json::from_value(payload)?),
            MemoryType::Episodic => MemoryContent::Episodic(serde_json::from_value(payload)?),
            MemoryType::PatternRationale => {
                MemoryContent::PatternRationale(serde_json::from_value(payload)?)
            }
            MemoryType::ConstraintOverride => {
                MemoryContent::ConstraintOverride(serde_json::from_value(payload)?)
            }
            MemoryType::DecisionContext => {
                MemoryContent::DecisionContext(serde_json::from_value(payload)?)
            }
            MemoryType::CodeSmell => MemoryContent::CodeSmell(serde_json::from_value(payload)?),
        })
    }

    /// JSON body without the tag
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            MemoryContent::Core(c) => serde_json::to_value(c),
            MemoryContent::Tribal(c) => serde_json::to_value(c),
            MemoryContent::Procedural(c) => serde_json::to_value(c),
            MemoryContent::Semantic(c) => serde_json::to_value(c),
            MemoryContent::Episodic(c) => serde_json::to_value(c),
            MemoryContent::PatternRationale(c) => serde_json::to_value(c),
            MemoryContent::ConstraintOverride(c) => serde_json::to_value(c),
            MemoryContent::DecisionContext(c) => serde_json::to_value(c),
            MemoryContent::CodeSmell(c) => serde_json::to_value(c),
            MemoryContent::Unknown { payload, .. } => Ok(payload.clone()),
        }
    }

    /// The known variant tag, `None` for unknown payloads
    pub fn memory_type(&self) -> Option<MemoryType> {
        Some(match self {
            MemoryContent::Core(_) => MemoryType::Core,
            MemoryContent::Tribal(_) => MemoryType::Tribal,
            MemoryContent::Procedural(_) => MemoryType::Procedural,
            MemoryContent::Semantic(_) => MemoryType::Semantic,
            MemoryContent::Episodic(_) => MemoryType::Episodic,
            MemoryContent::PatternRationale(_) => MemoryType::PatternRationale,
            MemoryContent::ConstraintOverride(_) => MemoryType::ConstraintOverride,
            MemoryContent::DecisionContext(_) => MemoryType::DecisionContext,
            MemoryContent::CodeSmell(_) => MemoryType::CodeSmell,
            MemoryContent::Unknown { .. } => return None,
        })
    }

    /// Type tag as stored in the `type` column
    pub fn type_name(&self) -> &str {
        match self {
            MemoryContent::Unknown { type_name, .. } => type_name,
            known => known.memory_type().map(|t| t.as_str()).unwrap_or("unknown"),
        }
    }

    /// All free text of the payload, space separated
    pub fn text(&self) -> String {
        let parts: Vec<&str> = match self {
            MemoryContent::Core(c) => {
                let mut v = vec![c.project_name.as_str(), c.description.as_str()];
                v.extend(c.conventions.iter().map(String::as_str));
                v
            }
            MemoryContent::Tribal(c) => {
                let mut v = vec![c.topic.as_str(), c.knowledge.as_str()];
                v.extend(c.warnings.iter().map(String::as_str));
                v.extend(c.consequences.iter().map(String::as_str));
                v
            }
            MemoryContent::Procedural(c) => {
                let mut v = vec![c.title.as_str()];
                v.extend(c.steps.iter().map(String::as_str));
                v.extend(c.prerequisites.iter().map(String::as_str));
                v
            }
            MemoryContent::Semantic(c) => vec![c.knowledge.as_str()],
            MemoryContent::Episodic(c) => vec![
                c.interaction.as_str(),
                c.context.as_str(),
                c.outcome.as_deref().unwrap_or_default(),
            ],
            MemoryContent::PatternRationale(c) => vec![
                c.pattern_name.as_str(),
                c.rationale.as_str(),
                c.business_context.as_deref().unwrap_or_default(),
            ],
            MemoryContent::ConstraintOverride(c) => vec![
                c.constraint_name.as_str(),
                c.override_reason.as_str(),
                c.approved_by.as_deref().unwrap_or_default(),
            ],
            MemoryContent::DecisionContext(c) => {
                let mut v = vec![c.decision_summary.as_str(), c.business_context.as_str()];
                v.extend(c.alternatives.iter().map(String::as_str));
                v
            }
            MemoryContent::CodeSmell(c) => vec![
                c.pattern.as_str(),
                c.reason.as_str(),
                c.suggestion.as_deref().unwrap_or_default(),
            ],
            MemoryContent::Unknown { payload, .. } => {
                let mut out = Vec::new();
                collect_strings(payload, &mut out);
                return out.join(" ");
            }
        };
        parts
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// One-line headline derived from the payload, used when no summary is supplied
    pub fn headline(&self) -> String {
        let line = match self {
            MemoryContent::Core(c) => join_nonempty(&c.project_name, &c.description),
            MemoryContent::Tribal(c) => join_nonempty(&c.topic, &c.knowledge),
            MemoryContent::Procedural(c) => match c.steps.len() {
                0 => c.title.clone(),
                n => format!("{} ({n} steps)", c.title),
            },
            MemoryContent::Semantic(c) => c.knowledge.clone(),
            MemoryContent::Episodic(c) => join_nonempty(&c.interaction, &c.context),
            MemoryContent::PatternRationale(c) => join_nonempty(&c.pattern_name, &c.rationale),
            MemoryContent::ConstraintOverride(c) => {
                join_nonempty(&c.constraint_name, &c.override_reason)
            }
            MemoryContent::DecisionContext(c) => c.decision_summary.clone(),
            MemoryContent::CodeSmell(c) => join_nonempty(&c.pattern, &c.reason),
            MemoryContent::Unknown { .. } => self.text(),
        };
        line.trim().to_string()
    }
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.trim().is_empty(), tail.trim().is_empty()) {
        (false, false) => format!("{}: {}", head.trim(), tail.trim()),
        (false, true) => head.trim().to_string(),
        (true, _) => tail.trim().to_string(),
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

impl TryFrom<RawContent> for MemoryContent {
    type Error = serde_json::Error;

    fn try_from(raw: RawContent) -> Result<Self, Self::Error> {
        MemoryContent::from_parts(&raw.type_name, raw.payload)
    }
}

impl From<MemoryContent> for RawContent {
    fn from(content: MemoryContent) -> Self {
        let type_name = content.type_name().to_string();
        let payload = content.payload().unwrap_or(Value::Null);
        RawContent { type_name, payload }
    }
}
