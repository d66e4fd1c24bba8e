//! Partial updates merged into a stored memory.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::{LoreError, Result};
use crate::memory::content::MemoryContent;
use crate::memory::links::MemoryLinks;
use crate::memory::types::{Importance, Memory, ValidTime};

/// Fields to overwrite on an existing memory; `None` leaves a field untouched.
///
/// The id, variant tag and `recorded_at` can never change through a patch.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub content: Option<MemoryContent>,
    pub summary: Option<String>,
    pub confidence: Option<f64>,
    pub importance: Option<Importance>,
    pub tags: Option<BTreeSet<String>>,
    pub valid_time: Option<ValidTime>,
    pub last_validated: Option<DateTime<Utc>>,
    pub archived: Option<bool>,
    pub archive_reason: Option<String>,
    pub superseded_by: Option<String>,
    pub supersedes: Option<String>,
    pub links: Option<MemoryLinks>,
}

impl MemoryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: MemoryContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn valid_time(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_time = Some(ValidTime::new(valid_from, valid_until));
        self
    }

    pub fn superseded_by(mut self, id: impl Into<String>) -> Self {
        self.superseded_by = Some(id.into());
        self
    }

    pub fn archived(mut self, reason: impl Into<String>) -> Self {
        self.archived = Some(true);
        self.archive_reason = Some(reason.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.summary.is_none()
            && self.confidence.is_none()
            && self.importance.is_none()
            && self.tags.is_none()
            && self.valid_time.is_none()
            && self.last_validated.is_none()
            && self.archived.is_none()
            && self.archive_reason.is_none()
            && self.superseded_by.is_none()
            && self.supersedes.is_none()
            && self.links.is_none()
    }

    /// Merge into `memory`. Fails if the patch would change the variant tag.
    pub fn apply(self, memory: &mut Memory) -> Result<()> {
        if let Some(content) = self.content {
            if content.type_name() != memory.type_name() {
                return Err(LoreError::Validation(format!(
                    "memory type is immutable: {} cannot become {}",
                    memory.type_name(),
                    content.type_name()
                )));
            }
            memory.content = content;
        }
        if let Some(summary) = self.summary {
            memory.summary = summary;
        }
        if let Some(confidence) = self.confidence {
            memory.confidence = confidence;
        }
        if let Some(importance) = self.importance {
            memory.importance = importance;
        }
        if let Some(tags) = self.tags {
            memory.tags = tags;
        }
        if let Some(valid_time) = self.valid_time {
            memory.valid_time = valid_time;
        }
        if let Some(at) = self.last_validated {
            memory.last_validated = Some(at);
        }
        if let Some(archived) = self.archived {
            memory.archived = archived;
            if !archived {
                memory.archive_reason = None;
            }
        }
        if let Some(reason) = self.archive_reason {
            memory.archive_reason = Some(reason);
        }
        if let Some(id) = self.superseded_by {
            memory.superseded_by = Some(id);
        }
        if let Some(id) = self.supersedes {
            memory.supersedes = Some(id);
        }
        if let Some(links) = self.links {
            memory.links = links;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content::{CodeSmellContent, TribalContent};

    fn tribal() -> Memory {
        Memory::new(MemoryContent::Tribal(TribalContent {
            topic: "ci".into(),
            knowledge: "flaky on mondays".into(),
            ..Default::default()
        }))
    }

    #[test]
    fn test_apply_merges_only_set_fields() {
        let mut memory = tribal();
        let before = memory.clone();
        MemoryUpdate::new()
            .confidence(0.3)
            .tags(["ci"])
            .apply(&mut memory)
            .unwrap();
        assert_eq!(memory.confidence, 0.3);
        assert!(memory.tags.contains("ci"));
        assert_eq!(memory.summary, before.summary);
        assert_eq!(memory.importance, before.importance);
    }

    #[test]
    fn test_apply_rejects_type_change() {
        let mut memory = tribal();
        let err = MemoryUpdate::new()
            .content(MemoryContent::CodeSmell(CodeSmellContent::default()))
            .apply(&mut memory)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_apply_same_type_content() {
        let mut memory = tribal();
        MemoryUpdate::new()
            .content(MemoryContent::Tribal(TribalContent {
                topic: "ci".into(),
                knowledge: "fixed".into(),
                ..Default::default()
            }))
            .apply(&mut memory)
            .unwrap();
        assert!(memory.content.text().contains("fixed"));
    }

    #[test]
    fn test_unarchive_clears_reason() {
        let mut memory = tribal();
        MemoryUpdate::new().archived("stale").apply(&mut memory).unwrap();
        assert!(memory.archived);
        assert_eq!(memory.archive_reason.as_deref(), Some("stale"));

        let restore = MemoryUpdate {
            archived: Some(false),
            ..Default::default()
        };
        restore.apply(&mut memory).unwrap();
        assert!(!memory.archived);
        assert!(memory.archive_reason.is_none());
    }

    #[test]
    fn test_is_empty() {
        assert!(MemoryUpdate::new().is_empty());
        assert!(!MemoryUpdate::new().summary("x").is_empty());
    }
}
