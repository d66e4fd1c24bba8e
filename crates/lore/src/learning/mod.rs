//! Active learning
//!
//! Picks memories worth asking a user about and applies their confirm,
//! reject or modify feedback back onto the store.

pub mod candidates;
pub mod cooldown;
pub mod feedback;
pub mod prompts;

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{Config, LearningConfig};
use crate::error::{LoreError, Result};
use crate::storage::filter::{MemoryQuery, SearchOrder};
use crate::storage::sqlite::{MemoryStore, ValidationRecord};

pub use candidates::{
    CandidateCriteria, CandidateReason, ValidationCandidate, priority, reasons, sort_by_priority,
};
pub use cooldown::{Cooldown, DEFAULT_COOLDOWN_CAPACITY};
pub use feedback::{
    FeedbackAction, FeedbackKind, FeedbackOutcome, FeedbackParams, Transition, USER_REJECTED,
    apply_feedback,
};
pub use prompts::{STALE_CITATION_NOTE, VALIDATION_PROMPT, validation_prompt};

/// Rows fetched per store round trip while scanning for candidates
const CANDIDATE_PAGE_SIZE: usize = 256;

pub struct ActiveLearningLoop {
    store: MemoryStore,
    config: LearningConfig,
    params: FeedbackParams,
    cooldown: Mutex<Cooldown>,
}

impl ActiveLearningLoop {
    pub fn new(store: MemoryStore, config: LearningConfig) -> Self {
        let cooldown = Cooldown::new(config.cooldown_capacity, config.cooldown_window());
        Self {
            store,
            params: FeedbackParams::from(&config),
            config,
            cooldown: Mutex::new(cooldown),
        }
    }

    pub fn from_config(store: MemoryStore, config: &Config) -> Self {
        Self::new(store, config.learning.clone())
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Criteria built from the configured confidence ceiling and limit
    pub fn default_criteria(&self) -> CandidateCriteria {
        CandidateCriteria::default()
            .with_confidence_range(0.0, self.config.max_candidate_confidence)
            .with_limit(self.config.candidate_limit)
    }

    pub async fn select_candidates(
        &self,
        criteria: &CandidateCriteria,
    ) -> Result<Vec<ValidationCandidate>> {
        self.select_candidates_at(criteria, Utc::now()).await
    }

    /// Candidates as of `now`, highest priority first
    pub async fn select_candidates_at(
        &self,
        criteria: &CandidateCriteria,
        now: DateTime<Utc>,
    ) -> Result<Vec<ValidationCandidate>> {
        if criteria.limit == 0 {
            return Ok(Vec::new());
        }

        let window = self.config.cooldown_window();
        let mut query = MemoryQuery::new()
            .with_confidence_range(Some(criteria.min_confidence), Some(criteria.max_confidence))
            .ordered_by(SearchOrder::ConfidenceAsc)
            .with_limit(CANDIDATE_PAGE_SIZE);
        query = if criteria.only_never_validated {
            query.never_validated()
        } else {
            query.validated_at_or_before(now - window)
        };
        if !criteria.importance.is_empty() {
            query = query.with_importance(criteria.importance.clone());
        }
        if let Some(age) = criteria.min_age {
            query = query.created_between(None, Some(now - age));
        }

        // Priority is not expressible in SQL, so every admitted row is scored
        // before the cut.
        let mut candidates = Vec::new();
        let mut fetched = 0;
        loop {
            let page = self.store.search(&query.clone().with_offset(fetched)).await?;
            let page_len = page.len();
            fetched += page_len;

            {
                let mut cooldown = self.lock_cooldown()?;
                candidates.extend(
                    page.into_iter()
                        .filter(|m| criteria.admits(m, now))
                        .filter(|m| !cooldown.is_cooling(&m.id, now))
                        .map(|memory| {
                            let reasons = reasons(&memory);
                            ValidationCandidate {
                                priority: priority(&memory),
                                prompt: validation_prompt(&memory, &reasons),
                                reasons,
                                memory,
                            }
                        }),
                );
            }

            if page_len < CANDIDATE_PAGE_SIZE {
                break;
            }
        }

        sort_by_priority(&mut candidates);
        candidates.truncate(criteria.limit);

        debug!(
            fetched,
            selected = candidates.len(),
            "Selected validation candidates"
        );
        Ok(candidates)
    }

    pub async fn confirm(&self, id: &str) -> Result<FeedbackOutcome> {
        self.apply(id, FeedbackAction::Confirm).await
    }

    pub async fn reject(&self, id: &str) -> Result<FeedbackOutcome> {
        self.apply(id, FeedbackAction::Reject).await
    }

    pub async fn modify(&self, id: &str, summary: impl Into<String>) -> Result<FeedbackOutcome> {
        self.apply(
            id,
            FeedbackAction::Modify {
                summary: summary.into(),
            },
        )
        .await
    }

    /// Apply feedback. An unknown id is reported as an unsuccessful outcome.
    pub async fn apply(&self, id: &str, action: FeedbackAction) -> Result<FeedbackOutcome> {
        let kind = action.kind();
        let now = Utc::now();
        let params = self.params;
        let note = match &action {
            FeedbackAction::Modify { summary } => Some(summary.trim().to_string()),
            _ => None,
        };

        let result = self
            .store
            .update_returning(id, move |memory| {
                apply_feedback(memory, &action, &params, now)
            })
            .await;

        let transition = match result {
            Ok((_, transition)) => transition,
            Err(e) if e.is_not_found() => {
                warn!(memory_id = %id, action = %kind, "Feedback for unknown memory");
                return Ok(FeedbackOutcome::failed(id, kind, e.to_string()));
            }
            Err(e) => return Err(e),
        };

        self.store
            .record_validation(ValidationRecord {
                memory_id: id.to_string(),
                action: kind.as_str().to_string(),
                previous_confidence: transition.previous_confidence,
                new_confidence: transition.new_confidence,
                archived: transition.archived,
                note,
                recorded_at: now,
            })
            .await?;
        self.lock_cooldown()?.record(id, now);

        info!(
            memory_id = %id,
            action = %kind,
            previous = transition.previous_confidence,
            confidence = transition.new_confidence,
            archived = transition.archived,
            "Applied feedback"
        );
        Ok(FeedbackOutcome::applied(id, kind, transition))
    }

    /// True while `id` is inside this loop's cooldown window
    pub fn is_cooling(&self, id: &str) -> Result<bool> {
        Ok(self.lock_cooldown()?.is_cooling(id, Utc::now()))
    }

    fn lock_cooldown(&self) -> Result<MutexGuard<'_, Cooldown>> {
        self.cooldown
            .lock()
            .map_err(|_| LoreError::Task("cooldown lock poisoned".to_string()))
    }
}
