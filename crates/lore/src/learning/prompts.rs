//! Prompts shown to a user when asking them to validate a memory
//!
//! Placeholders are filled by [`validation_prompt`].

use crate::learning::candidates::CandidateReason;
use crate::memory::types::Memory;

/// Placeholders: {type}, {summary}, {confidence}, {importance}, {reasons}
pub const VALIDATION_PROMPT: &str = r#"Please review this {type} memory.

"{summary}"

Current confidence: {confidence} (importance: {importance})
Why you are being asked: {reasons}

Is this still accurate? Reply with one of:
- confirm: it is correct as written
- reject: it is wrong or no longer applies
- modify: it is partly right; supply a corrected summary"#;

/// Appended for memories citing code that has since changed
pub const STALE_CITATION_NOTE: &str =
    "Note: {count} of the code locations this memory cites have changed since it was recorded.";

pub fn reason_text(reason: CandidateReason) -> &'static str {
    match reason {
        CandidateReason::LowConfidence => "its confidence is low",
        CandidateReason::NeverValidated => "nobody has validated it yet",
        CandidateReason::HighImportance => "it is marked as important",
        CandidateReason::FrequentlyUsed => "it is retrieved often",
    }
}

pub fn validation_prompt(memory: &Memory, reasons: &[CandidateReason]) -> String {
    let reasons = if reasons.is_empty() {
        "routine review".to_string()
    } else {
        reasons
            .iter()
            .map(|r| reason_text(*r))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let summary = if memory.summary.trim().is_empty() {
        memory.content.headline()
    } else {
        memory.summary.trim().to_string()
    };

    let mut prompt = VALIDATION_PROMPT
        .replace("{type}", &memory.type_name().replace('_', " "))
        .replace("{summary}", &summary)
        .replace("{confidence}", &format!("{:.2}", memory.confidence))
        .replace("{importance}", memory.importance.as_str())
        .replace("{reasons}", &reasons);

    let stale = memory.citations().filter(|c| c.is_invalid()).count();
    if stale > 0 {
        prompt.push_str("\n\n");
        prompt.push_str(&STALE_CITATION_NOTE.replace("{count}", &stale.to_string()));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content::{MemoryContent, PatternRationaleContent};
    use crate::memory::links::{Citation, FileLink, MemoryLinks};

    fn memory() -> Memory {
        Memory::new(MemoryContent::PatternRationale(PatternRationaleContent {
            pattern_name: "repository layer".into(),
            rationale: "keeps SQL out of handlers".into(),
            ..Default::default()
        }))
        .with_confidence(0.42)
    }

    #[test]
    fn test_prompt_fills_placeholders() {
        let prompt = validation_prompt(
            &memory(),
            &[CandidateReason::LowConfidence, CandidateReason::NeverValidated],
        );
        assert!(prompt.contains("pattern rationale memory"));
        assert!(prompt.contains("repository layer: keeps SQL out of handlers"));
        assert!(prompt.contains("0.42"));
        assert!(prompt.contains("its confidence is low, nobody has validated it yet"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_prompt_without_reasons() {
        let prompt = validation_prompt(&memory(), &[]);
        assert!(prompt.contains("routine review"));
        assert!(!prompt.contains("cites have changed"));
    }

    #[test]
    fn test_prompt_mentions_stale_citations() {
        let mut citation = Citation::new(1, 5, "h");
        citation.valid = Some(false);
        let memory = memory().with_links(MemoryLinks {
            files: vec![FileLink::cited("src/db.rs", citation)],
            ..Default::default()
        });
        let prompt = validation_prompt(&memory, &[]);
        assert!(prompt.contains("1 of the code locations"));
    }
}
