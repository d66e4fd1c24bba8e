pub mod learn;
pub mod memory;
pub mod retrieve;
pub mod search;
pub mod stats;

pub use learn::LearnCommand;
pub use memory::MemoryCommand;
pub use retrieve::RetrieveCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use lore::memory::{Importance, MemoryType};

use crate::error::CliResult;

pub(crate) fn parse_types(values: &[String]) -> CliResult<Vec<MemoryType>> {
    values
        .iter()
        .map(|v| v.parse::<MemoryType>().map_err(Into::into))
        .collect()
}

pub(crate) fn parse_importance(values: &[String]) -> CliResult<Vec<Importance>> {
    values
        .iter()
        .map(|v| v.parse::<Importance>().map_err(Into::into))
        .collect()
}

/// Comma separated, trimmed, blanks dropped
pub(crate) fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
