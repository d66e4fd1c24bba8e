use clap::Parser;
use lore::storage::{MemoryQuery, MemoryStore, SearchOrder};

use crate::commands::memory::print_memories;
use crate::commands::{parse_importance, parse_types};
use crate::error::CliResult;
use crate::output::{OutputFormat, parse_timestamp};

#[derive(Parser)]
pub struct SearchCommand {
    #[clap(long, short, help = "Filter by memory type (repeatable)")]
    pub r#type: Vec<String>,

    #[clap(long, help = "Require this tag (repeatable)")]
    pub tag: Vec<String>,

    #[clap(long, help = "Minimum confidence")]
    pub min_confidence: Option<f64>,

    #[clap(long, help = "Maximum confidence")]
    pub max_confidence: Option<f64>,

    #[clap(long, help = "Filter by importance (repeatable)")]
    pub importance: Vec<String>,

    #[clap(long, help = "Include archived memories")]
    pub archived: bool,

    #[clap(long, help = "What the store knew at this time (RFC 3339 or YYYY-MM-DD)")]
    pub as_of: Option<String>,

    #[clap(long, help = "What was true in the world at this time", conflicts_with = "as_of")]
    pub valid_at: Option<String>,

    #[clap(long, short, default_value = "20")]
    pub limit: usize,

    #[clap(long, default_value = "0")]
    pub offset: usize,
}

impl SearchCommand {
    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        let scoped = match (&self.as_of, &self.valid_at) {
            (Some(at), _) => store.as_of(parse_timestamp(at)?),
            (None, Some(at)) => store.valid_at(parse_timestamp(at)?),
            (None, None) => store.current(),
        };

        let mut query = MemoryQuery::new()
            .with_types(parse_types(&self.r#type)?)
            .with_tags(self.tag.iter().cloned())
            .with_confidence_range(self.min_confidence, self.max_confidence)
            .with_importance(parse_importance(&self.importance)?)
            .ordered_by(SearchOrder::RecordedDesc)
            .with_limit(self.limit)
            .with_offset(self.offset);
        if self.archived {
            query = query.including_archived();
        }

        let memories = scoped.search(&query).await?;
        print_memories(&memories, format)
    }
}
