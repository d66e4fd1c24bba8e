use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use lore::config::Config;
use lore::retrieval::{Intent, QueryContext, RetrievalPipeline, RetrievalRequest};
use lore::storage::MemoryStore;
use serde_json::{Value, json};

use crate::commands::parse_types;
use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct RetrieveCommand {
    #[clap(help = "What you are working on (file, symbol or question)")]
    pub focus: String,

    #[clap(long, short, default_value = "general", help = "Task intent, e.g. fix_bug or security_audit")]
    pub intent: String,

    #[clap(long, short, help = "Token budget (defaults to the configured budget)")]
    pub budget: Option<usize>,

    #[clap(long, short, help = "Restrict to these memory types (repeatable)")]
    pub r#type: Vec<String>,

    #[clap(long, help = "Restrict to memories carrying this tag (repeatable)")]
    pub tag: Vec<String>,

    #[clap(long, help = "Print the rendered context block only")]
    pub raw: bool,
}

impl RetrieveCommand {
    pub async fn execute(
        &self,
        store: &MemoryStore,
        config: &Config,
        format: OutputFormat,
    ) -> CliResult<()> {
        let intent = Intent::parse_lenient(&self.intent);
        let mut request = RetrievalRequest::new(QueryContext::new(intent, self.focus.as_str()))
            .with_types(parse_types(&self.r#type)?)
            .with_tags(self.tag.iter().cloned());
        if let Some(budget) = self.budget {
            request = request.with_budget(budget);
        }

        let pipeline = RetrievalPipeline::from_config(store.clone(), config);
        let result = pipeline.retrieve(&request).await?;

        if self.raw {
            println!("{}", result.render());
            return Ok(());
        }

        match format {
            OutputFormat::Json => {
                let memories: Vec<Value> = result
                    .memories
                    .iter()
                    .map(|m| {
                        json!({
                            "id": m.memory.id,
                            "type": m.memory.type_name(),
                            "score": m.score,
                            "effective_score": m.effective_score,
                            "level": m.compressed.level.to_string(),
                            "tokens": m.compressed.token_count,
                            "text": m.compressed.expanded,
                        })
                    })
                    .collect();
                let output = json!({
                    "intent": intent.as_str(),
                    "focus": self.focus,
                    "budget": result.budget,
                    "tokens_used": result.tokens_used,
                    "candidates": result.candidates,
                    "degraded": result.degraded,
                    "memories": memories,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if result.memories.is_empty() {
                    println!("No memories retrieved.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Type", "Score", "Level", "Tokens", "Text"]);

                for m in &result.memories {
                    table.add_row([
                        truncate_string(&m.memory.id, 8),
                        m.memory.type_name().to_string(),
                        format!("{:.3}", m.effective_score),
                        m.compressed.level.to_string(),
                        m.compressed.token_count.to_string(),
                        truncate_string(&m.compressed.expanded, 80),
                    ]);
                }

                println!("{table}");
                println!(
                    "\nIntent: {}  Tokens: {}/{}  Candidates: {}",
                    intent, result.tokens_used, result.budget, result.candidates
                );
            }
        }

        Ok(())
    }
}
