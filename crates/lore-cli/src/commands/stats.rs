use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use lore::storage::MemoryStore;

use crate::error::CliResult;
use crate::output::{OutputFormat, parse_timestamp};

#[derive(Parser)]
pub struct StatsCommand {
    #[clap(long, help = "Count what the store knew at this time")]
    pub as_of: Option<String>,
}

impl StatsCommand {
    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        let scoped = match &self.as_of {
            Some(at) => store.as_of(parse_timestamp(at)?),
            None => store.current(),
        };

        let total = scoped.count().await?;
        let by_type = scoped.count_by_type().await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "total_memories": total,
                    "by_type": by_type,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Type", "Count", "Share"]);

                for (type_name, count) in &by_type {
                    table.add_row([
                        type_name.clone(),
                        count.to_string(),
                        format_share(*count, total),
                    ]);
                }
                table.add_row(["Total".to_string(), total.to_string(), format_share(total, total)]);

                println!("{table}");
            }
        }

        Ok(())
    }
}

fn format_share(count: u64, total: u64) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", count as f64 * 100.0 / total as f64)
}
