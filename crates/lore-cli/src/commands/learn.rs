use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use lore::config::Config;
use lore::learning::{ActiveLearningLoop, FeedbackOutcome};
use lore::storage::MemoryStore;
use serde_json::{Value, json};

use crate::commands::parse_importance;
use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct LearnCommand {
    #[clap(subcommand)]
    pub command: LearnSubcommand,
}

#[derive(Subcommand)]
pub enum LearnSubcommand {
    #[clap(about = "List memories that most need a human check")]
    Candidates(CandidatesArgs),

    #[clap(about = "Confirm a memory is still correct")]
    Confirm(FeedbackArgs),

    #[clap(about = "Reject a memory as wrong")]
    Reject(FeedbackArgs),

    #[clap(about = "Correct a memory's summary")]
    Modify(ModifyArgs),
}

#[derive(Parser)]
pub struct CandidatesArgs {
    #[clap(long, short, help = "Maximum number of candidates")]
    pub limit: Option<usize>,

    #[clap(long, help = "Only memories at or below this confidence")]
    pub max_confidence: Option<f64>,

    #[clap(long, help = "Filter by importance (repeatable)")]
    pub importance: Vec<String>,

    #[clap(long, help = "Print the validation prompt for each candidate")]
    pub prompts: bool,
}

#[derive(Parser)]
pub struct FeedbackArgs {
    #[clap(help = "Memory ID")]
    pub id: String,
}

#[derive(Parser)]
pub struct ModifyArgs {
    #[clap(help = "Memory ID")]
    pub id: String,

    #[clap(help = "Corrected summary")]
    pub summary: String,
}

impl LearnCommand {
    pub async fn execute(
        &self,
        store: &MemoryStore,
        config: &Config,
        format: OutputFormat,
    ) -> CliResult<()> {
        let learner = ActiveLearningLoop::from_config(store.clone(), config);

        match &self.command {
            LearnSubcommand::Candidates(args) => Self::candidates(&learner, args, format).await,
            LearnSubcommand::Confirm(args) => {
                let outcome = learner.confirm(&args.id).await?;
                print_outcome(&outcome, format)
            }
            LearnSubcommand::Reject(args) => {
                let outcome = learner.reject(&args.id).await?;
                print_outcome(&outcome, format)
            }
            LearnSubcommand::Modify(args) => {
                let outcome = learner.modify(&args.id, args.summary.as_str()).await?;
                print_outcome(&outcome, format)
            }
        }
    }

    async fn candidates(
        learner: &ActiveLearningLoop,
        args: &CandidatesArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let mut criteria = learner
            .default_criteria()
            .with_importance(parse_importance(&args.importance)?);
        if let Some(max) = args.max_confidence {
            let min = criteria.min_confidence;
            criteria = criteria.with_confidence_range(min, max);
        }
        if let Some(limit) = args.limit {
            criteria = criteria.with_limit(limit);
        }

        let candidates = learner.select_candidates(&criteria).await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<Value> = candidates
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.memory.id,
                            "type": c.memory.type_name(),
                            "summary": c.memory.summary,
                            "confidence": c.memory.confidence,
                            "importance": c.memory.importance,
                            "priority": c.priority,
                            "reasons": c.reasons,
                            "prompt": c.prompt,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if candidates.is_empty() {
                    println!("Nothing needs validation right now.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Type", "Summary", "Confidence", "Priority", "Reasons"]);

                for c in &candidates {
                    table.add_row([
                        truncate_string(&c.memory.id, 8),
                        c.memory.type_name().to_string(),
                        truncate_string(&c.memory.summary, 50),
                        format!("{:.2}", c.memory.confidence),
                        format!("{:.3}", c.priority),
                        c.reasons
                            .iter()
                            .map(|r| r.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    ]);
                }

                println!("{table}");

                if args.prompts {
                    for c in &candidates {
                        println!("\n[{}]\n{}", c.memory.id, c.prompt);
                    }
                }
            }
        }

        Ok(())
    }
}

fn print_outcome(outcome: &FeedbackOutcome, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
        OutputFormat::Table => {
            if !outcome.success {
                let reason = outcome.message.as_deref().unwrap_or("unknown error");
                println!("Feedback not applied to {}: {reason}", outcome.memory_id);
                return Ok(());
            }

            let before = outcome.previous_confidence.unwrap_or_default();
            let after = outcome.new_confidence.unwrap_or_default();
            println!(
                "{} {}: confidence {:.2} -> {:.2}",
                outcome.action, outcome.memory_id, before, after
            );
            if outcome.archived {
                println!("Memory archived.");
            }
        }
    }

    Ok(())
}
