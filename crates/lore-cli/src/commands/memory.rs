use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use lore::memory::{Importance, Memory, MemoryContent, MemoryType, Relationship, RelationshipKind};
use lore::storage::{MemoryQuery, MemoryStore, MemoryUpdate, SearchOrder};
use serde_json::{Value, json};

use crate::commands::{parse_types, split_tags};
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_optional, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List memories")]
    List(ListArgs),

    #[clap(about = "Show memory details")]
    Show(IdArgs),

    #[clap(about = "Manually add a memory")]
    Add(AddArgs),

    #[clap(about = "Update fields of a memory")]
    Update(UpdateArgs),

    #[clap(about = "Archive a memory (soft delete)")]
    Delete(IdArgs),

    #[clap(about = "Permanently remove a memory and everything attached to it")]
    ArchiveHard(IdArgs),

    #[clap(about = "Show every recorded version of a memory")]
    History(IdArgs),

    #[clap(about = "Add a relationship between two memories")]
    Relate(RelateArgs),

    #[clap(about = "Show memories related to a memory")]
    Related(RelatedArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of memories to display"
    )]
    pub limit: usize,

    #[clap(long, short, help = "Filter by memory type (repeatable)")]
    pub r#type: Vec<String>,

    #[clap(long, help = "Include archived memories")]
    pub archived: bool,
}

#[derive(Parser)]
pub struct IdArgs {
    #[clap(help = "Memory ID")]
    pub id: String,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Memory text; stored in the main field of the chosen type")]
    pub text: String,

    #[clap(long, short, default_value = "semantic", help = "Memory type")]
    pub r#type: String,

    #[clap(long, help = "Full payload as JSON; overrides the text placement")]
    pub payload: Option<String>,

    #[clap(long, short, help = "Summary (derived from the payload when omitted)")]
    pub summary: Option<String>,

    #[clap(long, default_value = "1.0", help = "Initial confidence in [0, 1]")]
    pub confidence: f64,

    #[clap(long, default_value = "normal", help = "low, normal, high or critical")]
    pub importance: String,

    #[clap(long, help = "Comma separated tags")]
    pub tags: Option<String>,
}

#[derive(Parser)]
pub struct UpdateArgs {
    #[clap(help = "Memory ID")]
    pub id: String,

    #[clap(long, short)]
    pub summary: Option<String>,

    #[clap(long)]
    pub confidence: Option<f64>,

    #[clap(long)]
    pub importance: Option<String>,

    #[clap(long, help = "Comma separated tags; replaces existing tags")]
    pub tags: Option<String>,
}

#[derive(Parser)]
pub struct RelateArgs {
    #[clap(help = "Source memory ID")]
    pub source: String,

    #[clap(help = "Target memory ID")]
    pub target: String,

    #[clap(
        long,
        short,
        default_value = "related",
        help = "supersedes, supports, contradicts, related or derived_from"
    )]
    pub kind: String,

    #[clap(long, default_value = "1.0", help = "Edge strength in [0, 1]")]
    pub strength: f64,
}

#[derive(Parser)]
pub struct RelatedArgs {
    #[clap(help = "Memory ID")]
    pub id: String,

    #[clap(long, default_value = "1", help = "Traversal depth (at most 5)")]
    pub depth: usize,

    #[clap(long, short, help = "Only follow these relationship kinds (repeatable)")]
    pub kind: Vec<String>,
}

impl MemoryCommand {
    pub async fn execute(&self, store: &MemoryStore, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::List(args) => Self::list(store, args, format).await,
            MemorySubcommand::Show(args) => Self::show(store, args, format).await,
            MemorySubcommand::Add(args) => Self::add(store, args, format).await,
            MemorySubcommand::Update(args) => Self::update(store, args, format).await,
            MemorySubcommand::Delete(args) => Self::delete(store, args, format).await,
            MemorySubcommand::ArchiveHard(args) => Self::archive_hard(store, args, format).await,
            MemorySubcommand::History(args) => Self::history(store, args, format).await,
            MemorySubcommand::Relate(args) => Self::relate(store, args, format).await,
            MemorySubcommand::Related(args) => Self::related(store, args, format).await,
        }
    }

    async fn list(store: &MemoryStore, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let mut query = MemoryQuery::new()
            .with_types(parse_types(&args.r#type)?)
            .ordered_by(SearchOrder::RecordedDesc)
            .with_limit(args.limit);
        if args.archived {
            query = query.including_archived();
        }
        let memories = store.search(&query).await?;
        print_memories(&memories, format)
    }

    async fn show(store: &MemoryStore, args: &IdArgs, format: OutputFormat) -> CliResult<()> {
        let memory = store
            .peek(&args.id)
            .await?
            .ok_or_else(|| CliError::not_found(format!("Memory not found: {}", args.id)))?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&memory)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["ID", &memory.id]);
                table.add_row(["Type", memory.type_name()]);
                table.add_row(["Summary", &memory.summary]);
                table.add_row(["Content", &memory.content.text()]);
                table.add_row(["Confidence", &format!("{:.4}", memory.confidence)]);
                table.add_row(["Importance", memory.importance.as_str()]);
                table.add_row(["Recorded", &memory.recorded_at().to_rfc3339()]);
                table.add_row(["Valid From", &format_optional(memory.valid_time.valid_from.as_ref())]);
                table.add_row(["Valid Until", &format_optional(memory.valid_time.valid_until.as_ref())]);
                table.add_row(["Last Accessed", &format_optional(memory.last_accessed.as_ref())]);
                table.add_row(["Last Validated", &format_optional(memory.last_validated.as_ref())]);
                table.add_row(["Access Count", &memory.access_count.to_string()]);
                table.add_row(["Tags", &memory.tags.iter().cloned().collect::<Vec<_>>().join(", ")]);
                table.add_row(["Files", &memory.links.files.iter().map(|f| f.file_path.as_str()).collect::<Vec<_>>().join(", ")]);
                table.add_row(["Archived", &archived_label(&memory)]);

                println!("{table}");
            }
        }

        Ok(())
    }

    async fn add(store: &MemoryStore, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        let memory_type: MemoryType = args.r#type.parse()?;
        let payload = match &args.payload {
            Some(raw) => serde_json::from_str(raw)?,
            None => json!({ primary_field(memory_type): args.text }),
        };
        let content = MemoryContent::from_parts(memory_type.as_str(), payload)?;

        let mut memory = Memory::new(content)
            .with_confidence(args.confidence)
            .with_importance(args.importance.parse::<Importance>()?);
        if let Some(summary) = &args.summary {
            memory = memory.with_summary(summary.clone());
        }
        if let Some(tags) = &args.tags {
            memory = memory.with_tags(split_tags(tags));
        }

        let created = store.create(memory).await?;

        match format {
            OutputFormat::Json => {
                let output = json!({
                    "id": created.id,
                    "created": true,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Memory created successfully.");
                println!("ID: {}", created.id);
            }
        }

        Ok(())
    }

    async fn update(store: &MemoryStore, args: &UpdateArgs, format: OutputFormat) -> CliResult<()> {
        let mut patch = MemoryUpdate::new();
        if let Some(summary) = &args.summary {
            patch = patch.summary(summary.clone());
        }
        if let Some(confidence) = args.confidence {
            patch = patch.confidence(confidence);
        }
        if let Some(importance) = &args.importance {
            patch = patch.importance(importance.parse::<Importance>()?);
        }
        if let Some(tags) = &args.tags {
            patch = patch.tags(split_tags(tags));
        }
        if patch.is_empty() {
            return Err("Nothing to update. Pass --summary, --confidence, --importance or --tags.".into());
        }

        let updated = store.update(&args.id, patch).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&updated)?),
            OutputFormat::Table => println!("Memory {} updated.", updated.id),
        }

        Ok(())
    }

    async fn delete(store: &MemoryStore, args: &IdArgs, format: OutputFormat) -> CliResult<()> {
        let deleted = store.delete(&args.id).await?;

        match format {
            OutputFormat::Json => {
                let output = json!({
                    "id": args.id,
                    "archived": deleted,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if deleted {
                    println!("Memory {} archived.", args.id);
                } else {
                    println!("Memory {} not found or already archived.", args.id);
                }
            }
        }

        Ok(())
    }

    async fn archive_hard(store: &MemoryStore, args: &IdArgs, format: OutputFormat) -> CliResult<()> {
        let removed = store.hard_delete(&args.id).await?;

        match format {
            OutputFormat::Json => {
                let output = json!({
                    "id": args.id,
                    "removed": removed,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if removed {
                    println!("Memory {} permanently removed.", args.id);
                } else {
                    println!("Memory {} not found.", args.id);
                }
            }
        }

        Ok(())
    }

    async fn history(store: &MemoryStore, args: &IdArgs, format: OutputFormat) -> CliResult<()> {
        let versions = store.history(&args.id).await?;
        if versions.is_empty() {
            return Err(CliError::not_found(format!("Memory not found: {}", args.id)));
        }

        match format {
            OutputFormat::Json => {
                let output: Vec<Value> = versions
                    .iter()
                    .map(|v| {
                        json!({
                            "version": v.version,
                            "recorded_at": v.recorded_at.to_rfc3339(),
                            "memory": v.memory,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Version", "Recorded", "Summary", "Confidence", "Archived"]);

                for v in &versions {
                    table.add_row([
                        v.version.to_string(),
                        format_timestamp(&v.recorded_at),
                        truncate_string(&v.memory.summary, 50),
                        format!("{:.2}", v.memory.confidence),
                        archived_label(&v.memory),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }

    async fn relate(store: &MemoryStore, args: &RelateArgs, format: OutputFormat) -> CliResult<()> {
        let kind: RelationshipKind = args.kind.parse()?;
        store
            .add_relationship(Relationship::new(&args.source, &args.target, kind, args.strength))
            .await?;

        match format {
            OutputFormat::Json => {
                let output = json!({
                    "source": args.source,
                    "target": args.target,
                    "kind": kind.as_str(),
                    "strength": args.strength,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("{} --{}--> {}", args.source, kind.as_str(), args.target);
            }
        }

        Ok(())
    }

    async fn related(store: &MemoryStore, args: &RelatedArgs, format: OutputFormat) -> CliResult<()> {
        let kinds = args
            .kind
            .iter()
            .map(|k| k.parse::<RelationshipKind>())
            .collect::<Result<Vec<_>, _>>()?;
        let related = store.get_related(&args.id, &kinds, args.depth).await?;

        match format {
            OutputFormat::Json => {
                let output: Vec<Value> = related
                    .iter()
                    .map(|r| {
                        json!({
                            "id": r.memory.id,
                            "type": r.memory.type_name(),
                            "summary": r.memory.summary,
                            "depth": r.depth,
                            "relationship": r.relationship,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if related.is_empty() {
                    println!("No related memories found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["ID", "Type", "Summary", "Relationship", "Depth"]);

                for r in &related {
                    table.add_row([
                        truncate_string(&r.memory.id, 8),
                        r.memory.type_name().to_string(),
                        truncate_string(&r.memory.summary, 50),
                        r.relationship.kind.as_str().to_string(),
                        r.depth.to_string(),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}

/// Shared by `memory list` and `search`
pub(crate) fn print_memories(memories: &[Memory], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let output: Vec<Value> = memories
                .iter()
                .map(|m| {
                    json!({
                        "id": m.id,
                        "type": m.type_name(),
                        "summary": m.summary,
                        "confidence": m.confidence,
                        "importance": m.importance,
                        "tags": m.tags,
                        "archived": m.archived,
                        "recorded_at": m.recorded_at().to_rfc3339(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if memories.is_empty() {
                println!("No memories found.");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL_CONDENSED)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(["ID", "Type", "Summary", "Confidence", "Importance", "Recorded"]);

            for memory in memories {
                table.add_row([
                    truncate_string(&memory.id, 8),
                    memory.type_name().to_string(),
                    truncate_string(&memory.summary, 50),
                    format!("{:.2}", memory.confidence),
                    memory.importance.as_str().to_string(),
                    format_timestamp(&memory.recorded_at()),
                ]);
            }

            println!("{table}");
            println!("\nTotal: {} memories", memories.len());
        }
    }

    Ok(())
}

/// Payload field that receives the text given to `memory add`
fn primary_field(memory_type: MemoryType) -> &'static str {
    match memory_type {
        MemoryType::Core => "description",
        MemoryType::Tribal | MemoryType::Semantic => "knowledge",
        MemoryType::Procedural => "title",
        MemoryType::Episodic => "interaction",
        MemoryType::PatternRationale => "rationale",
        MemoryType::ConstraintOverride => "override_reason",
        MemoryType::DecisionContext => "decision_summary",
        MemoryType::CodeSmell => "reason",
    }
}

fn archived_label(memory: &Memory) -> String {
    match (memory.archived, memory.archive_reason.as_deref()) {
        (false, _) => "no".to_string(),
        (true, Some(reason)) => format!("yes ({reason})"),
        (true, None) => "yes".to_string(),
    }
}
