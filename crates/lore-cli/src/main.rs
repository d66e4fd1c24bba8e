use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lore::config::Config;
use lore::storage::MemoryStore;
use lore_cli::commands::{LearnCommand, MemoryCommand, RetrieveCommand, SearchCommand, StatsCommand};
use lore_cli::error::CliResult;
use lore_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lore")]
#[command(about = "Lore - bitemporal memory store for coding agents")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, short, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Memory management commands")]
    Memory(MemoryCommand),

    #[clap(about = "Filter memories, optionally at a point in time")]
    Search(SearchCommand),

    #[clap(about = "Retrieve the memories most relevant to a task")]
    Retrieve(RetrieveCommand),

    #[clap(about = "Review and correct low-confidence memories")]
    Learn(LearnCommand),

    #[clap(about = "Show storage statistics")]
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover()?,
    };
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.clone();
    }

    let store = MemoryStore::from_config(&config)?;
    tracing::debug!(path = %config.storage.database_path().display(), "Store ready");

    match &cli.command {
        Command::Memory(cmd) => cmd.execute(&store, format).await,
        Command::Search(cmd) => cmd.execute(&store, format).await,
        Command::Retrieve(cmd) => cmd.execute(&store, &config, format).await,
        Command::Learn(cmd) => cmd.execute(&store, &config, format).await,
        Command::Stats(cmd) => cmd.execute(&store, format).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug,lore=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,lore=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
