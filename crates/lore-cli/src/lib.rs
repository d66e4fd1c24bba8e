pub mod commands;
pub mod error;
pub mod output;

pub use commands::{LearnCommand, MemoryCommand, RetrieveCommand, SearchCommand, StatsCommand};
pub use error::{CliError, CliResult, ErrorKind};
pub use output::{OutputFormat, format_timestamp, parse_timestamp, truncate_string};
