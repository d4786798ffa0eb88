use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "quire",
    about = "Inspect a directory of localized content entries",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding the content collections
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Repository configuration; `<root>/quire.toml` is used when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Locale to render in (the site default otherwise)
    #[arg(long, global = true)]
    pub locale: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List content types
    Types,
    /// List the entries of a content type
    Entries(EntriesArgs),
    /// Show one entry by slug
    Show(ShowArgs),
    /// Group entries by the options of a select field
    Group(GroupArgs),
}

#[derive(Args)]
pub struct EntriesArgs {
    /// Content type slug
    pub content_type: String,
    /// Extra condition such as `title=Hello` or `_position.gt=2`
    #[arg(long = "where", value_parser = parse_condition)]
    pub conditions: Vec<(String, String)>,
    /// Include hidden entries
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    pub content_type: String,
    pub slug: String,
}

#[derive(Args)]
pub struct GroupArgs {
    pub content_type: String,
    pub field: String,
}

fn parse_condition(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{text}`")),
    }
}
