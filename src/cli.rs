//! CLI argument parsing for the catalogue sync workflow.
use crate::config::DEFAULT_CONFIG_PATH;
use crate::flat::Table;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "rulesync",
    version,
    about = "Sync reward-rule documents with a tabular editor",
    after_help = "Commands:\n  init                  Write a sync.json stub\n  push                  Flatten the catalogue and upsert every table\n  pull                  Merge flagged rows back into the catalogue\n  flatten               Write flat tables as JSON (offline)\n  reconstruct           Turn flat tables JSON into patches (offline)\n\nExamples:\n  rulesync init\n  rulesync push --store-file /tmp/store.json\n  rulesync pull --acknowledge\n  rulesync pull --dry-run --patches-out /tmp/patches.json\n  rulesync flatten --catalog data/catalog.json --out /tmp/tables.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Push(PushArgs),
    Pull(PullArgs),
    Flatten(FlattenArgs),
    Reconstruct(ReconstructArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Write a sync config stub")]
pub struct InitArgs {
    /// Config path to create
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

/// Options shared by the commands that talk to a store.
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Sync config (defaults to ./sync.json when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Catalogue JSON, overriding catalog_path from the config
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Use a local JSON snapshot store instead of Notion
    #[arg(long, value_name = "PATH", conflicts_with = "page_url")]
    pub store_file: Option<PathBuf>,

    /// Notion page whose child databases are the tables
    #[arg(long, value_name = "URL")]
    pub page_url: Option<String>,

    /// Limit the run to these tables (comma separated)
    #[arg(long, value_name = "TABLES", value_delimiter = ',')]
    pub tables: Vec<Table>,
}

#[derive(Parser, Debug)]
#[command(about = "Flatten the catalogue and upsert every table")]
pub struct PushArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Merge flagged rows back into the catalogue")]
pub struct PullArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Clear the sync checkbox on pulled rows after writing the catalogue
    #[arg(long)]
    pub acknowledge: bool,

    /// Compute patches without writing the catalogue or acknowledging rows
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the computed patches as JSON
    #[arg(long, value_name = "PATH")]
    pub patches_out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Write every flat table as JSON")]
pub struct FlattenArgs {
    /// Catalogue JSON to flatten
    #[arg(long, value_name = "PATH")]
    pub catalog: PathBuf,

    /// Output path (stdout when omitted)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Reconstruct patches from flat tables JSON")]
pub struct ReconstructArgs {
    /// Flat tables JSON, as written by `flatten`
    #[arg(long, value_name = "PATH")]
    pub records: PathBuf,

    /// Output path (stdout when omitted)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}
