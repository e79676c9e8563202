use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod catalog;
mod cli;
mod config;
mod diagnostics;
mod flat;
mod flatten;
mod reconstruct;
mod store;
mod sync;
mod util;
mod vocab;
mod window;
mod workflow;

use cli::{Command, RootArgs};

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Init(args) => workflow::run_init(args),
        Command::Push(args) => workflow::run_push(args),
        Command::Pull(args) => workflow::run_pull(args),
        Command::Flatten(args) => workflow::run_flatten(args),
        Command::Reconstruct(args) => workflow::run_reconstruct(args),
    }
}
