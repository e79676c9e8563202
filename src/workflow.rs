//! Command handlers: load config and catalogue, open the store, run a pass,
//! write results and print a summary.
use crate::catalog::{load_catalog, write_catalog, Catalog};
use crate::cli::{FlattenArgs, InitArgs, PullArgs, PushArgs, ReconstructArgs, StoreArgs};
use crate::config::{config_stub, load_config, write_config, SyncConfig, DEFAULT_CONFIG_PATH};
use crate::diagnostics::Diagnostics;
use crate::flat::TableSet;
use crate::flatten::flatten_catalog;
use crate::reconstruct::reconstruct;
use crate::store::{MemoryStore, NotionOptions, NotionStore, RecordStore};
use crate::sync::{self, SyncOptions};
use crate::util::{read_json, write_json};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub fn run_init(args: &InitArgs) -> Result<()> {
    if args.config.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            args.config.display()
        ));
    }
    write_config(&args.config, &config_stub())?;
    println!("wrote {}", args.config.display());
    Ok(())
}

/// Config, catalogue path and store for one store-backed command.
struct SyncContext {
    config: SyncConfig,
    catalog_path: PathBuf,
    backend: Backend,
}

enum Backend {
    Snapshot(MemoryStore),
    Notion(NotionStore),
}

impl Backend {
    fn store(&mut self) -> &mut dyn RecordStore {
        match self {
            Backend::Snapshot(store) => store,
            Backend::Notion(store) => store,
        }
    }

    /// Persist local state; remote stores have nothing to flush.
    fn finish(&self) -> Result<()> {
        match self {
            Backend::Snapshot(store) => store.save(),
            Backend::Notion(_) => Ok(()),
        }
    }
}

impl SyncContext {
    fn load(args: &StoreArgs) -> Result<Self> {
        let config = match &args.config {
            Some(path) => load_config(path, true)?,
            None => load_config(Path::new(DEFAULT_CONFIG_PATH), false)?,
        };
        let catalog_path = args
            .catalog
            .clone()
            .unwrap_or_else(|| config.catalog_path.clone());
        let backend = match &args.store_file {
            Some(path) => Backend::Snapshot(MemoryStore::open(path)?),
            None => {
                let options = NotionOptions::from_config(&config, args.page_url.as_deref())?;
                Backend::Notion(NotionStore::new(options))
            }
        };
        Ok(Self {
            config,
            catalog_path,
            backend,
        })
    }

    fn options(&self, args: &StoreArgs) -> SyncOptions {
        SyncOptions {
            tables: (!args.tables.is_empty()).then(|| args.tables.iter().copied().collect()),
            sync_field: self.config.sync_field.clone(),
            acknowledge: self.config.acknowledge,
            dry_run: false,
        }
    }

    fn catalog(&self) -> Result<Catalog> {
        load_catalog(&self.catalog_path)
            .with_context(|| format!("load catalogue {}", self.catalog_path.display()))
    }
}

pub fn run_push(args: &PushArgs) -> Result<()> {
    let mut ctx = SyncContext::load(&args.store)?;
    let options = ctx.options(&args.store);
    let catalog = ctx.catalog()?;
    let report = sync::push(ctx.backend.store(), &catalog, &options)?;
    ctx.backend.finish()?;
    print_diagnostics(&report.diagnostics);
    println!(
        "pushed {} tables: {} rows created, {} updated, {} fields created",
        report.tables, report.created, report.updated, report.fields_created
    );
    Ok(())
}

pub fn run_pull(args: &PullArgs) -> Result<()> {
    let mut ctx = SyncContext::load(&args.store)?;
    let mut options = ctx.options(&args.store);
    options.acknowledge |= args.acknowledge;
    options.dry_run = args.dry_run;
    let mut catalog = ctx.catalog()?;

    let report = sync::pull(ctx.backend.store(), &mut catalog, &options)?;
    print_diagnostics(&report.diagnostics);
    if let Some(path) = &args.patches_out {
        write_json(path, &report.patches)?;
        println!("wrote {}", path.display());
    }
    if options.dry_run {
        println!(
            "dry run: {} flagged rows, {} patches",
            report.rows,
            report.patches.total()
        );
        return Ok(());
    }

    write_catalog(&ctx.catalog_path, &catalog)
        .with_context(|| format!("write catalogue {}", ctx.catalog_path.display()))?;
    println!(
        "pulled {} rows: {} documents updated, {} created",
        report.rows, report.outcome.updated, report.outcome.created
    );
    if options.acknowledge {
        let cleared = sync::acknowledge(ctx.backend.store(), &report.flagged)?;
        println!("cleared sync flag on {cleared} rows");
    }
    ctx.backend.finish()
}

pub fn run_flatten(args: &FlattenArgs) -> Result<()> {
    let catalog = load_catalog(&args.catalog)
        .with_context(|| format!("load catalogue {}", args.catalog.display()))?;
    let mut diagnostics = Diagnostics::new();
    catalog.check_keys(&mut diagnostics);
    print_diagnostics(&diagnostics);
    emit(&flatten_catalog(&catalog), args.out.as_deref())
}

#[derive(Serialize)]
struct ReconstructOutput<'a> {
    patches: &'a crate::catalog::PatchSet,
    diagnostics: &'a Diagnostics,
}

pub fn run_reconstruct(args: &ReconstructArgs) -> Result<()> {
    let tables: TableSet = read_json(&args.records)
        .with_context(|| format!("load flat records {}", args.records.display()))?;
    let reconstruction = reconstruct(&tables);
    emit(
        &ReconstructOutput {
            patches: &reconstruction.patches,
            diagnostics: &reconstruction.diagnostics,
        },
        args.out.as_deref(),
    )
}

/// Write JSON to `out`, or pretty-print it to stdout.
fn emit<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            write_json(path, value)?;
            println!("wrote {}", path.display());
        }
        None => println!(
            "{}",
            serde_json::to_string_pretty(value).context("serialize output")?
        ),
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.entries() {
        println!("{diagnostic}");
    }
    let warnings = diagnostics.warnings().count();
    if warnings > 0 {
        println!("{warnings} warning(s)");
    }
}
