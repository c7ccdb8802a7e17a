//! `duro`: the dependency-aware warehouse view materialization engine.
//!
//! Three entry points (spec §6): `reschedule` (runs the scheduler entry
//! once), `serve` (runs the top-level loop forever), and
//! `create-single-table <name>` (runs the single-table creation routine
//! once, for operator use, bypassing the tree walk).

mod config;
mod git;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use duro_core::{build_graph, reschedule, CycleMode, Engine};
use duro_notify::{NotifierConfig, WebhookNotifier};
use duro_processor::{DuroProcessorRunner, ObjectStore};
use duro_store::SqliteScheduleStore;
use duro_warehouse::{WarehouseConfig, WarehouseDriver};

use config::Config;

#[derive(Parser)]
#[command(name = "duro")]
#[command(author = "duro")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dependency-aware warehouse view materialization engine", long_about = None)]
struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to config.conf
    #[arg(long, global = true, default_value = "config.conf")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler entry once (spec §4.K): load views, build the
    /// graph, and upsert the schedule store.
    Reschedule {
        /// Drive the skip-if-unchanged optimization from the views
        /// directory's current git HEAD.
        #[arg(long)]
        git: bool,

        /// Report cycles instead of aborting the pass.
        #[arg(long)]
        non_strict: bool,
    },

    /// Run the top-level loop forever (spec §4.J).
    Serve,

    /// Run the single-table creation routine once, bypassing the tree
    /// walk (spec §6, "for operator use").
    CreateSingleTable {
        /// Fully-qualified `schema.table` name.
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    duro_core::init_tracing(cli.json, level);

    let config = Config::load(&cli.config);

    match cli.command {
        Commands::Reschedule { git, non_strict } => cmd_reschedule(&config, git, non_strict).await,
        Commands::Serve => cmd_serve(&config).await,
        Commands::CreateSingleTable { name } => cmd_create_single_table(&config, &name).await,
    }
}

async fn open_store(config: &Config) -> Result<SqliteScheduleStore> {
    SqliteScheduleStore::open(&config.db).context("failed to open schedule store")
}

fn open_warehouse(config: &Config) -> Result<WarehouseDriver> {
    let warehouse_config = WarehouseConfig {
        host: config.warehouse.host.clone(),
        port: config.warehouse.port,
        dbname: config.warehouse.db.clone(),
        user: config.warehouse.user.clone(),
        password: config.warehouse.password.clone(),
    };
    WarehouseDriver::connect(&warehouse_config).context("failed to connect to warehouse")
}

fn build_notifier(config: &Config) -> WebhookNotifier {
    WebhookNotifier::new(NotifierConfig {
        default_url: config.notifier.url.clone(),
        success_url: config.notifier.success_url.clone(),
        failure_url: config.notifier.failure_url.clone(),
        log_url: config.notifier.log_url.clone(),
    })
}

async fn cmd_reschedule(config: &Config, use_git: bool, non_strict: bool) -> Result<()> {
    let store = open_store(config).await?;
    let cycle_mode = if non_strict { CycleMode::Report } else { CycleMode::Strict };
    let head_commit = if use_git { git::head_commit(&config.views) } else { None };

    let outcome = reschedule(&store, &config.views, &config.graph, cycle_mode, head_commit.as_deref())
        .await
        .context("reschedule failed")?;

    if outcome.skipped_unchanged_commit {
        tracing::info!("reschedule: skipped, head commit unchanged");
        return Ok(());
    }

    println!(
        "reschedule: {} inserted, {} changed, {} deleted",
        outcome.upsert.inserted.len(),
        outcome.upsert.changed.len(),
        outcome.upsert.deleted.len()
    );
    if !outcome.upsert.inserted.is_empty() {
        println!("  inserted: {}", outcome.upsert.inserted.join(", "));
    }
    if !outcome.upsert.changed.is_empty() {
        println!("  changed: {}", outcome.upsert.changed.join(", "));
    }

    Ok(())
}

async fn cmd_serve(config: &Config) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let warehouse = Arc::new(open_warehouse(config)?);
    let notifier = Arc::new(build_notifier(config));

    let built = build_graph(&config.views, &config.graph, CycleMode::Strict).context("failed to build dependency graph")?;

    let processor = Arc::new(DuroProcessorRunner::new(
        warehouse.clone(),
        ObjectStore::new(config.object_store_url()),
        config.sandboxes_root(),
        built.scripts.clone(),
        built.requirements.clone(),
    ));

    let engine = Engine::new(
        store,
        warehouse,
        Some(processor),
        notifier,
        Arc::new(built.graph),
        built.test_queries,
        built.load_ddl,
    );

    engine.serve().await;
}

async fn cmd_create_single_table(config: &Config, name: &str) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let warehouse = Arc::new(open_warehouse(config)?);
    let notifier = Arc::new(build_notifier(config));

    let built = build_graph(&config.views, &config.graph, CycleMode::Report).context("failed to build dependency graph")?;

    let processor = Arc::new(DuroProcessorRunner::new(
        warehouse.clone(),
        ObjectStore::new(config.object_store_url()),
        config.sandboxes_root(),
        built.scripts,
        built.requirements,
    ));

    let engine = Engine::new(
        store,
        warehouse,
        Some(processor),
        notifier,
        Arc::new(built.graph),
        built.test_queries,
        built.load_ddl,
    );

    engine.create_single_table(name).await;
    Ok(())
}
