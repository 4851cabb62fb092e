//! chasm: secret-shared backups across independent stores
//!
//! Commands:
//!   init                       - create the root, its state file and ignore rules
//!   add <path>...              - track paths and distribute their shares
//!   rm <path>...               - untrack paths and delete their shares
//!   restore                    - rebuild every tracked path from the stores
//!   status                     - show root, stores and tracked paths
//!                                (M = changed since last add, ! = unreadable)
//!   store add-folder <mirror>  - register a local mirror directory
//!   store add-remote ...       - register an S3-compatible bucket
//!   store list                 - list stores in share order

use anyhow::{Context, Result};
use chasm_core::config::{expand_tilde, ChasmConfig};
use chasm_core::types::{FolderStoreConfig, RemoteService, RemoteStoreConfig};
use chasm_core::StoreConfig;
use chasm_shares::fingerprint_file;
use chasm_storage::build_stores;
use chasm_sync::{
    AddReport, ChasmState, Coordinator, DeleteReport, PathFailure, RestoreReport,
};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "chasm",
    version,
    about = "Split files into shares across independent stores",
    long_about = "chasm: track files, split each one across every registered store, \
                  and restore them only when every store hands its share back"
)]
struct Cli {
    /// Path to chasm.toml configuration file
    #[arg(long, short = 'c', env = "CHASM_CONFIG", default_value = "~/.config/chasm/chasm.toml")]
    config: PathBuf,

    /// Chasm root directory (overrides config)
    #[arg(long, env = "CHASM_ROOT")]
    root: Option<PathBuf>,

    /// Log level (overrides config and CHASM_LOG)
    #[arg(long)]
    log: Option<String>,

    /// Log format (overrides config)
    #[arg(long)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create (or verify) the chasm root
    Init,

    /// Track files or directories and distribute their shares
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Stop tracking files or directories and delete their shares
    #[command(alias = "delete")]
    Rm {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Rebuild every tracked path from the registered stores
    Restore,

    /// Show the root, registered stores and tracked paths
    Status,

    /// Store registration
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand, Debug)]
enum StoreAction {
    /// Register a local mirror directory (USB drive, synced folder, NAS mount)
    AddFolder {
        /// Directory the shares are written into
        mirror: PathBuf,
    },

    /// Register an S3-compatible bucket
    ///
    /// Credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
    /// (or CHASM_ACCESS_KEY_ID / CHASM_SECRET_ACCESS_KEY).
    AddRemote {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        endpoint: String,
        #[arg(long, default_value = "us-east-1")]
        region: String,
        /// Key prefix the shares are written under
        #[arg(long, default_value = "chasm")]
        prefix: String,
        /// Display name (default: the bucket name)
        #[arg(long)]
        name: Option<String>,
    },

    /// List registered stores in share order
    List,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ChasmConfig::load(&expand_tilde(&cli.config))?;
    init_logging(&cli, &config);

    let root = resolve_root(&config, cli.root.as_deref());

    match cli.command {
        Commands::Init => cmd_init(&root),
        Commands::Add { paths } => cmd_add(&config, &root, &paths).await,
        Commands::Rm { paths } => cmd_rm(&config, &root, &paths).await,
        Commands::Restore => cmd_restore(&config, &root).await,
        Commands::Status => cmd_status(&root),
        Commands::Store { action } => match action {
            StoreAction::AddFolder { mirror } => cmd_store_add_folder(&config, &root, &mirror),
            StoreAction::AddRemote {
                bucket,
                endpoint,
                region,
                prefix,
                name,
            } => {
                let cfg = RemoteStoreConfig {
                    name: name.unwrap_or_else(|| bucket.clone()),
                    service: RemoteService::S3,
                    endpoint,
                    region,
                    bucket,
                    prefix,
                };
                cmd_store_add_remote(&config, &root, cfg)
            }
            StoreAction::List => cmd_store_list(&config, &root),
        },
    }
}

fn init_logging(cli: &Cli, config: &ChasmConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = match &cli.log {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env("CHASM_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
    };
    let format = cli.log_format.clone().unwrap_or_else(|| {
        if config.log.format == "json" {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn resolve_root(config: &ChasmConfig, flag: Option<&Path>) -> PathBuf {
    flag.map(expand_tilde).unwrap_or_else(|| config.root_dir())
}

fn open(config: &ChasmConfig, root: &Path) -> Result<Coordinator> {
    tracing::debug!(root = %root.display(), staging = %config.storage.staging_root().display(), "opening root");
    Coordinator::open(root, &config.storage)
        .with_context(|| format!("opening chasm root: {}", root.display()))
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn print_failures(failures: &[PathFailure]) {
    for f in failures {
        println!("  failed:   {}", f.error);
    }
}

// ── `chasm init` ──────────────────────────────────────────────────────────────

fn cmd_init(root: &Path) -> Result<()> {
    let state = ChasmState::init_or_load(root)
        .with_context(|| format!("initializing chasm root: {}", root.display()))?;
    println!("chasm root: {}", root.display());
    println!("  state:   {}", state.metadata_path().display());
    println!("  ignore:  {}", state.ignore_path().display());
    if state.needs_setup() {
        println!();
        println!(
            "{} store(s) registered; register at least 2 with `chasm store add-folder` \
             or `chasm store add-remote` before adding files.",
            state.registered_services()
        );
    }
    Ok(())
}

// ── `chasm add` ───────────────────────────────────────────────────────────────

async fn cmd_add(config: &ChasmConfig, root: &Path, paths: &[PathBuf]) -> Result<()> {
    let mut coordinator = open(config, root)?;
    let mut problems = 0usize;

    for path in paths {
        let pb = make_spinner("add");
        pb.set_message(path.display().to_string());
        let report = coordinator
            .add(path)
            .await
            .with_context(|| format!("adding {}", path.display()));
        pb.finish_and_clear();

        let report = report?;
        print_add_report(path, &report);
        if !report.is_clean() {
            problems += 1;
        }
    }

    if problems > 0 {
        println!();
        println!("{problems} path(s) had problems; re-run `chasm add` to retry.");
    }
    Ok(())
}

fn print_add_report(path: &Path, report: &AddReport) {
    println!(
        "{}: {} file(s), {} dir(s) tracked",
        path.display(),
        report.files.len(),
        report.dirs.len()
    );
    for file in &report.files {
        for err in &file.store_failures {
            println!("  store:    {err}");
        }
    }
    for ignored in &report.ignored {
        println!("  ignored:  {}", ignored.path.display());
    }
    print_failures(&report.failures);
    for err in &report.metadata_failures {
        println!("  state:    {err}");
    }
}

// ── `chasm rm` ────────────────────────────────────────────────────────────────

async fn cmd_rm(config: &ChasmConfig, root: &Path, paths: &[PathBuf]) -> Result<()> {
    let mut coordinator = open(config, root)?;
    for path in paths {
        let report = coordinator
            .delete(path)
            .await
            .with_context(|| format!("removing {}", path.display()))?;
        print_delete_report(path, &report);
    }
    Ok(())
}

fn print_delete_report(path: &Path, report: &DeleteReport) {
    if !report.mutated() {
        for notice in report.not_tracked.iter().chain(&report.ignored) {
            println!("{}", notice.error);
        }
        print_failures(&report.failures);
        return;
    }
    println!(
        "{}: {} file(s), {} dir(s) untracked",
        path.display(),
        report.deleted.len(),
        report.dirs.len()
    );
    for file in &report.deleted {
        for err in &file.store_failures {
            println!("  store:    {err}");
        }
    }
    for err in &report.metadata_failures {
        println!("  state:    {err}");
    }
}

// ── `chasm restore` ───────────────────────────────────────────────────────────

async fn cmd_restore(config: &ChasmConfig, root: &Path) -> Result<()> {
    let mut coordinator = open(config, root)?;
    let pb = make_spinner("restore");
    pb.set_message(format!("staging {} store(s)", coordinator.registered_services()));
    let report = coordinator.restore().await;
    pb.finish_and_clear();

    let report = report.context("restore failed; no files were written")?;
    print_restore_report(&report);
    Ok(())
}

fn print_restore_report(report: &RestoreReport) {
    println!(
        "Restored {} file(s), {} dir(s)",
        report.restored.len(),
        report.directories.len()
    );
    if !report.is_complete() {
        println!("Skipped {}:", report.skipped.len());
        for s in &report.skipped {
            println!("  {}: {}", s.path.display(), s.reason);
        }
    }
}

// ── `chasm status` / `chasm store` ────────────────────────────────────────────

fn cmd_status(root: &Path) -> Result<()> {
    let state = ChasmState::load(root)
        .with_context(|| format!("no chasm root at {} (run `chasm init`)", root.display()))?;

    println!("root:     {}", root.display());
    println!("stores:   {}", state.registered_services());
    println!("files:    {}", state.tracked_files());
    println!("dirs:     {}", state.dirs().count());
    if state.needs_setup() {
        println!("setup:    incomplete (at least 2 stores required)");
    }
    println!();
    for (path, record) in state.files() {
        if record.is_metadata() {
            continue;
        }
        let mark = match fingerprint_file(path) {
            Ok(fp) if fp == record.hash => " ",
            Ok(_) => "M",
            Err(_) => "!",
        };
        println!("{mark} {}  {}", record.share_id, path.display());
    }
    Ok(())
}

fn cmd_store_add_folder(config: &ChasmConfig, root: &Path, mirror: &Path) -> Result<()> {
    let path = std::path::absolute(expand_tilde(mirror))
        .with_context(|| format!("resolving mirror path: {}", mirror.display()))?;
    let mut coordinator = open(config, root)?;
    coordinator.register_folder_store(FolderStoreConfig { path: path.clone() })?;
    println!("Registered folder store {}", path.display());
    print_reshare_hint(&coordinator);
    Ok(())
}

fn cmd_store_add_remote(config: &ChasmConfig, root: &Path, cfg: RemoteStoreConfig) -> Result<()> {
    let mut coordinator = open(config, root)?;
    let name = cfg.name.clone();
    coordinator.register_remote_store(cfg)?;
    println!("Registered remote store {name}");
    print_reshare_hint(&coordinator);
    Ok(())
}

fn print_reshare_hint(coordinator: &Coordinator) {
    if coordinator.state().tracked_files() > 0 {
        println!(
            "Existing files were split for fewer stores; run `chasm add {}` to redistribute.",
            coordinator.state().root().display()
        );
    }
}

fn cmd_store_list(config: &ChasmConfig, root: &Path) -> Result<()> {
    let state = ChasmState::load(root)
        .with_context(|| format!("no chasm root at {} (run `chasm init`)", root.display()))?;
    let configs = state.store_configs();
    match build_stores(&configs, &config.storage) {
        Ok(stores) => {
            for (i, store) in stores.iter().enumerate() {
                println!("{i}  {}", store.description());
            }
        }
        Err(e) => {
            tracing::warn!("cannot open stores, listing configuration only: {e:#}");
            for (i, store) in configs.iter().enumerate() {
                println!("{i}  {}", describe(store));
            }
        }
    }
    Ok(())
}

fn describe(store: &StoreConfig) -> String {
    match store {
        StoreConfig::Folder(f) => format!("folder  {}", f.path.display()),
        StoreConfig::Remote(r) => format!(
            "remote  {} ({}/{}/{})",
            r.name,
            r.endpoint.trim_end_matches('/'),
            r.bucket,
            r.prefix
        ),
    }
}
