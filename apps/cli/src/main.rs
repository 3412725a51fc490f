//! modsync command line
//!
//! Thin front end over the `modsync` engine: list what is installed, install
//! or remove builds, and bring mods up to their current catalog build.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modsync::core::IntoEventCallback;
use modsync::install::list_installed;
use modsync::marker::{current_version, MarkerStatus, RuntimeMarker};
use modsync::{
    ArchiveInstaller, HttpTransport, ModIoApi, ModfileIdentity, Reconciler, ReconcileReport,
    StorageLayout, SyncConfig, TracingEventReporter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modsync-cli")]
#[command(about = "Synchronize installed mods with a remote catalog")]
struct Args {
    /// Installation root (overrides MODSYNC_INSTALL_DIR)
    #[arg(long)]
    install_dir: Option<PathBuf>,

    /// Cache root for archives and the runtime marker (overrides MODSYNC_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed builds
    List {
        /// Only show these mod ids
        #[arg(long = "mod")]
        mods: Vec<i64>,
    },
    /// Install a build from its cached archive
    Install { mod_id: i64, modfile_id: i64 },
    /// Uninstall every version of a mod, or one version
    Uninstall {
        mod_id: i64,
        #[arg(long)]
        modfile: Option<i64>,
    },
    /// Download and install the current build of each mod
    Update {
        #[arg(required = true)]
        mod_ids: Vec<i64>,
    },
    /// Update every installed mod
    UpdateInstalled,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut config = SyncConfig::from_env().context("failed to load configuration")?;
    if let Some(dir) = args.install_dir {
        config.installation_dir = dir;
    }
    if let Some(dir) = args.cache_dir {
        config.cache_dir = dir;
    }

    let layout = StorageLayout::from_config(&config);
    match RuntimeMarker::load_or_init(&layout.runtime_marker_path(), &current_version()).await {
        Ok(MarkerStatus::Upgraded { from }) => info!("Data written by {} is now managed by {}", from, current_version()),
        Ok(_) => {}
        Err(e) => warn!("Could not update runtime marker: {}", e),
    }

    match args.command {
        Command::List { mods } => {
            let filter = (!mods.is_empty()).then_some(mods.as_slice());
            let installed = list_installed(layout.installation_dir(), filter).await;
            if installed.is_empty() {
                println!("No mods installed in {}", layout.installation_dir().display());
            }
            for entry in installed.iter() {
                let name = if entry.identity.is_managed() {
                    format!("{}_{}", entry.identity.mod_id, entry.identity.modfile_id)
                } else {
                    "drop-in".to_string()
                };
                println!("{:<16} {}", name, entry.path.display());
            }
        }
        Command::Install { mod_id, modfile_id } => {
            let identity = ModfileIdentity::new(mod_id, modfile_id);
            let installer = ArchiveInstaller::new(layout.clone())
                .with_event_callback(TracingEventReporter.into_callback());
            installer
                .install(identity, &layout.archive_path(identity))
                .await
                .with_context(|| format!("failed to install {}", identity))?;
        }
        Command::Uninstall { mod_id, modfile } => {
            let installer = ArchiveInstaller::new(layout.clone())
                .with_event_callback(TracingEventReporter.into_callback());
            let removed = match modfile {
                Some(modfile_id) => installer.uninstall_version(mod_id, modfile_id).await,
                None => installer.uninstall(mod_id).await,
            }
            .with_context(|| format!("failed to uninstall mod {}", mod_id))?;
            if removed.is_empty() {
                println!("Nothing to uninstall for mod {}", mod_id);
            }
        }
        Command::Update { mod_ids } => {
            let reconciler = build_reconciler(&config)?;
            let report = reconciler.download_and_update_mods(&mod_ids).await?;
            print_report(&report)?;
        }
        Command::UpdateInstalled => {
            let reconciler = build_reconciler(&config)?;
            let report = reconciler.update_installed_mods().await?;
            print_report(&report)?;
        }
    }

    Ok(())
}

fn build_reconciler(config: &SyncConfig) -> Result<Reconciler> {
    let catalog = Arc::new(ModIoApi::new(config).context("failed to create catalog client")?);
    let transport = Arc::new(HttpTransport::new(config).context("failed to create transport")?);
    Ok(Reconciler::from_config(config, catalog, transport)
        .with_event_callback(TracingEventReporter.into_callback()))
}

fn print_report(report: &ReconcileReport) -> Result<()> {
    for (identity, outcome) in report.iter() {
        match &outcome.error {
            Some(error) => println!("{}: {} ({})", identity, outcome.state, error),
            None => println!("{}: {}", identity, outcome.state),
        }
    }

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!("{} of {} mods failed to update", failed, report.len());
    }
    Ok(())
}
