//! Mod content synchronization
//!
//! This library keeps a local installation root of mod builds in agreement
//! with a remote catalog. It downloads missing or stale builds, verifies them
//! against the catalog's size and MD5, and installs each one so that exactly
//! one version of a mod is present at any time.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modsync::{HttpTransport, ModIoApi, Reconciler, SyncConfig, TracingEventReporter};
//! use modsync::core::IntoEventCallback;
//! use std::sync::Arc;
//!
//! # async fn example() -> modsync::Result<()> {
//! let config = SyncConfig::from_env()?;
//!
//! let catalog = Arc::new(ModIoApi::new(&config)?);
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let reconciler = Reconciler::from_config(&config, catalog, transport)
//!     .with_event_callback(TracingEventReporter.into_callback());
//!
//! let report = reconciler.download_and_update_mods(&[2041, 3187]).await?;
//! for (identity, outcome) in report.iter() {
//!     println!("{}: {}", identity, outcome.state);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Layout
//!
//! - Installed builds live in `{installation_dir}/{mod_id}_{modfile_id}`;
//!   other directories there are drop-ins and are never touched
//! - Archives are cached under `{cache_dir}/mods/{mod_id}/binaries/`

pub mod api;
pub mod config;
pub mod core;
pub mod downloader;
pub mod fetch;
pub mod install;
pub mod layout;
pub mod marker;
pub mod reconcile;

// Re-export commonly used types for convenience
pub use api::{CatalogClient, ModIoApi, Pagination, RequestFilter, RequestPage};
pub use config::SyncConfig;
pub use crate::core::{
    EventCallback, EventReporter, FileValidation, InstallEvent, ModProfile, Modfile,
    ModfileIdentity, NullEventReporter, RequestError, Result, SyncError, TracingEventReporter,
    NULL_ID,
};
pub use downloader::{
    BinaryTransport, DownloadEvent, DownloadHandle, DownloadOrchestrator, HttpTransport,
};
pub use fetch::{fetch_all, FetchOutcome, FetchTermination, RetryPolicy};
pub use install::{ArchiveInstaller, InstallError, InstalledMod, InstalledMods};
pub use layout::StorageLayout;
pub use marker::{MarkerStatus, RuntimeMarker};
pub use reconcile::{ModfileState, ReconcileReport, Reconciler};
