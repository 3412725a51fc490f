//! Reconciliation engine
//!
//! Brings the installation root into agreement with a desired set of
//! modfiles. Each modfile is classified against a fresh scan of the root and
//! the archive cache, then driven through [`ModfileState`] until it reaches a
//! terminal state:
//!
//! 1. builds already installed are skipped
//! 2. builds with a valid cached archive are installed straight away; an
//!    archive that verifies but does not install is deleted and the build
//!    continues as if it had never been cached
//! 3. builds whose download locator is missing or expired get their modfile
//!    metadata refreshed, concurrently; a refresh that still yields no usable
//!    locator drops the build
//! 4. the remaining builds are downloaded one at a time, each installed as
//!    soon as its download finishes
//!
//! A failure only ends its own modfile. The run completes once every entry is
//! terminal and reports the outcome per identity.

pub mod state;

pub use state::{ModfileOutcome, ModfileState, ReconcileReport};

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{CatalogClient, RequestFilter};
use crate::config::SyncConfig;
use crate::core::{
    server_time_now, EventCallback, FileValidation, ModProfile, Modfile, ModfileIdentity, Result,
    SyncError,
};
use crate::downloader::{BinaryTransport, DownloadOrchestrator};
use crate::fetch::{fetch_all, RetryPolicy};
use crate::install::{installed_versions, list_installed, ArchiveInstaller, InstallError};
use crate::layout::StorageLayout;

/// Drives desired modfiles to installed
pub struct Reconciler {
    catalog: Arc<dyn CatalogClient>,
    orchestrator: Arc<DownloadOrchestrator>,
    installer: ArchiveInstaller,
    policy: RetryPolicy,
    game_id: i64,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("installer", &self.installer)
            .field("orchestrator", &self.orchestrator)
            .field("policy", &self.policy)
            .field("game_id", &self.game_id)
            .finish()
    }
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        orchestrator: Arc<DownloadOrchestrator>,
        installer: ArchiveInstaller,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            catalog,
            orchestrator,
            installer,
            policy,
            game_id: 0,
        }
    }

    /// Wire up an engine from configuration with its own orchestrator
    pub fn from_config(
        config: &SyncConfig,
        catalog: Arc<dyn CatalogClient>,
        transport: Arc<dyn BinaryTransport>,
    ) -> Self {
        let installer = ArchiveInstaller::new(StorageLayout::from_config(config));
        Self::new(
            catalog,
            Arc::new(DownloadOrchestrator::new(transport)),
            installer,
            RetryPolicy::from_config(config),
        )
        .with_game_id(config.game_id)
    }

    pub fn with_game_id(mut self, game_id: i64) -> Self {
        self.game_id = game_id;
        self
    }

    /// Set the sink receiving install/uninstall events
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.installer = self.installer.with_event_callback(callback);
        self
    }

    pub fn installer(&self) -> &ArchiveInstaller {
        &self.installer
    }

    pub fn orchestrator(&self) -> &Arc<DownloadOrchestrator> {
        &self.orchestrator
    }

    pub fn layout(&self) -> &StorageLayout {
        self.installer.layout()
    }

    /// Reconcile the installation root against `desired`
    ///
    /// `None` entries are skipped, as are drop-in identities. A modfile listed
    /// twice is processed once.
    pub async fn reconcile<I, M>(&self, desired: I) -> ReconcileReport
    where
        I: IntoIterator<Item = M>,
        M: Into<Option<Modfile>>,
    {
        let mut report = ReconcileReport::default();
        let mut seen = HashSet::new();
        let mut modfiles = Vec::new();
        for item in desired {
            let modfile: Option<Modfile> = item.into();
            let Some(modfile) = modfile else {
                continue;
            };
            let identity = modfile.identity();
            if !identity.is_managed() {
                debug!("Skipping modfile {} without a managed mod id", modfile.id);
                continue;
            }
            if seen.insert(identity) {
                report.track(identity);
                modfiles.push(modfile);
            }
        }

        if modfiles.is_empty() {
            return report;
        }

        let layout = self.layout();
        let installed = list_installed(layout.installation_dir(), None).await;
        let now = server_time_now();

        let mut install_now = Vec::new();
        let mut needs_refresh = Vec::new();
        let mut download_queue = Vec::new();

        for modfile in modfiles {
            let identity = modfile.identity();
            if installed.contains(identity) {
                report.advance(identity, ModfileState::InstalledAlready);
            } else if FileValidation::for_modfile(&modfile)
                .is_valid(layout.archive_path(identity))
                .await
            {
                report.advance(identity, ModfileState::ArchiveValidOnDisk);
                install_now.push(modfile);
            } else if !modfile.has_valid_locator(now) {
                report.advance(identity, ModfileState::NeedsLocatorRefresh);
                needs_refresh.push(modfile);
            } else {
                report.advance(identity, ModfileState::NeedsDownload);
                download_queue.push(modfile);
            }
        }

        for modfile in install_now {
            let identity = modfile.identity();
            if self.install_archive(identity, &mut report).await.is_ok() {
                continue;
            }

            self.discard_archive(identity).await;
            report.advance(identity, ModfileState::ArchiveDiscarded);
            if modfile.has_valid_locator(server_time_now()) {
                report.advance(identity, ModfileState::NeedsDownload);
                download_queue.push(modfile);
            } else {
                report.advance(identity, ModfileState::NeedsLocatorRefresh);
                needs_refresh.push(modfile);
            }
        }

        if !needs_refresh.is_empty() {
            let refreshed = join_all(needs_refresh.iter().map(|modfile| {
                self.catalog.get_modfile(modfile.mod_id, modfile.id)
            }))
            .await;

            let now = server_time_now();
            for (stale, result) in needs_refresh.iter().zip(refreshed) {
                let identity = stale.identity();
                match result {
                    Ok(fresh) if fresh.has_valid_locator(now) => {
                        report.advance(identity, ModfileState::LocatorRefreshed);
                        report.advance(identity, ModfileState::NeedsDownload);
                        download_queue.push(fresh);
                    }
                    Ok(_) => {
                        warn!("Dropping {}: refreshed locator is still expired", identity);
                        report.fail(
                            identity,
                            ModfileState::LocatorExpired,
                            SyncError::LocatorExpired { identity },
                        );
                    }
                    Err(e) => {
                        warn!("Dropping {}: locator refresh failed: {}", identity, e);
                        report.fail(identity, ModfileState::LocatorExpired, e);
                    }
                }
            }
        }

        for modfile in &download_queue {
            self.download_and_install(modfile, &mut report).await;
        }

        info!(
            total = report.len(),
            installed = report.installed().count(),
            failed = report.failed().count(),
            "Reconciliation finished"
        );
        report
    }

    /// Install the cached archive; on failure the modfile stays in `Installing`
    async fn install_archive(
        &self,
        identity: ModfileIdentity,
        report: &mut ReconcileReport,
    ) -> std::result::Result<(), InstallError> {
        report.advance(identity, ModfileState::Installing);
        let archive = self.layout().archive_path(identity);
        match self.installer.install(identity, &archive).await {
            Ok(()) => {
                report.advance(identity, ModfileState::Installed);
                Ok(())
            }
            Err(e) => {
                warn!("Install of {} failed: {}", identity, e);
                Err(e)
            }
        }
    }

    async fn discard_archive(&self, identity: ModfileIdentity) {
        let archive = self.layout().archive_path(identity);
        info!("Discarding cached archive {} and downloading it again", archive.display());
        match tokio::fs::remove_file(&archive).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            // The download replaces it either way
            Err(e) => warn!("Failed to remove {}: {}", archive.display(), e),
        }
    }

    async fn download_and_install(&self, modfile: &Modfile, report: &mut ReconcileReport) {
        let identity = modfile.identity();

        if self.orchestrator.is_downloading(identity) {
            debug!("Skipping {}: download already in flight", identity);
            report.advance(identity, ModfileState::DownloadInFlight);
            return;
        }

        report.advance(identity, ModfileState::Downloading);
        let destination = self.layout().archive_path(identity);
        let handle = self.orchestrator.start_download(modfile, destination);

        match handle.wait().await {
            Ok(_) => {
                if let Err(e) = self.install_archive(identity, report).await {
                    report.fail(identity, ModfileState::InstallFailed, e.into());
                }
            }
            Err(e) => {
                warn!("Download of {} failed: {}", identity, e);
                report.fail(identity, ModfileState::DownloadFailed, e);
            }
        }
    }

    /// Bring one mod up to its current build
    ///
    /// Returns the identity of the build that is installed afterwards.
    pub async fn download_and_update_mod(&self, mod_id: i64) -> Result<ModfileIdentity> {
        let profile = self.catalog.get_mod(mod_id).await?;
        let build = profile
            .current_build
            .ok_or(SyncError::NoCurrentBuild { mod_id })?;
        let identity = build.identity();
        let layout = self.layout();

        if tokio::fs::try_exists(layout.install_dir(identity))
            .await
            .unwrap_or(false)
        {
            debug!("{} is already installed", identity);
            return Ok(identity);
        }

        let archive = layout.archive_path(identity);
        if FileValidation::for_modfile(&build).is_valid(&archive).await {
            match self.installer.install(identity, &archive).await {
                Ok(()) => return Ok(identity),
                Err(e) => {
                    warn!("Install of cached {} failed: {}", identity, e);
                    self.discard_archive(identity).await;
                }
            }
        }

        let build = if build.has_valid_locator(server_time_now()) {
            build
        } else {
            let fresh = self.catalog.get_modfile(build.mod_id, build.id).await?;
            if !fresh.has_valid_locator(server_time_now()) {
                return Err(SyncError::LocatorExpired { identity });
            }
            fresh
        };

        self.orchestrator
            .start_download(&build, archive.clone())
            .wait()
            .await?;

        self.installer.install(identity, &archive).await?;
        Ok(identity)
    }

    /// Bring several mods up to their current builds
    ///
    /// Profiles are fetched through the paged aggregator. Only an
    /// authentication failure is returned as an error; otherwise whatever
    /// profiles were fetched are reconciled.
    pub async fn download_and_update_mods(&self, mod_ids: &[i64]) -> Result<ReconcileReport> {
        if mod_ids.is_empty() {
            return Ok(ReconcileReport::default());
        }

        let filter = RequestFilter::new().with_id_in(mod_ids.iter().copied());
        let outcome = fetch_all(&self.policy, |pagination| {
            self.catalog.get_all_mods(&filter, pagination)
        })
        .await;
        if !outcome.is_complete() {
            debug!("Profile fetch ended early: {:?}", outcome.termination);
        }
        let profiles = outcome.into_result()?;

        let builds = profiles.into_iter().map(|profile| profile.current_build);
        Ok(self.reconcile(builds).await)
    }

    /// Update every installed managed mod
    pub async fn update_installed_mods(&self) -> Result<ReconcileReport> {
        let versions = installed_versions(self.layout().installation_dir(), None).await;
        let mut mod_ids: Vec<i64> = versions.into_iter().map(|identity| identity.mod_id).collect();
        mod_ids.sort_unstable();
        mod_ids.dedup();
        self.download_and_update_mods(&mod_ids).await
    }

    /// Every mod owned by the authenticated user for the configured game
    pub async fn fetch_authenticated_user_mods(&self) -> Result<Vec<ModProfile>> {
        let filter = RequestFilter::new().with_game_id(self.game_id);
        fetch_all(&self.policy, |pagination| {
            self.catalog.get_user_mods(&filter, pagination)
        })
        .await
        .into_result()
    }
}
