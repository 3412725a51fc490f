//! Archive installer
//!
//! Installing a build is an ordered protocol. The archive is extracted into a
//! private scratch directory first, and the installation root is only touched
//! after extraction succeeded:
//!
//! 1. the archive must exist
//! 2. the scratch directory is deleted and recreated
//! 3. the archive is extracted into it (failure removes the scratch dir)
//! 4. every installed version of the mod is uninstalled
//! 5. the final directory is cleared and the scratch dir moved into place
//! 6. the source archive is deleted
//! 7. `ModBinaryInstalled` is emitted
//!
//! A failure in steps 4 to 6 leaves the scratch directory where it is so the
//! extracted files can be inspected.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::core::{EventCallback, InstallEvent, ModfileIdentity, NULL_ID};
use crate::install::archive::extract_zip;
use crate::install::error::{InstallError, RelocationStep};
use crate::install::index::{list_installed, InstalledMod};
use crate::layout::StorageLayout;

/// Installs and uninstalls builds under the installation root
#[derive(Clone)]
pub struct ArchiveInstaller {
    layout: StorageLayout,
    event_callback: Option<EventCallback>,
}

impl std::fmt::Debug for ArchiveInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveInstaller")
            .field("layout", &self.layout)
            .field("has_event_callback", &self.event_callback.is_some())
            .finish()
    }
}

impl ArchiveInstaller {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            event_callback: None,
        }
    }

    /// Set the callback receiving install/uninstall events
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn emit(&self, event: InstallEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }

    /// Install `archive_path` as the only installed version of its mod
    #[instrument(skip(self, archive_path), fields(mod_id = identity.mod_id, modfile_id = identity.modfile_id))]
    pub async fn install(
        &self,
        identity: ModfileIdentity,
        archive_path: &Path,
    ) -> Result<(), InstallError> {
        if !identity.is_managed() {
            return Err(InstallError::UnmanagedMod);
        }

        match fs::metadata(archive_path).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return Err(InstallError::ArchiveNotFound(archive_path.to_path_buf())),
        }

        let temp_dir = self.layout.extraction_dir(identity);
        prepare_empty_dir(&temp_dir)
            .await
            .map_err(|source| InstallError::PrepareTemp {
                path: temp_dir.clone(),
                source,
            })?;

        debug!("Extracting {} into {}", archive_path.display(), temp_dir.display());
        if let Err(e) = extract_zip(archive_path, &temp_dir).await {
            if let Err(cleanup) = fs::remove_dir_all(&temp_dir).await {
                warn!(
                    "Failed to remove extraction dir {}: {}",
                    temp_dir.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        let relocation = |step: RelocationStep| {
            let temp_dir = temp_dir.clone();
            move |source: InstallError| InstallError::Relocation {
                identity,
                step,
                temp_dir,
                source: Box::new(source),
            }
        };

        self.uninstall(identity.mod_id)
            .await
            .map_err(relocation(RelocationStep::UninstallPrevious))?;

        let final_dir = self.layout.install_dir(identity);
        self.move_into_place(&temp_dir, &final_dir)
            .await
            .map_err(relocation(RelocationStep::MoveIntoPlace))?;

        fs::remove_file(archive_path)
            .await
            .map_err(|e| InstallError::io(archive_path, e))
            .map_err(relocation(RelocationStep::DeleteArchive))?;

        info!("Installed {} into {}", identity, final_dir.display());
        self.emit(InstallEvent::ModBinaryInstalled(identity));
        Ok(())
    }

    async fn move_into_place(&self, temp_dir: &Path, final_dir: &Path) -> Result<(), InstallError> {
        match fs::remove_dir_all(final_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(InstallError::io(final_dir, e)),
        }

        let root = self.layout.installation_dir();
        fs::create_dir_all(root)
            .await
            .map_err(|e| InstallError::io(root, e))?;

        move_dir(temp_dir, final_dir).await
    }

    /// Remove every installed version of `mod_id`
    ///
    /// Returns the identities whose directories were removed. Directories that
    /// could not be removed turn the result into `PartialUninstall`; nothing
    /// that was already removed is restored.
    pub async fn uninstall(&self, mod_id: i64) -> Result<Vec<ModfileIdentity>, InstallError> {
        self.uninstall_matching(mod_id, |_| true).await
    }

    /// Remove one installed version; a version that is not installed is a no-op
    pub async fn uninstall_version(
        &self,
        mod_id: i64,
        modfile_id: i64,
    ) -> Result<Vec<ModfileIdentity>, InstallError> {
        self.uninstall_matching(mod_id, |identity| identity.modfile_id == modfile_id)
            .await
    }

    async fn uninstall_matching<F>(
        &self,
        mod_id: i64,
        matches: F,
    ) -> Result<Vec<ModfileIdentity>, InstallError>
    where
        F: Fn(&ModfileIdentity) -> bool,
    {
        if mod_id == NULL_ID {
            return Err(InstallError::UnmanagedMod);
        }

        let installed = list_installed(self.layout.installation_dir(), Some(&[mod_id])).await;

        let mut removals = Vec::new();
        for entry in installed.into_iter().filter(|entry| matches(&entry.identity)) {
            let result = fs::remove_dir_all(&entry.path).await;
            removals.push((entry, result));
        }

        self.settle_removals(mod_id, removals)
    }

    /// Turn per-directory removal results into the uninstall result
    ///
    /// Emits `ModBinariesUninstalled` for whatever was removed, even when
    /// other directories failed.
    pub(crate) fn settle_removals<I>(
        &self,
        mod_id: i64,
        removals: I,
    ) -> Result<Vec<ModfileIdentity>, InstallError>
    where
        I: IntoIterator<Item = (InstalledMod, std::io::Result<()>)>,
    {
        let mut removed = Vec::new();
        let mut failed = Vec::new();
        for (entry, result) in removals {
            match result {
                Ok(()) => {
                    debug!("Removed {}", entry.path.display());
                    removed.push(entry.identity);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    removed.push(entry.identity);
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", entry.path.display(), e);
                    failed.push(entry.path);
                }
            }
        }

        if !removed.is_empty() {
            info!(mod_id, count = removed.len(), "Uninstalled mod binaries");
            self.emit(InstallEvent::ModBinariesUninstalled(removed.clone()));
        }

        if failed.is_empty() {
            Ok(removed)
        } else {
            Err(InstallError::PartialUninstall {
                mod_id,
                removed,
                failed,
            })
        }
    }
}

async fn prepare_empty_dir(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(path).await
}

/// Rename a directory, copying across filesystems when rename cannot
async fn move_dir(from: &Path, to: &Path) -> Result<(), InstallError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!("Copying {} to {} across devices", from.display(), to.display());
            copy_dir_recursive(from, to).await?;
            fs::remove_dir_all(from)
                .await
                .map_err(|e| InstallError::io(from, e))
        }
        Err(e) => Err(InstallError::io(to, e)),
    }
}

async fn copy_dir_recursive(from: &Path, to: &Path) -> Result<(), InstallError> {
    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst)
            .await
            .map_err(|e| InstallError::io(&dst, e))?;

        let mut entries = fs::read_dir(&src)
            .await
            .map_err(|e| InstallError::io(&src, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| InstallError::io(&src, e))?
        {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| InstallError::io(&src_path, e))?;

            if file_type.is_dir() {
                pending.push((src_path, dst_path));
            } else {
                fs::copy(&src_path, &dst_path)
                    .await
                    .map_err(|e| InstallError::io(&src_path, e))?;
            }
        }
    }

    Ok(())
}
