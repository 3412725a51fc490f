//! Installation error types

use std::path::PathBuf;
use thiserror::Error;

use crate::core::ModfileIdentity;

/// Errors that can occur while installing or uninstalling mod binaries
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("refusing to modify unmanaged (drop-in) mod entries")]
    UnmanagedMod,

    #[error("archive not found: {0}")]
    ArchiveNotFound(PathBuf),

    #[error("failed to prepare extraction directory '{path}'")]
    PrepareTemp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Extraction failed; the temp directory has already been removed
    #[error("failed to extract '{archive}': {reason}")]
    Extraction { archive: PathBuf, reason: String },

    /// Relocation into the install root failed; the temp directory is kept for inspection
    #[error("failed to {step} for {identity} (extracted files kept at '{temp_dir}')")]
    Relocation {
        identity: ModfileIdentity,
        step: RelocationStep,
        temp_dir: PathBuf,
        #[source]
        source: Box<InstallError>,
    },

    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some directories were removed, others were not; nothing is rolled back
    #[error("uninstalled {} of {} directories for mod {mod_id}", removed.len(), removed.len() + failed.len())]
    PartialUninstall {
        mod_id: i64,
        removed: Vec<ModfileIdentity>,
        failed: Vec<PathBuf>,
    },
}

/// The post-extraction step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationStep {
    UninstallPrevious,
    MoveIntoPlace,
    DeleteArchive,
}

impl std::fmt::Display for RelocationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelocationStep::UninstallPrevious => write!(f, "uninstall previous versions"),
            RelocationStep::MoveIntoPlace => write!(f, "move extracted files into place"),
            RelocationStep::DeleteArchive => write!(f, "delete the source archive"),
        }
    }
}

impl InstallError {
    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        InstallError::Io {
            path: path.into(),
            source,
        }
    }
}
