//! Installation module
//!
//! This module owns everything that touches the installation root: the
//! installed-state index, archive extraction, and the installer that moves
//! extracted builds into place.

pub mod archive;
pub mod error;
pub mod index;
pub mod installer;

// Re-export commonly used types
pub use error::{InstallError, RelocationStep};
pub use index::{installed_directories, installed_versions, list_installed, InstalledMod, InstalledMods};
pub use installer::ArchiveInstaller;
