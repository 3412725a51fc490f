//! Installed-state index
//!
//! The index is a snapshot recomputed from the installation root on every
//! query. Nothing is cached: installs and uninstalls racing with a scan only
//! make the snapshot stale, which callers tolerate.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::core::{ModfileIdentity, NULL_ID};
use crate::layout::decode_install_dir_name;

/// One directory in the installation root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledMod {
    pub identity: ModfileIdentity,
    pub path: PathBuf,
}

/// Snapshot of the installation root, ordered by directory path
///
/// Several drop-in directories can share the `(NULL_ID, NULL_ID)` identity,
/// so entries are kept as a list rather than keyed by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledMods {
    entries: Vec<InstalledMod>,
}

impl InstalledMods {
    pub fn contains(&self, identity: ModfileIdentity) -> bool {
        self.entries.iter().any(|entry| entry.identity == identity)
    }

    pub fn path_of(&self, identity: ModfileIdentity) -> Option<&Path> {
        self.entries
            .iter()
            .find(|entry| entry.identity == identity)
            .map(|entry| entry.path.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstalledMod> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for InstalledMods {
    type Item = InstalledMod;
    type IntoIter = std::vec::IntoIter<InstalledMod>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Scan the installation root
///
/// With a filter, entries whose mod id is not listed are dropped; drop-ins are
/// only kept when the filter contains `NULL_ID`. A missing or unreadable root
/// yields an empty snapshot.
pub async fn list_installed(root: &Path, mod_filter: Option<&[i64]>) -> InstalledMods {
    let mut read_dir = match fs::read_dir(root).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            debug!("Installation root {} not readable: {}", root.display(), e);
            return InstalledMods::default();
        }
    };

    let mut entries = Vec::new();
    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped scanning {}: {}", root.display(), e);
                break;
            }
        };

        let path = entry.path();
        // Follows symlinks so linked mod folders count as installed
        let is_dir = fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }

        let name = entry.file_name();
        let identity = decode_install_dir_name(&name.to_string_lossy());

        if let Some(filter) = mod_filter {
            if !filter.contains(&identity.mod_id) {
                continue;
            }
        }

        entries.push(InstalledMod { identity, path });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    InstalledMods { entries }
}

/// Identities of installed managed builds; drop-ins are never reported
pub async fn installed_versions(root: &Path, enabled: Option<&[i64]>) -> Vec<ModfileIdentity> {
    list_installed(root, enabled)
        .await
        .into_iter()
        .map(|entry| entry.identity)
        .filter(ModfileIdentity::is_managed)
        .collect()
}

/// Directories of installed mods
///
/// When restricted to enabled mods, drop-ins are still included since the
/// user added them by hand.
pub async fn installed_directories(root: &Path, enabled: Option<&[i64]>) -> Vec<PathBuf> {
    let filter = enabled.map(|ids| {
        let mut ids = ids.to_vec();
        ids.push(NULL_ID);
        ids
    });

    list_installed(root, filter.as_deref())
        .await
        .into_iter()
        .map(|entry| entry.path)
        .collect()
}
