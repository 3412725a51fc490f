//! On-disk layout of installed builds and cached archives
//!
//! Installed builds live in `{installation_dir}/{mod_id}_{modfile_id}`. The
//! identity is recovered from that directory name, so the encode/decode pair
//! below is the only place that knows the naming scheme.
//!
//! Cache layout:
//!
//! ```text
//! {cache_dir}/mod_manager.data                          runtime marker
//! {cache_dir}/mods/{mod_id}/binaries/{modfile_id}.zip   downloaded archive
//! {cache_dir}/mods/{mod_id}/binaries/{modfile_id}/      temp extraction dir
//! ```

use std::path::{Path, PathBuf};

use crate::config::SyncConfig;
use crate::core::{ModfileIdentity, NULL_ID};

/// File name of the persisted runtime marker
pub const RUNTIME_MARKER_FILENAME: &str = "mod_manager.data";

/// Encode an identity as an install directory name
pub fn encode_install_dir_name(identity: ModfileIdentity) -> String {
    format!("{}_{}", identity.mod_id, identity.modfile_id)
}

/// Decode an install directory name into an identity
///
/// A name whose first `_`-separated part is not an integer belongs to a
/// drop-in mod and decodes with `mod_id = NULL_ID`. A managed name without a
/// parseable second part keeps its mod id with `modfile_id = NULL_ID`.
pub fn decode_install_dir_name(name: &str) -> ModfileIdentity {
    let mut parts = name.split('_');

    let mod_id = parts
        .next()
        .and_then(|part| part.parse::<i64>().ok())
        .unwrap_or(NULL_ID);

    let modfile_id = if mod_id == NULL_ID {
        NULL_ID
    } else {
        parts
            .next()
            .and_then(|part| part.parse::<i64>().ok())
            .unwrap_or(NULL_ID)
    };

    ModfileIdentity::new(mod_id, modfile_id)
}

/// Resolves every path the engine reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    installation_dir: PathBuf,
    cache_dir: PathBuf,
}

impl StorageLayout {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(installation_dir: P, cache_dir: Q) -> Self {
        Self {
            installation_dir: installation_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.installation_dir, &config.cache_dir)
    }

    pub fn installation_dir(&self) -> &Path {
        &self.installation_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Final directory of an installed build
    pub fn install_dir(&self, identity: ModfileIdentity) -> PathBuf {
        self.installation_dir.join(encode_install_dir_name(identity))
    }

    pub fn mod_binaries_dir(&self, mod_id: i64) -> PathBuf {
        self.cache_dir
            .join("mods")
            .join(mod_id.to_string())
            .join("binaries")
    }

    /// Download destination and cached copy of a build's archive
    pub fn archive_path(&self, identity: ModfileIdentity) -> PathBuf {
        self.mod_binaries_dir(identity.mod_id)
            .join(format!("{}.zip", identity.modfile_id))
    }

    /// Private scratch directory an archive is extracted into before relocation
    pub fn extraction_dir(&self, identity: ModfileIdentity) -> PathBuf {
        self.mod_binaries_dir(identity.mod_id)
            .join(identity.modfile_id.to_string())
    }

    pub fn runtime_marker_path(&self) -> PathBuf {
        self.cache_dir.join(RUNTIME_MARKER_FILENAME)
    }
}
