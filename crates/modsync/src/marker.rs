//! Persistent runtime marker
//!
//! `mod_manager.data` in the cache dir records the engine version that last
//! ran. Comparing it with the running version tells a first run and an
//! upgrade apart, so one-time data migrations run exactly once.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::core::{FileOperation, Result, SyncError};

/// Version of the running engine
pub fn current_version() -> Version {
    Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// What the marker said before it was rewritten
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerStatus {
    /// No readable marker existed
    FirstRun,
    /// The marker named an older version; migrations from `from` are due
    Upgraded { from: Version },
    Current,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMarker {
    #[serde(rename = "lastRunVersion")]
    pub last_run_version: Version,
}

impl RuntimeMarker {
    pub fn new(last_run_version: Version) -> Self {
        Self { last_run_version }
    }

    /// Read the marker; a missing or unreadable file yields `None`
    pub async fn load(path: &Path) -> Option<Self> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No runtime marker at {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!("Ignoring unreadable runtime marker {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write the marker through a temp file and rename
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::fs(parent, FileOperation::CreateDir, e))?;
        }

        let json = serde_json::to_vec_pretty(self).map_err(|source| SyncError::Decode {
            context: "runtime marker".to_string(),
            source,
        })?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)
            .await
            .map_err(|e| SyncError::fs(&temp_path, FileOperation::Write, e))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| SyncError::fs(path, FileOperation::Move, e))
    }

    /// Compare the stored version with `current` and record `current`
    pub async fn load_or_init(path: &Path, current: &Version) -> Result<MarkerStatus> {
        let status = match Self::load(path).await {
            None => {
                info!("First run of version {}", current);
                MarkerStatus::FirstRun
            }
            Some(marker) if marker.last_run_version < *current => {
                info!("Upgraded from {} to {}", marker.last_run_version, current);
                MarkerStatus::Upgraded {
                    from: marker.last_run_version,
                }
            }
            Some(marker) => {
                if marker.last_run_version > *current {
                    warn!(
                        "Runtime marker names newer version {} than running {}",
                        marker.last_run_version, current
                    );
                }
                MarkerStatus::Current
            }
        };

        Self::new(current.clone()).save(path).await?;
        Ok(status)
    }
}
