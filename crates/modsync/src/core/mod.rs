//! Core types used throughout the synchronization engine
//!
//! This module contains the fundamental types that all other modules depend on:
//! the identity of a modfile build, the remote metadata describing it, and the
//! error, validation and event types shared by every component.

pub mod error;
pub mod events;
pub mod validation;

// Re-export main types for convenience
pub use error::{FileOperation, RequestError, RequestErrorKind, Result, SyncError};
pub use events::{
    EventCallback, EventReporter, InstallEvent, IntoEventCallback, NullEventReporter,
    TracingEventReporter,
};
pub use validation::{FileDigest, FileValidation};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Id value marking an absent or unmanaged mod/modfile
pub const NULL_ID: i64 = 0;

/// Identifies one build of one mod
///
/// An identity with `mod_id == NULL_ID` describes a drop-in directory that was
/// added by hand and is not managed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModfileIdentity {
    pub mod_id: i64,
    pub modfile_id: i64,
}

impl ModfileIdentity {
    pub fn new(mod_id: i64, modfile_id: i64) -> Self {
        Self { mod_id, modfile_id }
    }

    /// Drop-in directories are never touched by install/uninstall
    pub fn is_managed(&self) -> bool {
        self.mod_id != NULL_ID
    }
}

impl fmt::Display for ModfileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod {} / modfile {}", self.mod_id, self.modfile_id)
    }
}

/// Time-limited reference used to fetch a modfile binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLocator {
    pub binary_url: String,
    /// Unix timestamp (seconds) after which the URL is no longer served
    pub date_expires: i64,
}

impl DownloadLocator {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.date_expires <= now
    }
}

/// Content hashes published for a modfile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModfileHash {
    pub md5: Option<String>,
}

/// Remote metadata for one uploaded build of a mod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modfile {
    pub id: i64,
    pub mod_id: i64,
    #[serde(default)]
    pub date_added: i64,
    /// Expected archive size in bytes
    #[serde(rename = "filesize", default)]
    pub file_size: u64,
    #[serde(rename = "filehash", default)]
    pub file_hash: Option<ModfileHash>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(rename = "download", default)]
    pub download_locator: Option<DownloadLocator>,

    // Upload-side fields, carried but unused by reconciliation
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub metadata_blob: Option<String>,
}

impl Modfile {
    pub fn identity(&self) -> ModfileIdentity {
        ModfileIdentity::new(self.mod_id, self.id)
    }

    pub fn expected_md5(&self) -> Option<&str> {
        self.file_hash.as_ref().and_then(|hash| hash.md5.as_deref())
    }

    /// True when a locator exists and has not expired at `now`
    pub fn has_valid_locator(&self, now: i64) -> bool {
        self.download_locator
            .as_ref()
            .is_some_and(|locator| !locator.is_expired_at(now))
    }
}

/// Remote mod profile; only the fields reconciliation reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModProfile {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_id: Option<String>,
    /// The build currently published as the mod's latest
    #[serde(rename = "modfile", default)]
    pub current_build: Option<Modfile>,
}

/// Current time as unix seconds, used to judge locator expiry
pub fn server_time_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modfile_json() -> &'static str {
        r#"{
            "id": 9,
            "mod_id": 5,
            "date_added": 1499841487,
            "filesize": 15181,
            "filehash": { "md5": "2d4a0e2d7273db6b0a94b0740a88ad0d" },
            "filename": "rogue-knight-v1.zip",
            "version": "1.3",
            "changelog": "fixed crash",
            "metadata_blob": null,
            "download": {
                "binary_url": "https://cdn.example.com/mods/5/files/9.zip",
                "date_expires": 1579316848
            }
        }"#
    }

    #[test]
    fn test_modfile_deserializes_catalog_fields() {
        let modfile: Modfile = serde_json::from_str(modfile_json()).unwrap();

        assert_eq!(modfile.identity(), ModfileIdentity::new(5, 9));
        assert_eq!(modfile.file_size, 15181);
        assert_eq!(modfile.expected_md5(), Some("2d4a0e2d7273db6b0a94b0740a88ad0d"));
        assert_eq!(
            modfile.download_locator.as_ref().map(|l| l.date_expires),
            Some(1579316848)
        );
    }

    #[test]
    fn test_locator_expiry_is_inclusive() {
        let modfile: Modfile = serde_json::from_str(modfile_json()).unwrap();

        assert!(modfile.has_valid_locator(1579316847));
        assert!(!modfile.has_valid_locator(1579316848));
        assert!(!modfile.has_valid_locator(1579316849));
    }

    #[test]
    fn test_missing_locator_is_never_valid() {
        let mut modfile: Modfile = serde_json::from_str(modfile_json()).unwrap();
        modfile.download_locator = None;
        assert!(!modfile.has_valid_locator(0));
    }

    #[test]
    fn test_null_mod_id_is_unmanaged() {
        assert!(!ModfileIdentity::new(NULL_ID, 3).is_managed());
        assert!(ModfileIdentity::new(1, NULL_ID).is_managed());
    }

    #[test]
    fn test_profile_current_build_is_optional() {
        let profile: ModProfile = serde_json::from_str(r#"{"id": 12, "name": "Dusk"}"#).unwrap();
        assert_eq!(profile.id, 12);
        assert!(profile.current_build.is_none());
    }
}
