//! Per-modfile reconciliation states and the run report

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::core::{ModfileIdentity, SyncError};

/// Where one desired modfile stands in a reconciliation run
///
/// ```text
/// Unchecked -> InstalledAlready
///           -> ArchiveValidOnDisk -> Installing -> Installed | InstallFailed
///                                               -> ArchiveDiscarded -> NeedsLocatorRefresh
///                                                                   -> NeedsDownload
///           -> NeedsLocatorRefresh -> LocatorRefreshed -> NeedsDownload
///                                  -> LocatorExpired
///           -> NeedsDownload -> Downloading -> Installing
///                                           -> DownloadFailed
///                            -> DownloadInFlight
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModfileState {
    Unchecked,
    InstalledAlready,
    ArchiveValidOnDisk,
    /// The cached archive verified but would not install; it was deleted
    ArchiveDiscarded,
    NeedsLocatorRefresh,
    LocatorRefreshed,
    LocatorExpired,
    NeedsDownload,
    /// Another batch already owns the download for this identity
    DownloadInFlight,
    Downloading,
    DownloadFailed,
    Installing,
    Installed,
    InstallFailed,
}

impl ModfileState {
    pub fn can_transition_to(self, next: ModfileState) -> bool {
        use ModfileState::*;
        matches!(
            (self, next),
            (Unchecked, InstalledAlready)
                | (Unchecked, ArchiveValidOnDisk)
                | (Unchecked, NeedsLocatorRefresh)
                | (Unchecked, NeedsDownload)
                | (ArchiveValidOnDisk, Installing)
                | (Installing, ArchiveDiscarded)
                | (ArchiveDiscarded, NeedsLocatorRefresh)
                | (ArchiveDiscarded, NeedsDownload)
                | (NeedsLocatorRefresh, LocatorRefreshed)
                | (NeedsLocatorRefresh, LocatorExpired)
                | (LocatorRefreshed, NeedsDownload)
                | (NeedsDownload, Downloading)
                | (NeedsDownload, DownloadInFlight)
                | (Downloading, Installing)
                | (Downloading, DownloadFailed)
                | (Installing, Installed)
                | (Installing, InstallFailed)
        )
    }

    /// States a run ends in
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ModfileState::InstalledAlready
                | ModfileState::Installed
                | ModfileState::LocatorExpired
                | ModfileState::DownloadInFlight
                | ModfileState::DownloadFailed
                | ModfileState::InstallFailed
        )
    }

    /// Terminal states where the build is not installed afterwards
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            ModfileState::LocatorExpired
                | ModfileState::DownloadFailed
                | ModfileState::InstallFailed
        )
    }
}

impl fmt::Display for ModfileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModfileState::Unchecked => "unchecked",
            ModfileState::InstalledAlready => "installed already",
            ModfileState::ArchiveValidOnDisk => "archive valid on disk",
            ModfileState::ArchiveDiscarded => "archive discarded",
            ModfileState::NeedsLocatorRefresh => "needs locator refresh",
            ModfileState::LocatorRefreshed => "locator refreshed",
            ModfileState::LocatorExpired => "locator expired",
            ModfileState::NeedsDownload => "needs download",
            ModfileState::DownloadInFlight => "download in flight",
            ModfileState::Downloading => "downloading",
            ModfileState::DownloadFailed => "download failed",
            ModfileState::Installing => "installing",
            ModfileState::Installed => "installed",
            ModfileState::InstallFailed => "install failed",
        };
        f.write_str(name)
    }
}

/// Final state of one modfile, with the error that ended it if any
#[derive(Debug, Clone)]
pub struct ModfileOutcome {
    pub state: ModfileState,
    pub error: Option<Arc<SyncError>>,
}

/// Outcome of a reconciliation run, keyed by identity
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    outcomes: BTreeMap<ModfileIdentity, ModfileOutcome>,
}

impl ReconcileReport {
    pub fn state_of(&self, identity: ModfileIdentity) -> Option<ModfileState> {
        self.outcomes.get(&identity).map(|outcome| outcome.state)
    }

    pub fn outcome(&self, identity: ModfileIdentity) -> Option<&ModfileOutcome> {
        self.outcomes.get(&identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModfileIdentity, &ModfileOutcome)> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Identities that ended installed, whether by this run or before it
    pub fn installed(&self) -> impl Iterator<Item = ModfileIdentity> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| {
                matches!(
                    outcome.state,
                    ModfileState::Installed | ModfileState::InstalledAlready
                )
            })
            .map(|(identity, _)| *identity)
    }

    pub fn failed(&self) -> impl Iterator<Item = (ModfileIdentity, &ModfileOutcome)> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.state.is_failure())
            .map(|(identity, outcome)| (*identity, outcome))
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub(crate) fn track(&mut self, identity: ModfileIdentity) {
        self.outcomes.insert(
            identity,
            ModfileOutcome {
                state: ModfileState::Unchecked,
                error: None,
            },
        );
    }

    pub(crate) fn advance(&mut self, identity: ModfileIdentity, next: ModfileState) {
        if let Some(outcome) = self.outcomes.get_mut(&identity) {
            debug_assert!(
                outcome.state.can_transition_to(next),
                "invalid transition {} -> {} for {}",
                outcome.state,
                next,
                identity
            );
            debug!(
                mod_id = identity.mod_id,
                modfile_id = identity.modfile_id,
                "{} -> {}",
                outcome.state,
                next
            );
            outcome.state = next;
        }
    }

    pub(crate) fn fail(&mut self, identity: ModfileIdentity, next: ModfileState, error: SyncError) {
        self.advance(identity, next);
        if let Some(outcome) = self.outcomes.get_mut(&identity) {
            outcome.error = Some(Arc::new(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_path_transitions() {
        use ModfileState::*;
        let path = [Unchecked, NeedsDownload, Downloading, Installing, Installed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Installed.is_terminal());
    }

    #[test]
    fn test_refresh_path_transitions() {
        use ModfileState::*;
        assert!(NeedsLocatorRefresh.can_transition_to(LocatorRefreshed));
        assert!(LocatorRefreshed.can_transition_to(NeedsDownload));
        assert!(NeedsLocatorRefresh.can_transition_to(LocatorExpired));
        assert!(!LocatorExpired.can_transition_to(NeedsDownload));
    }

    #[test]
    fn test_discarded_archive_rejoins_download_path() {
        use ModfileState::*;
        let path = [ArchiveValidOnDisk, Installing, ArchiveDiscarded, NeedsDownload, Downloading];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(ArchiveDiscarded.can_transition_to(NeedsLocatorRefresh));
        assert!(!ArchiveDiscarded.is_terminal());
        assert!(!ArchiveDiscarded.can_transition_to(ArchiveValidOnDisk));
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        use ModfileState::*;
        for state in [InstalledAlready, Installed, LocatorExpired, DownloadFailed, InstallFailed] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(Installing));
        }
        assert!(!Unchecked.can_transition_to(Installed));
    }

    #[test]
    fn test_report_tracks_failures() {
        let mut report = ReconcileReport::default();
        let ok = ModfileIdentity::new(1, 1);
        let bad = ModfileIdentity::new(2, 1);
        report.track(ok);
        report.track(bad);
        report.advance(ok, ModfileState::InstalledAlready);
        report.advance(bad, ModfileState::NeedsLocatorRefresh);
        report.fail(
            bad,
            ModfileState::LocatorExpired,
            SyncError::LocatorExpired { identity: bad },
        );

        assert_eq!(report.installed().collect::<Vec<_>>(), vec![ok]);
        assert!(!report.is_success());
        let (identity, outcome) = report.failed().next().unwrap();
        assert_eq!(identity, bad);
        assert!(outcome.error.is_some());
    }
}
