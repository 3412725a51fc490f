//! Downloader module
//!
//! The orchestrator keeps at most one download task per modfile identity.
//! Starting a download for an identity that is already in flight hands back
//! the existing task's handle instead of opening a second transfer.
//!
//! Completion is published twice: on the task's own [`DownloadHandle`], and
//! as a [`DownloadEvent`] on a broadcast channel for listeners that filter by
//! identity. The task leaves the active map before either is published, so a
//! listener reacting to an event can immediately start a fresh download.

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::core::{FileOperation, FileValidation, Modfile, ModfileIdentity, Result, SyncError};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Moves a modfile binary from the catalog's storage to a local path
#[async_trait]
pub trait BinaryTransport: Send + Sync {
    /// Download `modfile` to `destination`, returning the number of bytes written
    async fn download(&self, modfile: &Modfile, destination: &Path) -> Result<u64>;
}

/// Result of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInfo {
    pub identity: ModfileIdentity,
    pub path: PathBuf,
    pub bytes: u64,
    pub duration: Duration,
}

/// Lifecycle of a download task
#[derive(Debug, Clone)]
pub enum DownloadState {
    Pending,
    Succeeded(DownloadInfo),
    Failed(Arc<SyncError>),
}

/// Published once per finished task
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Succeeded {
        identity: ModfileIdentity,
        info: DownloadInfo,
    },
    Failed {
        identity: ModfileIdentity,
        error: Arc<SyncError>,
    },
}

impl DownloadEvent {
    pub fn identity(&self) -> ModfileIdentity {
        match self {
            DownloadEvent::Succeeded { identity, .. } | DownloadEvent::Failed { identity, .. } => {
                *identity
            }
        }
    }
}

/// Shared view of one in-flight or finished download task
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    identity: ModfileIdentity,
    destination: PathBuf,
    state: watch::Receiver<DownloadState>,
}

impl DownloadHandle {
    pub fn identity(&self) -> ModfileIdentity {
        self.identity
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn state(&self) -> DownloadState {
        self.state.borrow().clone()
    }

    /// Wait for the task to finish
    pub async fn wait(mut self) -> Result<DownloadInfo> {
        let identity = self.identity;
        let state = self
            .state
            .wait_for(|state| !matches!(state, DownloadState::Pending))
            .await
            .map_err(|_| SyncError::TaskFailed {
                reason: format!("download task for {} ended without a result", identity),
            })?
            .clone();

        match state {
            DownloadState::Succeeded(info) => Ok(info),
            DownloadState::Failed(error) => Err(SyncError::DownloadFailed {
                identity,
                source: error,
            }),
            DownloadState::Pending => Err(SyncError::TaskFailed {
                reason: format!("download task for {} is still pending", identity),
            }),
        }
    }
}

type ActiveDownloads = Arc<Mutex<HashMap<ModfileIdentity, DownloadHandle>>>;

fn lock_active(active: &Mutex<HashMap<ModfileIdentity, DownloadHandle>>) -> MutexGuard<'_, HashMap<ModfileIdentity, DownloadHandle>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deduplicating download scheduler
pub struct DownloadOrchestrator {
    transport: Arc<dyn BinaryTransport>,
    active: ActiveDownloads,
    events: broadcast::Sender<DownloadEvent>,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("active", &lock_active(&self.active).len())
            .finish()
    }
}

impl DownloadOrchestrator {
    pub fn new(transport: Arc<dyn BinaryTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            active: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Start downloading `modfile` to `destination`, or join the task already in flight
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_download(&self, modfile: &Modfile, destination: PathBuf) -> DownloadHandle {
        let identity = modfile.identity();
        let mut active = lock_active(&self.active);

        if let Some(existing) = active.get(&identity) {
            debug!("Download for {} already in flight", identity);
            return existing.clone();
        }

        let (state_tx, state_rx) = watch::channel(DownloadState::Pending);
        let handle = DownloadHandle {
            identity,
            destination: destination.clone(),
            state: state_rx,
        };
        active.insert(identity, handle.clone());
        drop(active);

        let task = DownloadTask {
            modfile: modfile.clone(),
            destination,
            transport: self.transport.clone(),
            entry: ActiveEntry {
                identity,
                active: self.active.clone(),
            },
            events: self.events.clone(),
            state: state_tx,
        };
        let span = info_span!(
            "download",
            mod_id = identity.mod_id,
            modfile_id = identity.modfile_id
        );
        tokio::spawn(task.run().instrument(span));

        handle
    }

    /// Handle of the in-flight download for `identity`, if any
    pub fn active_download(&self, identity: ModfileIdentity) -> Option<DownloadHandle> {
        lock_active(&self.active).get(&identity).cloned()
    }

    pub fn is_downloading(&self, identity: ModfileIdentity) -> bool {
        lock_active(&self.active).contains_key(&identity)
    }

    /// Receive completion events for every task started after subscribing
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.events.subscribe()
    }
}

/// Clears a task's entry from the active map when the task is dropped,
/// including when the transport panics
struct ActiveEntry {
    identity: ModfileIdentity,
    active: ActiveDownloads,
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        lock_active(&self.active).remove(&self.identity);
    }
}

struct DownloadTask {
    modfile: Modfile,
    destination: PathBuf,
    transport: Arc<dyn BinaryTransport>,
    entry: ActiveEntry,
    events: broadcast::Sender<DownloadEvent>,
    state: watch::Sender<DownloadState>,
}

impl DownloadTask {
    async fn run(self) {
        let identity = self.modfile.identity();
        let start_time = Instant::now();

        let result = self.transfer().await;

        drop(self.entry);

        let (state, event) = match result {
            Ok(bytes) => {
                let info = DownloadInfo {
                    identity,
                    path: self.destination.clone(),
                    bytes,
                    duration: start_time.elapsed(),
                };
                info!("Downloaded {} ({} bytes)", identity, bytes);
                (
                    DownloadState::Succeeded(info.clone()),
                    DownloadEvent::Succeeded { identity, info },
                )
            }
            Err(e) => {
                warn!("Download of {} failed [{}]: {}", identity, e.category(), e);
                let error = Arc::new(e);
                (
                    DownloadState::Failed(error.clone()),
                    DownloadEvent::Failed { identity, error },
                )
            }
        };

        self.state.send_replace(state);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn transfer(&self) -> Result<u64> {
        if let Some(parent) = self.destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::fs(parent, FileOperation::CreateDir, e))?;
        }

        let bytes = self
            .transport
            .download(&self.modfile, &self.destination)
            .await?;

        let validation = FileValidation::for_modfile(&self.modfile);
        if !validation.validate_file(&self.destination).await? {
            if let Err(e) = fs::remove_file(&self.destination).await {
                warn!(
                    "Failed to remove invalid archive {}: {}",
                    self.destination.display(),
                    e
                );
            }
            return Err(SyncError::IntegrityMismatch {
                file: self.destination.clone(),
            });
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests;
