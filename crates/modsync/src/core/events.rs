//! Install/uninstall notifications for external listeners

use std::sync::Arc;
use tracing::info;

use crate::core::ModfileIdentity;

/// Callback receiving install/uninstall events
pub type EventCallback = Arc<dyn Fn(InstallEvent) + Send + Sync>;

/// Events emitted after a successful filesystem operation, never before
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    ModBinaryInstalled(ModfileIdentity),
    /// Exactly the identities whose directories were removed
    ModBinariesUninstalled(Vec<ModfileIdentity>),
}

/// Trait for event listeners that prefer one method per event
pub trait EventReporter: Send + Sync {
    fn on_mod_binary_installed(&self, _identity: ModfileIdentity) {}
    fn on_mod_binaries_uninstalled(&self, _identities: &[ModfileIdentity]) {}
}

/// Extension trait to convert an EventReporter into an EventCallback
pub trait IntoEventCallback {
    fn into_callback(self) -> EventCallback;
}

impl<T: EventReporter + 'static> IntoEventCallback for T {
    fn into_callback(self) -> EventCallback {
        Arc::new(move |event| match event {
            InstallEvent::ModBinaryInstalled(identity) => {
                self.on_mod_binary_installed(identity);
            }
            InstallEvent::ModBinariesUninstalled(identities) => {
                self.on_mod_binaries_uninstalled(&identities);
            }
        })
    }
}

/// Reporter that writes every event to the tracing log
#[derive(Debug, Default)]
pub struct TracingEventReporter;

impl EventReporter for TracingEventReporter {
    fn on_mod_binary_installed(&self, identity: ModfileIdentity) {
        info!(
            mod_id = identity.mod_id,
            modfile_id = identity.modfile_id,
            "Mod binary installed"
        );
    }

    fn on_mod_binaries_uninstalled(&self, identities: &[ModfileIdentity]) {
        for identity in identities {
            info!(
                mod_id = identity.mod_id,
                modfile_id = identity.modfile_id,
                "Mod binary uninstalled"
            );
        }
    }
}

/// Reporter that discards events
#[derive(Debug, Default)]
pub struct NullEventReporter;

impl EventReporter for NullEventReporter {}
