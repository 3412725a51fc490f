//! Bring a few mods up to their current build
//!
//! Run with `MODSYNC_API_KEY` and `MODSYNC_GAME_ID` set:
//!
//! ```text
//! cargo run --example update_mods -- 2041 3187
//! ```

use modsync::core::IntoEventCallback;
use modsync::{HttpTransport, ModIoApi, Reconciler, SyncConfig, TracingEventReporter};
use std::sync::Arc;

#[tokio::main]
async fn main() -> modsync::Result<()> {
    let mod_ids: Vec<i64> = std::env::args()
        .skip(1)
        .filter_map(|arg| arg.parse().ok())
        .collect();

    let config = SyncConfig::from_env()?;
    let catalog = Arc::new(ModIoApi::new(&config)?);
    let transport = Arc::new(HttpTransport::new(&config)?);
    let reconciler = Reconciler::from_config(&config, catalog, transport)
        .with_event_callback(TracingEventReporter.into_callback());

    let report = reconciler.download_and_update_mods(&mod_ids).await?;
    for (identity, outcome) in report.iter() {
        println!("{}: {}", identity, outcome.state);
    }
    Ok(())
}
