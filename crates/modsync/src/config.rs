//! Configuration types for the synchronization engine

use std::path::PathBuf;
use std::time::Duration;

use crate::core::{Result, SyncError};

/// Largest page the catalog serves in one request
pub const PAGE_LIMIT_MAX: u32 = 100;

/// Configuration for synchronization operations
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root holding one `{mod_id}_{modfile_id}` directory per installed build
    pub installation_dir: PathBuf,
    /// Root for cached archives, temp extraction dirs and the runtime marker
    pub cache_dir: PathBuf,
    pub api_base_url: String,
    pub api_key: Option<String>,
    /// Bearer token for user-scoped endpoints
    pub oauth_token: Option<String>,
    pub game_id: i64,
    /// Page size used by paginated fetches (clamped to `PAGE_LIMIT_MAX`)
    pub page_size: u32,
    /// Attempts per page before a paginated fetch gives up
    pub fetch_attempt_limit: usize,
    /// Wait before retrying when the server could not be reached
    pub unreachable_backoff: Duration,
    /// Wait before retrying any other transient failure
    pub transient_backoff: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl SyncConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(installation_dir: P, cache_dir: Q) -> Self {
        Self {
            installation_dir: installation_dir.into(),
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Load overrides from the environment (and a `.env` file if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // Ignore error if .env not present

        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MODSYNC_INSTALL_DIR") {
            config.installation_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("MODSYNC_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("MODSYNC_API_URL") {
            config.api_base_url = url;
        }
        config.api_key = std::env::var("MODSYNC_API_KEY").ok().or(config.api_key);
        config.oauth_token = std::env::var("MODSYNC_OAUTH_TOKEN").ok().or(config.oauth_token);

        if let Ok(raw) = std::env::var("MODSYNC_GAME_ID") {
            config.game_id = raw.trim().parse().map_err(|_| SyncError::Configuration {
                message: format!("MODSYNC_GAME_ID must be an integer, got '{}'", raw),
                field: Some("MODSYNC_GAME_ID".to_string()),
            })?;
        }

        Ok(config)
    }

    /// Page size actually requested from the catalog
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, PAGE_LIMIT_MAX)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            installation_dir: PathBuf::from("./mods"),
            cache_dir: PathBuf::from("./cache"),
            api_base_url: "https://api.mod.io/v1".to_string(),
            api_key: None,
            oauth_token: None,
            game_id: 0,
            page_size: PAGE_LIMIT_MAX,
            fetch_attempt_limit: 2,
            unreachable_backoff: Duration::from_secs(60),
            transient_backoff: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
            user_agent: concat!("modsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
