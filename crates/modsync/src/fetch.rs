//! Paginated fetch aggregator
//!
//! Walks a paged listing from offset 0 until a page comes back shorter than
//! its declared size. Failed pages are classified:
//!
//! - authentication invalid: abort at once, never retried
//! - unresolvable: treated as the end of the listing, items so far are final
//! - anything else: the same page is retried after a backoff, up to the
//!   attempt limit, after which the accumulated items are returned

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{Pagination, RequestPage};
use crate::config::SyncConfig;
use crate::core::{server_time_now, RequestError, Result, SyncError};

/// Retry and page-size settings for paged fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub page_size: u32,
    /// Total attempts per page, the first one included
    pub attempt_limit: usize,
    pub unreachable_backoff: Duration,
    pub transient_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            page_size: config.effective_page_size(),
            attempt_limit: config.fetch_attempt_limit.max(1),
            unreachable_backoff: config.unreachable_backoff,
            transient_backoff: config.transient_backoff,
        }
    }

    /// How long to wait before retrying after `error`
    ///
    /// A rate-limit reset time wins; otherwise unreachable servers get the
    /// long backoff and every other failure the short one.
    pub fn reattempt_delay(&self, error: &SyncError, now: i64) -> Duration {
        match error.request_error() {
            Some(RequestError {
                limited_until: Some(until),
                ..
            }) if *until > 0 => Duration::from_secs((*until - now).max(0) as u64),
            Some(request_error) if request_error.is_server_unreachable() => self.unreachable_backoff,
            _ => self.transient_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Why a paged fetch stopped
#[derive(Debug)]
pub enum FetchTermination {
    /// A short page marked the end of the listing
    Complete,
    /// The catalog rejected a page as unresolvable; items so far are the result
    Unresolvable(RequestError),
    /// A page kept failing until the attempt limit
    AttemptsExhausted(SyncError),
    /// Credentials were rejected
    AuthenticationInvalid(SyncError),
}

/// Items gathered by a paged fetch and the reason it stopped
#[derive(Debug)]
pub struct FetchOutcome<T> {
    pub items: Vec<T>,
    pub termination: FetchTermination,
}

impl<T> FetchOutcome<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self.termination, FetchTermination::Complete)
    }

    /// Accumulated items, or the error when authentication was rejected
    ///
    /// Unresolvable and exhausted fetches still count as results.
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.termination {
            FetchTermination::AuthenticationInvalid(error) => Err(error),
            _ => Ok(self.items),
        }
    }
}

/// Fetch every page of a listing
pub async fn fetch_all<T, F, Fut>(policy: &RetryPolicy, mut query: F) -> FetchOutcome<T>
where
    F: FnMut(Pagination) -> Fut,
    Fut: Future<Output = Result<RequestPage<T>>>,
{
    let mut pagination = Pagination::first(policy.page_size);
    let mut items = Vec::new();
    let mut attempts = 0usize;

    loop {
        match query(pagination).await {
            Ok(page) => {
                attempts = 0;
                let received = page.items.len();
                let declared = page.size as usize;
                items.extend(page.items);
                debug!(
                    offset = pagination.offset,
                    received, declared, "Fetched page"
                );

                if received == 0 || received < declared {
                    return FetchOutcome {
                        items,
                        termination: FetchTermination::Complete,
                    };
                }
                pagination = pagination.next();
            }
            Err(error) => {
                if error.is_authentication_invalid() {
                    warn!("Paged fetch aborted, authentication invalid: {}", error);
                    return FetchOutcome {
                        items,
                        termination: FetchTermination::AuthenticationInvalid(error),
                    };
                }

                if let Some(request_error) = error
                    .request_error()
                    .filter(|e| e.is_request_unresolvable())
                {
                    debug!(
                        "Paged fetch ended at offset {} on unresolvable request: {}",
                        pagination.offset, request_error
                    );
                    return FetchOutcome {
                        items,
                        termination: FetchTermination::Unresolvable(request_error.clone()),
                    };
                }

                attempts += 1;
                if attempts >= policy.attempt_limit {
                    warn!(
                        "Giving up on page at offset {} after {} attempts: {}",
                        pagination.offset, attempts, error
                    );
                    return FetchOutcome {
                        items,
                        termination: FetchTermination::AttemptsExhausted(error),
                    };
                }

                let delay = policy.reattempt_delay(&error, server_time_now());
                warn!(
                    "Page at offset {} failed [{}], retrying in {:?}: {}",
                    pagination.offset,
                    error.category(),
                    delay,
                    error
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
