//! Round-robin account selection and token caching
//!
//! The account list is immutable after construction. Selection advances
//! an atomic cursor modulo pool size, so N consecutive selections visit
//! every account exactly once and the order repeats every N calls.
//!
//! The token cache maps account email to `(access_token, expires_at)`.
//! A cached token is served only while the current time is more than
//! `SAFETY_MARGIN_SECS` before its expiry; inside that window the pool
//! refreshes proactively so callers never hold a token that dies
//! mid-request. Concurrent requests may race into a duplicate refresh
//! for the same account; the last write wins and both callers get a
//! valid token, so no coordination beyond the cache lock is needed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use warp_auth::Account;

use crate::error::Result;

/// Seconds before actual expiry at which a cached token is considered stale.
pub const SAFETY_MARGIN_SECS: u64 = 300;

/// A cached access token with its absolute expiry (unix seconds).
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

/// Account pool with round-robin selection and an access-token cache.
pub struct Pool {
    accounts: Vec<Account>,
    cursor: AtomicUsize,
    cache: RwLock<HashMap<String, CachedToken>>,
    client: reqwest::Client,
    token_url: String,
}

impl Pool {
    /// Create a pool over the given accounts.
    ///
    /// `token_url` is the refresh endpoint; `client` should carry the
    /// refresh timeout so every token call inherits it.
    pub fn new(accounts: Vec<Account>, token_url: String, client: reqwest::Client) -> Self {
        info!(accounts = accounts.len(), "pool initialized");
        Self {
            accounts,
            cursor: AtomicUsize::new(0),
            cache: RwLock::new(HashMap::new()),
            client,
            token_url,
        }
    }

    /// Select the next account round-robin, or `None` when the pool is empty.
    pub fn next_account(&self) -> Option<&Account> {
        if self.accounts.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.accounts.len();
        Some(&self.accounts[idx])
    }

    /// Get a valid access token for the account, refreshing if needed.
    ///
    /// Serves the cached token while it is more than `SAFETY_MARGIN_SECS`
    /// from expiry (no network call). Otherwise performs exactly one
    /// refresh, caches `(token, now + expires_in)`, and returns the new
    /// token. A failed refresh is logged and propagated, no retry.
    pub async fn access_token(&self, account: &Account) -> Result<String> {
        let now = now_unix();

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&account.email) {
                if now + SAFETY_MARGIN_SECS < entry.expires_at {
                    debug!(email = %account.email, "token cache hit");
                    return Ok(entry.access_token.clone());
                }
            }
        }

        debug!(email = %account.email, "token missing or near expiry, refreshing");
        match warp_auth::refresh_access_token(
            &self.client,
            &self.token_url,
            account.refresh_token.expose(),
        )
        .await
        {
            Ok(token) => {
                let expires_at = now + token.expires_in;
                self.cache.write().await.insert(
                    account.email.clone(),
                    CachedToken {
                        access_token: token.access_token.clone(),
                        expires_at,
                    },
                );
                metrics::counter!("token_refresh_total", "outcome" => "success").increment(1);
                info!(email = %account.email, expires_in = token.expires_in, "token refresh succeeded");
                Ok(token.access_token)
            }
            Err(e) => {
                metrics::counter!("token_refresh_total", "outcome" => "failure").increment(1);
                warn!(email = %account.email, error = %e, "token refresh failed");
                Err(e.into())
            }
        }
    }

    /// The first account in the pool (diagnostics only, does not rotate).
    pub fn first_account(&self) -> Option<&Account> {
        self.accounts.first()
    }

    /// Number of accounts in the pool.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the pool holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Status label for the service summary endpoints.
    pub fn status_label(&self) -> &'static str {
        if self.accounts.is_empty() {
            "no_accounts"
        } else {
            "ready"
        }
    }

    /// The HTTP client the pool uses for upstream calls (diagnostics reuse it).
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Current wall-clock time as unix seconds.
fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
