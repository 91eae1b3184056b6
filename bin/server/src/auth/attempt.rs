//! Storage for the correlators of in-flight logins.
//!
//! The default [`CookieAttemptStore`] keeps the server stateless: the
//! browser holds the state, nonce, and PKCE verifier. [`MemoryAttemptStore`]
//! keeps only the state in the browser and the rest in process memory.

use async_trait::async_trait;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use gatehouse_platform_access::{AuthorizationState, PendingAttempt};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

use super::cookies::{self, CookieOptions, NONCE_COOKIE, PKCE_VERIFIER_COOKIE, STATE_COOKIE};

/// Records login attempts between the redirect and the callback.
#[async_trait]
pub trait PendingAttemptStore: Send + Sync {
    /// Records `attempt` and returns the jar carrying whatever the browser must hold.
    async fn begin(
        &self,
        jar: CookieJar,
        attempt: AuthorizationState,
        options: CookieOptions,
    ) -> CookieJar;

    /// Retrieves and discards the attempt this browser started.
    ///
    /// The returned jar removes the attempt's cookies. A second call for the
    /// same attempt finds nothing.
    async fn take(&self, jar: CookieJar) -> (CookieJar, PendingAttempt);

    /// Drops attempts that outlived their TTL. Returns how many were dropped.
    async fn purge_expired(&self) -> usize {
        0
    }
}

/// Keeps every correlator in its own browser cookie.
#[derive(Debug, Default, Clone, Copy)]
pub struct CookieAttemptStore;

#[async_trait]
impl PendingAttemptStore for CookieAttemptStore {
    async fn begin(
        &self,
        jar: CookieJar,
        attempt: AuthorizationState,
        options: CookieOptions,
    ) -> CookieJar {
        jar.add(cookies::issue(STATE_COOKIE, attempt.state, options))
            .add(cookies::issue(NONCE_COOKIE, attempt.nonce, options))
            .add(cookies::issue(
                PKCE_VERIFIER_COOKIE,
                attempt.pkce_verifier,
                options,
            ))
    }

    async fn take(&self, jar: CookieJar) -> (CookieJar, PendingAttempt) {
        let attempt = PendingAttempt {
            state: cookies::read(&jar, STATE_COOKIE),
            nonce: cookies::read(&jar, NONCE_COOKIE),
            pkce_verifier: cookies::read(&jar, PKCE_VERIFIER_COOKIE),
        };
        let jar = [STATE_COOKIE, NONCE_COOKIE, PKCE_VERIFIER_COOKIE]
            .into_iter()
            .fold(jar, cookies::forget);
        (jar, attempt)
    }
}

/// Default for [`MemoryAttemptStore::new`].
pub const DEFAULT_ATTEMPT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct StoredAttempt {
    nonce: String,
    pkce_verifier: String,
    expires_at: DateTime<Utc>,
}

/// Keeps nonce and verifier in memory, keyed by the state held in the browser.
///
/// Attempts do not survive a restart and are not shared between replicas.
/// At capacity, expired attempts are dropped first, then the one closest to
/// expiry.
#[derive(Debug)]
pub struct MemoryAttemptStore {
    attempts: RwLock<HashMap<String, StoredAttempt>>,
    capacity: usize,
}

impl Default for MemoryAttemptStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ATTEMPT_CAPACITY)
    }
}

impl MemoryAttemptStore {
    /// Creates an empty store holding up to [`DEFAULT_ATTEMPT_CAPACITY`] attempts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store holding up to `capacity` attempts.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns how many attempts are pending.
    pub async fn len(&self) -> usize {
        self.attempts.read().await.len()
    }

    /// Returns true if no attempt is pending.
    pub async fn is_empty(&self) -> bool {
        self.attempts.read().await.is_empty()
    }
}

/// Frees one slot in a full map.
fn make_room(attempts: &mut HashMap<String, StoredAttempt>, capacity: usize) {
    if attempts.len() < capacity {
        return;
    }

    let now = Utc::now();
    attempts.retain(|_, stored| stored.expires_at > now);
    if attempts.len() < capacity {
        return;
    }

    let oldest = attempts
        .iter()
        .min_by_key(|(_, stored)| stored.expires_at)
        .map(|(state, _)| state.clone());
    if let Some(state) = oldest {
        warn!(capacity, "pending login attempts at capacity, evicting oldest");
        attempts.remove(&state);
    }
}

#[async_trait]
impl PendingAttemptStore for MemoryAttemptStore {
    async fn begin(
        &self,
        jar: CookieJar,
        attempt: AuthorizationState,
        options: CookieOptions,
    ) -> CookieJar {
        let expires_at = Utc::now() + chrono::Duration::seconds(options.ttl.whole_seconds());
        {
            let mut attempts = self.attempts.write().await;
            if !attempts.contains_key(&attempt.state) {
                make_room(&mut attempts, self.capacity);
            }
            attempts.insert(
                attempt.state.clone(),
                StoredAttempt {
                    nonce: attempt.nonce,
                    pkce_verifier: attempt.pkce_verifier,
                    expires_at,
                },
            );
        }
        jar.add(cookies::issue(STATE_COOKIE, attempt.state, options))
    }

    async fn take(&self, jar: CookieJar) -> (CookieJar, PendingAttempt) {
        let state = cookies::read(&jar, STATE_COOKIE);
        let stored = match &state {
            Some(state) => self
                .attempts
                .write()
                .await
                .remove(state)
                .filter(|stored| stored.expires_at > Utc::now()),
            None => None,
        };
        let (nonce, pkce_verifier) = match stored {
            Some(stored) => (Some(stored.nonce), Some(stored.pkce_verifier)),
            None => (None, None),
        };
        (
            cookies::forget(jar, STATE_COOKIE),
            PendingAttempt {
                state,
                nonce,
                pkce_verifier,
            },
        )
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut attempts = self.attempts.write().await;
        let before = attempts.len();
        attempts.retain(|_, stored| stored.expires_at > now);
        before - attempts.len()
    }
}
