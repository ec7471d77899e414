//! Session context: the bearer token's lifecycle for one signed-in user.
//!
//! A [`Session`] owns the token store, knows when the token must be
//! refreshed and coalesces concurrent refreshes into a single network call.
//! When a refresh fails the session ends: the token and the authentication
//! state are cleared and the host is sent to the login entry point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use propdesk_api::token::{self, AuthUser};
use propdesk_runtime_config::SessionSettings;

use crate::storage::{SessionStorage, TokenStore};

/// Upper bound for one refresh attempt, so a hung request cannot hold the
/// in-flight slot forever.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh request failed: {0}")]
    Network(String),

    #[error("refresh request timed out")]
    Timeout,

    #[error("refresh rejected with HTTP {0}")]
    Status(u16),

    #[error("refresh response carried no token")]
    MissingToken,
}

/// Exchanges the current token for a new one.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, current: &str) -> Result<String, RefreshError>;
}

/// Sends the user to the login entry point once the session has ended.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self, login_path: &str, return_to: Option<&str>);
}

impl<F> LoginRedirect for F
where
    F: Fn(&str, Option<&str>) + Send + Sync,
{
    fn redirect_to_login(&self, login_path: &str, return_to: Option<&str>) {
        self(login_path, return_to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub token_key: String,
    pub last_path_key: String,
    pub skew_secs: i64,
    pub login_path: String,
    pub refresh_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionOptions {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            token_key: settings.token_key.clone(),
            last_path_key: settings.last_path_key.clone(),
            skew_secs: settings.skew_secs,
            login_path: settings.login_path.clone(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

type RefreshOutcome = Result<String, RefreshError>;
type InFlight = Arc<OnceCell<RefreshOutcome>>;

pub struct Session {
    store: TokenStore,
    refresher: Option<Arc<dyn TokenRefresher>>,
    redirect: Arc<dyn LoginRedirect>,
    options: SessionOptions,
    user: RwLock<Option<AuthUser>>,
    current_path: RwLock<Option<String>>,
    /// Refresh attempts in progress, keyed by the token being replaced.
    in_flight: Mutex<HashMap<String, InFlight>>,
    disposed: AtomicBool,
    /// Bumped every time the session ends.
    expirations: AtomicU64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("has_refresher", &self.refresher.is_some())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session over `storage`. A token already present in storage
    /// (e.g. after a reload) is picked up as the signed-in user.
    pub fn create(
        storage: Arc<dyn SessionStorage>,
        refresher: Option<Arc<dyn TokenRefresher>>,
        redirect: Arc<dyn LoginRedirect>,
        options: SessionOptions,
    ) -> Arc<Self> {
        let session = Self {
            store: TokenStore::new(storage),
            refresher,
            redirect,
            options,
            user: RwLock::new(None),
            current_path: RwLock::new(None),
            in_flight: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
            expirations: AtomicU64::new(0),
        };
        if let Some(token) = session.token() {
            session.set_user_from(&token);
        }
        Arc::new(session)
    }

    /// Tear the session down: pending refresh slots are dropped and later
    /// refresh attempts become no-ops. The stored token is left alone.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        lock(&self.in_flight).clear();
        *write(&self.user) = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    pub fn token(&self) -> Option<String> {
        self.store.get_token(&self.options.token_key)
    }

    pub fn claims(&self) -> Option<Value> {
        self.store.claims(&self.options.token_key)
    }

    pub fn user(&self) -> Option<AuthUser> {
        read(&self.user).clone()
    }

    /// A token is stored and has not expired.
    pub fn is_authenticated(&self) -> bool {
        match self.token() {
            Some(token) => token::decode_token(&token)
                .is_none_or(|claims| !token::is_token_expired(&claims, token::now_unix())),
            None => false,
        }
    }

    /// Start a session with a freshly issued token.
    pub fn login(&self, token: &str) -> Option<AuthUser> {
        self.store.save_token(token, &self.options.token_key);
        let user = self.set_user_from(token);
        info!(user_id = ?user.as_ref().and_then(|u| u.id.as_deref()), "signed in");
        user
    }

    /// End the session on request: no redirect.
    pub fn logout(&self) {
        self.store.clear_token(&self.options.token_key);
        *write(&self.user) = None;
        info!("signed out");
    }

    /// Record where the user currently is, to come back after a re-login.
    pub fn set_current_path(&self, path: impl Into<String>) {
        *write(&self.current_path) = Some(path.into());
    }

    /// The path saved when the session last expired, cleared on read.
    pub fn take_return_path(&self) -> Option<String> {
        let key = &self.options.last_path_key;
        let path = self.store.get(key)?;
        self.store.remove(key);
        Some(path)
    }

    /// [`Self::ensure_fresh_token`] with the configured skew.
    pub async fn ensure_fresh(&self) -> Option<String> {
        self.ensure_fresh_token(self.options.skew_secs).await
    }

    /// Return a token that is not about to expire.
    ///
    /// - no decodable token: `None`, the caller proceeds unauthenticated;
    /// - expiry within `skew_secs`: refresh (or join the refresh in flight)
    ///   and return its result, `None` on failure;
    /// - otherwise the current token, unchanged.
    pub async fn ensure_fresh_token(&self, skew_secs: i64) -> Option<String> {
        let token = self.token()?;
        let claims = token::decode_token(&token)?;
        if !token::is_token_near_expiry(&claims, skew_secs) {
            return Some(token);
        }
        match self.refresh_replacing(&token).await {
            Ok(token) => token,
            Err(err) => {
                debug!(error = %err, "proactive token refresh failed");
                None
            }
        }
    }

    /// Exchange the current token for a new one.
    ///
    /// Returns `Ok(None)` without any network call when there is no refresh
    /// endpoint or no token. Concurrent callers share one attempt. On failure
    /// the session ends (token and user cleared, login redirect) and every
    /// caller receives the error.
    pub async fn refresh_token(&self) -> Result<Option<String>, RefreshError> {
        match self.token() {
            Some(current) => self.refresh_replacing(&current).await,
            None => Ok(None),
        }
    }

    /// Like [`Self::refresh_token`], for a caller holding `stale`. If the
    /// stored token is no longer `stale`, another caller already replaced it
    /// and the stored token is returned without a new attempt.
    pub async fn refresh_replacing(&self, stale: &str) -> Result<Option<String>, RefreshError> {
        if self.is_disposed() {
            return Ok(None);
        }
        let Some(refresher) = self.refresher.clone() else {
            return Ok(None);
        };

        // Read the token and join/register the attempt under one lock, so a
        // caller either joins the attempt for its token or sees its result.
        let (key, attempt) = {
            let mut in_flight = lock(&self.in_flight);
            let Some(current) = self.token() else {
                return Ok(None);
            };
            if current != stale {
                return Ok(Some(current));
            }
            let attempt = in_flight.entry(current.clone()).or_default().clone();
            (current, attempt)
        };
        let _slot = InFlightSlot {
            registry: &self.in_flight,
            key: &key,
            attempt: &attempt,
        };

        attempt
            .get_or_init(|| self.run_refresh(refresher.as_ref(), &key))
            .await
            .clone()
            .map(Some)
    }

    /// End the session: clear token and user, remember where the user was
    /// and send them to the login entry point.
    pub fn expire(&self) {
        self.expirations.fetch_add(1, Ordering::SeqCst);
        self.end_session();
    }

    /// Number of times this session has ended so far. A request reads it
    /// before sending to learn later whether it was ended meanwhile.
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::SeqCst)
    }

    /// [`Self::expire`], unless the session already ended after `since` was
    /// read from [`Self::expirations`]. Returns whether it expired now.
    pub fn expire_once(&self, since: u64) -> bool {
        if self
            .expirations
            .compare_exchange(since, since + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("session already ended, skipping redirect");
            return false;
        }
        self.end_session();
        true
    }

    fn end_session(&self) {
        self.store.clear_token(&self.options.token_key);
        *write(&self.user) = None;

        let return_to = read(&self.current_path).clone();
        if let Some(path) = return_to.as_deref() {
            self.store.set(&self.options.last_path_key, path);
        }
        warn!(login_path = %self.options.login_path, "session expired, redirecting to login");
        self.redirect
            .redirect_to_login(&self.options.login_path, return_to.as_deref());
    }

    async fn run_refresh(&self, refresher: &dyn TokenRefresher, current: &str) -> RefreshOutcome {
        debug!("refreshing bearer token");
        let outcome = match tokio::time::timeout(
            self.options.refresh_timeout,
            refresher.refresh(current),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(RefreshError::Timeout),
        };

        match outcome {
            Ok(token) => {
                self.store.save_token(&token, &self.options.token_key);
                self.set_user_from(&token);
                info!("bearer token refreshed");
                Ok(token)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                self.expire();
                Err(err)
            }
        }
    }

    fn set_user_from(&self, token: &str) -> Option<AuthUser> {
        let user = token::decode_token(token).and_then(|claims| token::user_from_claims(&claims));
        *write(&self.user) = user.clone();
        user
    }
}

/// Releases an in-flight registry entry once its attempt has settled,
/// including when the waiting future is dropped.
struct InFlightSlot<'a> {
    registry: &'a Mutex<HashMap<String, InFlight>>,
    key: &'a str,
    attempt: &'a InFlight,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut registry = lock(self.registry);
        if registry
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, self.attempt))
            && (self.attempt.initialized() || Arc::strong_count(self.attempt) <= 2)
        {
            registry.remove(self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
