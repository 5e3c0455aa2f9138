// Session manager: login, silent refresh, identity resolution and logout

use crate::error::{ApiError, ApiResult};
use crate::http::{ApiRequest, ApiResponse, HttpClient};
use crate::models::{TokenPair, User};
use crate::tokens::{TokenKind, TokenStore};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{OnceCell, broadcast, watch};
use tracing::{debug, info, warn};

/// Unauthenticated entry point, announced on logout
pub const LOGIN_ROUTE: &str = "/login";

/// Where the session sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Resolving,
    Authenticated,
    Anonymous,
    Refreshing,
}

/// Read-only snapshot of the session
#[derive(Clone, Default, PartialEq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    pub ready: bool,
    pub phase: SessionPhase,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .field("ready", &self.ready)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Broadcast on session transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: i64 },
    Refreshed,
    LoggedOut { redirect_to: &'static str },
}

/// Route guard outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(&'static str),
}

/// Dependent state that must be dropped when the session ends
pub trait SessionListener: Send + Sync {
    fn on_session_end(&self);
}

/// How long persisted credentials stay valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(60 * 60),
            refresh: Duration::from_secs(60 * 60 * 24 * 180),
        }
    }
}

/// Owns the authentication state and the token store.
///
/// Construct once per process and share behind an `Arc`. State is exposed
/// through [`SessionManager::snapshot`] and [`SessionManager::subscribe`];
/// nothing outside this type writes credentials.
pub struct SessionManager {
    http: Arc<dyn HttpClient>,
    tokens: TokenStore,
    lifetimes: TokenLifetimes,
    state: watch::Sender<Session>,
    events: broadcast::Sender<SessionEvent>,
    resolved: OnceCell<()>,
    refresh_lock: tokio::sync::Mutex<()>,
    listeners: Mutex<Vec<Weak<dyn SessionListener>>>,
    // Bumped whenever credentials are cleared; in-flight work started under
    // an older value must not write credentials or a user back.
    epoch: AtomicU64,
}

impl SessionManager {
    pub fn new(http: Arc<dyn HttpClient>, tokens: TokenStore, lifetimes: TokenLifetimes) -> Self {
        let (state, _) = watch::channel(Session::default());
        let (events, _) = broadcast::channel(16);
        Self {
            http,
            tokens,
            lifetimes,
            state,
            events,
            resolved: OnceCell::new(),
            refresh_lock: tokio::sync::Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            epoch: AtomicU64::new(0),
        }
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token.clone()
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Register state to be cleared on logout. Dropped listeners are pruned.
    pub fn add_listener(&self, listener: Weak<dyn SessionListener>) {
        self.listeners.lock().push(listener);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Resolve the session from storage. Runs once per process; concurrent
    /// callers wait on the same in-flight resolution.
    pub async fn init(&self) {
        self.resolved.get_or_init(|| self.resolve()).await;
    }

    async fn resolve(&self) {
        let access = self.tokens.get(TokenKind::Access);
        let refresh = self.tokens.get(TokenKind::Refresh);
        info!(
            has_access = access.is_some(),
            has_refresh = refresh.is_some(),
            "Resolving session from storage"
        );

        self.state.send_modify(|s| {
            s.phase = SessionPhase::Resolving;
            s.access_token = access.clone();
            s.refresh_token = refresh.clone();
        });

        if access.is_some() {
            self.fetch_user().await;
        } else if refresh.is_some() {
            // Access token lapsed in storage but the refresh token survived
            if self.refresh_tokens().await {
                self.fetch_user().await;
            } else {
                self.logout();
            }
        }

        self.mark_ready();
    }

    fn mark_ready(&self) {
        self.state.send_modify(|s| {
            s.ready = true;
            s.phase = if s.is_authenticated() {
                SessionPhase::Authenticated
            } else {
                SessionPhase::Anonymous
            };
        });
        debug!(phase = ?self.phase(), "Session resolved");
    }

    /// Exchange credentials for a token pair and resolve the user.
    /// A rejected login leaves the session untouched; if the user lookup
    /// fails the fresh tokens are discarded and the lookup error returned.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<User> {
        let request = ApiRequest::post("/auth/login").form(&[("username", email), ("password", password)]);
        let pair: TokenPair = self.http.send(&request).await?.into_result()?.json()?;

        let was_authenticated = self.is_authenticated();
        self.store_tokens(&pair);
        let epoch = self.epoch();

        let user = match self.lookup_user(&pair.access_token, epoch).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Login accepted but user lookup failed");
                if self.epoch() == epoch {
                    if was_authenticated {
                        // Another identity's data may still be cached
                        self.logout();
                    } else {
                        self.clear_credentials();
                    }
                }
                return Err(e);
            }
        };

        // A successful login counts as the process's resolution
        let _ = self.resolved.set(());
        self.mark_ready();

        info!(user_id = user.id, "Logged in");
        let _ = self.events.send(SessionEvent::LoggedIn { user_id: user.id });
        Ok(user)
    }

    /// Create an account, then log in with the same credentials
    pub async fn register(&self, email: &str, password: &str) -> ApiResult<User> {
        let request = ApiRequest::post("/auth/register").json(&json!({ "email": email, "password": password }))?;
        self.http.send(&request).await?.into_result()?;
        info!("Account registered");
        self.login(email, password).await
    }

    /// Resolve the current user. Any failure gets one refresh and one retry;
    /// if either fails the session is logged out.
    pub async fn fetch_user(&self) -> Option<User> {
        let token = self.access_token()?;
        let epoch = self.epoch();

        match self.lookup_user(&token, epoch).await {
            Ok(user) => Some(user),
            Err(_) => {
                // A logout that landed meanwhile already cleared everything
                if self.epoch() == epoch {
                    self.logout();
                }
                None
            }
        }
    }

    /// One lookup, at most one refresh and one retry. Logging out is left
    /// to the caller.
    async fn lookup_user(&self, token: &str, epoch: u64) -> ApiResult<User> {
        let first = match self.request_me(token).await {
            Ok(user) => return self.accept_user(user, epoch),
            Err(e) => {
                debug!(error = %e, "fetch_user: identity lookup failed");
                e
            }
        };

        if !self.refresh_after(token).await {
            return Err(first);
        }

        let token = self.access_token().ok_or(ApiError::SessionExpired)?;
        let user = self
            .request_me(&token)
            .await
            .inspect_err(|e| warn!(error = %e, "fetch_user: retry after refresh failed"))?;
        self.accept_user(user, epoch)
    }

    async fn request_me(&self, token: &str) -> ApiResult<User> {
        self.dispatch(&ApiRequest::get("/auth/me"), token).await?.json()
    }

    fn accept_user(&self, user: User, epoch: u64) -> ApiResult<User> {
        if self.epoch() != epoch {
            debug!("fetch_user: session ended during lookup, dropping user");
            return Err(ApiError::SessionExpired);
        }
        self.state.send_modify(|s| s.user = Some(user.clone()));
        Ok(user)
    }

    /// Exchange the refresh token for a new pair. Never fails; `false`
    /// leaves the fallback decision to the caller.
    pub async fn refresh_tokens(&self) -> bool {
        let _guard = self.refresh_lock.lock().await;
        self.exchange_refresh_token().await
    }

    /// Refresh unless a concurrent caller already replaced `stale`
    async fn refresh_after(&self, stale: &str) -> bool {
        let _guard = self.refresh_lock.lock().await;
        if self.access_token().is_some_and(|current| current != stale) {
            debug!("refresh: token already rotated, reusing it");
            return true;
        }
        self.exchange_refresh_token().await
    }

    async fn exchange_refresh_token(&self) -> bool {
        let refresh = self
            .state
            .borrow()
            .refresh_token
            .clone()
            .or_else(|| self.tokens.get(TokenKind::Refresh));
        let Some(refresh) = refresh else {
            debug!("refresh: no refresh token held");
            return false;
        };

        let epoch = self.epoch();
        let previous = self.phase();
        self.state.send_modify(|s| s.phase = SessionPhase::Refreshing);

        let result = async {
            let request = ApiRequest::post("/auth/refresh").json(&json!({ "refresh_token": refresh }))?;
            self.http.send(&request).await?.into_result()?.json::<TokenPair>()
        }
        .await;

        if self.epoch() != epoch {
            debug!("refresh: session ended while in flight, discarding reply");
            return false;
        }

        if let Ok(pair) = &result {
            self.store_tokens(pair);
        }
        self.state.send_modify(|s| {
            s.phase = match previous {
                SessionPhase::Resolving | SessionPhase::Uninitialized => previous,
                _ if s.is_authenticated() => SessionPhase::Authenticated,
                _ => SessionPhase::Anonymous,
            };
        });

        match result {
            Ok(_) => {
                info!("Tokens refreshed");
                let _ = self.events.send(SessionEvent::Refreshed);
                true
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                false
            }
        }
    }

    fn store_tokens(&self, pair: &TokenPair) {
        if let Err(e) = self
            .tokens
            .set(TokenKind::Access, Some(&pair.access_token), self.lifetimes.access)
        {
            warn!(error = ?e, "Failed to persist access token");
        }
        if let Err(e) = self
            .tokens
            .set(TokenKind::Refresh, Some(&pair.refresh_token), self.lifetimes.refresh)
        {
            warn!(error = ?e, "Failed to persist refresh token");
        }

        self.state.send_modify(|s| {
            s.access_token = Some(pair.access_token.clone());
            s.refresh_token = Some(pair.refresh_token.clone());
        });
    }

    /// Drop user, tokens and dependent state, then announce the redirect.
    /// Safe to call when already logged out.
    pub fn logout(&self) {
        self.clear_credentials();
        self.notify_session_end();

        info!("Logged out");
        let _ = self.events.send(SessionEvent::LoggedOut {
            redirect_to: LOGIN_ROUTE,
        });
    }

    /// Forget user and tokens in memory and storage, without announcing it
    fn clear_credentials(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|s| {
            s.user = None;
            s.access_token = None;
            s.refresh_token = None;
            if s.phase != SessionPhase::Resolving {
                s.phase = SessionPhase::Anonymous;
            }
        });

        for kind in [TokenKind::Access, TokenKind::Refresh] {
            if let Err(e) = self.tokens.set(kind, None, Duration::ZERO) {
                warn!(key = kind.key(), error = ?e, "Failed to remove persisted token");
            }
        }
    }

    fn notify_session_end(&self) {
        let live: Vec<Arc<dyn SessionListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.on_session_end();
        }
    }

    /// Route guard: wait for resolution, then allow or redirect to login
    pub async fn guard(&self) -> Navigation {
        self.init().await;
        if self.is_authenticated() {
            Navigation::Proceed
        } else {
            Navigation::Redirect(LOGIN_ROUTE)
        }
    }

    // ========================================================================
    // Authenticated requests
    // ========================================================================

    /// Send with the current bearer token. A 401 triggers one refresh and a
    /// single replay; a second rejection or failed refresh logs out.
    pub async fn send_authorized(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let token = self.access_token().ok_or(ApiError::NotAuthenticated)?;

        match self.dispatch(&request, &token).await {
            Err(e) if e.is_unauthorized() => {
                debug!(method = %request.method, path = %request.path, "Access token rejected, refreshing");
            }
            other => return other,
        }

        if !self.refresh_after(&token).await {
            // No token left means a logout already ran while we waited
            if self.access_token().is_some() {
                self.logout();
            }
            return Err(ApiError::SessionExpired);
        }

        let token = self.access_token().ok_or(ApiError::SessionExpired)?;
        match self.dispatch(&request, &token).await {
            Err(e) if e.is_unauthorized() => {
                warn!(path = %request.path, "Request rejected after refresh, logging out");
                self.logout();
                Err(ApiError::SessionExpired)
            }
            other => other,
        }
    }

    /// `send_authorized` plus JSON decoding of the reply
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        self.send_authorized(request).await?.json()
    }

    async fn dispatch(&self, request: &ApiRequest, token: &str) -> ApiResult<ApiResponse> {
        let request = request.clone().bearer(token);
        self.http.send(&request).await?.into_result()
    }
}
