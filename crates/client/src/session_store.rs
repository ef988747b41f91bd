//! Auth/session store.
//!
//! Owns the one live [`Session`] of the client process:
//! `Anonymous -> Authenticated -> (Refreshing) -> Authenticated | Anonymous`.
//!
//! The store is an explicit object handed to whoever needs it; readers get an
//! `Arc<Session>` snapshot and never observe a partially updated session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use tillwise_auth::{
    PermissionRequirement, PermissionSet, PermissionState, Session, SessionUser, TokenSet, authorize,
    refresh_delay, resolve, visible,
};
use tillwise_core::validate::require_non_empty;
use tillwise_core::{ClientError, ClientResult, Validate, ValidationError};

use crate::http::{ApiClient, ApiRequest, LOGIN_PATH, LOGOUT_PATH, RefreshedTokens, SessionListener};
use crate::storage::SessionStorage;

pub const ME_PATH: &str = "/auth/me";
pub const MY_PERMISSIONS_PATH: &str = "/permissions/mine";

fn user_permissions_path(user: &SessionUser) -> String {
    format!("/permissions/users/{}", user.id)
}

/// Username/password pair for `/auth/login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Validate for Credentials {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("username", &self.username)?;
        if self.password.is_empty() {
            return Err(ValidationError::new("password", "password is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(flatten)]
    tokens: TokenSet,
    #[serde(default)]
    user: Option<SessionUser>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
}

/// Permission endpoints answer either with a bare list or with
/// `{ "permissions": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PermissionPayload {
    List(Vec<String>),
    Wrapped { permissions: Vec<String> },
}

impl PermissionPayload {
    fn into_set(self) -> PermissionSet {
        match self {
            PermissionPayload::List(codes) | PermissionPayload::Wrapped { permissions: codes } => {
                codes.into_iter().collect()
            }
        }
    }
}

/// Observable authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
    Refreshing,
}

struct StoreInner {
    me: Weak<StoreInner>,
    client: ApiClient,
    storage: Arc<dyn SessionStorage>,
    session: RwLock<Option<Arc<Session>>>,
    permissions_loading: AtomicBool,
    timer_generation: AtomicU64,
    refresh_timer: Mutex<Option<(u64, JoinHandle<()>)>>,
}

/// Injectable session store. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl core::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .field("user", &self.current().map(|s| s.user.username.clone()))
            .finish()
    }
}

impl SessionStore {
    /// Create the store and register it with `client` for refresh signals.
    pub fn new(client: ApiClient, storage: Arc<dyn SessionStorage>) -> Self {
        let inner = Arc::new_cyclic(|me| StoreInner {
            me: me.clone(),
            client,
            storage,
            session: RwLock::new(None),
            permissions_loading: AtomicBool::new(false),
            timer_generation: AtomicU64::new(0),
            refresh_timer: Mutex::new(None),
        });

        let as_listener: Arc<dyn SessionListener> = inner.clone();
        inner.client.set_listener(Arc::downgrade(&as_listener));

        Self { inner }
    }

    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// Rehydrate the persisted session at startup.
    ///
    /// An expired session is kept if it still carries a refresh token, so the
    /// proactive timer (or the reactive 401 path) may renew it.
    pub fn init(&self) -> Option<Arc<Session>> {
        let stored = self.inner.storage.load()?;

        if !stored.is_authenticated_at(Utc::now()) && stored.refresh_token().is_none() {
            tracing::info!("stored session expired and cannot be refreshed; discarding");
            self.inner.storage.clear();
            return None;
        }

        let session = Arc::new(stored);
        self.inner.install(session.clone());
        tracing::info!(user = %session.user.username, "session restored");
        Some(session)
    }

    /// Authenticate and start a new session.
    ///
    /// On failure any prior session is left untouched.
    pub async fn login(&self, credentials: &Credentials) -> ClientResult<Arc<Session>> {
        credentials.validate()?;

        let issued_at = Utc::now();
        let resp: LoginResponse = self.inner.client.post(LOGIN_PATH, credentials).await?;
        let access = resp.tokens.access_token.clone();

        let user = match resp.user {
            Some(user) => user,
            None => self.inner.client.send_as(ApiRequest::get(ME_PATH), &access).await?,
        };

        let permissions = match resp.permissions {
            Some(codes) => codes.into_iter().collect(),
            None => match self.inner.fetch_permissions(&user, &access).await {
                Ok(permissions) => permissions,
                Err(e) => {
                    tracing::warn!(error = %e, "permission lookup failed; continuing with no permissions");
                    PermissionSet::new()
                }
            },
        };

        let session = Arc::new(Session::new(user, permissions, resp.tokens, issued_at));
        self.inner.install(session.clone());
        tracing::info!(
            user = %session.user.username,
            permissions = session.permissions.len(),
            expires_at = %session.access_token_expires_at,
            "logged in"
        );
        Ok(session)
    }

    /// Renew the access token now.
    ///
    /// A failed exchange clears the session.
    pub async fn refresh(&self) -> ClientResult<Arc<Session>> {
        let stale = self.current().map(|s| s.access_token().to_string());
        if stale.is_none() {
            return Err(ClientError::NotAuthenticated);
        }
        self.inner.client.refresh(stale.as_deref()).await?;
        self.current().ok_or(ClientError::NotAuthenticated)
    }

    /// Re-read the held permission set from the backend.
    ///
    /// On failure the held set is kept and the error is returned.
    pub async fn reload_permissions(&self) -> ClientResult<Arc<Session>> {
        let current = self.current().ok_or(ClientError::NotAuthenticated)?;

        self.inner.permissions_loading.store(true, Ordering::SeqCst);
        let fetched = self.inner.fetch_permissions(&current.user, current.access_token()).await;
        self.inner.permissions_loading.store(false, Ordering::SeqCst);
        let permissions = fetched?;

        // The session may have been refreshed meanwhile; patch the latest one.
        let latest = self.current().ok_or(ClientError::NotAuthenticated)?;
        let next = Arc::new(latest.with_permissions(permissions));
        self.inner.replace(Some(next.clone()));
        self.inner.storage.save(&next);
        Ok(next)
    }

    /// End the session.
    ///
    /// Server-side invalidation is best effort; local state is always cleared.
    /// Calling this when already signed out is a no-op.
    pub async fn logout(&self) {
        let access = self
            .current()
            .map(|s| s.access_token().to_string())
            .or_else(|| self.inner.client.tokens().access());
        let refresh = self.inner.client.tokens().refresh();

        if let Some(access) = access {
            let body = serde_json::json!({ "refresh_token": refresh });
            let result = match ApiRequest::new(Method::POST, LOGOUT_PATH).json(&body) {
                Ok(req) => self.inner.client.send_as_optional::<Value>(req, &access).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "server-side logout failed; clearing local session anyway");
            }
        }

        self.inner.clear_local();
        tracing::info!("logged out");
    }

    /// Arm the proactive refresh for `session`, replacing any armed timer.
    pub fn schedule_refresh(&self, session: &Session) {
        self.inner.schedule_refresh(session);
    }

    /// `true` while a proactive refresh is armed.
    pub fn refresh_scheduled(&self) -> bool {
        self.inner.has_armed_timer()
    }

    /// Stop the refresh timer. The session itself is kept.
    pub fn shutdown(&self) {
        self.inner.cancel_timer();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some_and(|s| s.is_authenticated_at(Utc::now()))
    }

    pub fn state(&self) -> AuthState {
        if self.inner.client.is_refreshing() {
            AuthState::Refreshing
        } else if self.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        }
    }

    /// `true` when the session holds every code (or `"all"`).
    pub fn has_permission<'a, I>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.current().is_some_and(|s| s.has_permission(codes))
    }

    pub fn permission_state(&self) -> PermissionState {
        if self.inner.permissions_loading.load(Ordering::SeqCst) {
            return PermissionState::Loading;
        }
        PermissionState::Loaded(self.current().map(|s| s.permissions.clone()).unwrap_or_default())
    }

    /// Strict check for imperative logic (e.g. disabling a button).
    pub fn can(&self, requirement: &PermissionRequirement) -> bool {
        self.current().is_some_and(|s| resolve(requirement, &s.permissions))
    }

    /// Strict check for mutating operations, as an error.
    pub fn require(&self, requirement: &PermissionRequirement) -> ClientResult<()> {
        let session = self.current().ok_or(ClientError::NotAuthenticated)?;
        authorize(&session.permissions, requirement)?;
        Ok(())
    }

    /// Navigation visibility, honouring the configured fallback policy.
    pub fn can_view(&self, requirement: &PermissionRequirement) -> bool {
        visible(
            requirement,
            &self.permission_state(),
            self.inner.client.config().permission_fallback,
        )
    }
}

impl StoreInner {
    fn current(&self) -> Option<Arc<Session>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn replace(&self, next: Option<Arc<Session>>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Make `session` the live session: tokens, memory, storage, timer.
    fn install(&self, session: Arc<Session>) {
        self.client.clear_tokens();
        self.client
            .set_tokens(session.access_token().to_string(), session.tokens.refresh_token.clone());
        self.replace(Some(session.clone()));
        self.storage.save(&session);
        self.schedule_refresh(&session);
    }

    fn clear_local(&self) {
        self.cancel_timer();
        self.client.clear_tokens();
        self.replace(None);
        self.storage.clear();
    }

    async fn fetch_permissions(&self, user: &SessionUser, access: &str) -> ClientResult<PermissionSet> {
        let by_user = self
            .client
            .send_as::<PermissionPayload>(ApiRequest::get(user_permissions_path(user)), access)
            .await;

        let payload = match by_user {
            Ok(payload) => Ok(payload),
            Err(e) => {
                tracing::debug!(error = %e, "per-user permission lookup failed, trying /permissions/mine");
                self.client
                    .send_as::<PermissionPayload>(ApiRequest::get(MY_PERMISSIONS_PATH), access)
                    .await
            }
        };

        payload.map(PermissionPayload::into_set)
    }

    /// Arm a one-shot timer that renews the access token before it expires.
    ///
    /// Replaces any timer armed earlier. A failed proactive refresh leaves the
    /// session to expire; the reactive 401 path takes over from there.
    fn schedule_refresh(&self, session: &Session) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime; proactive token refresh disabled");
            return;
        };
        if session.refresh_token().is_none() {
            tracing::debug!("session has no refresh token; not scheduling refresh");
            self.cancel_timer();
            return;
        }

        let delay = refresh_delay(
            session.access_token_expires_at,
            Utc::now(),
            self.client.config().refresh_margin,
        );
        let generation = self.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stale = session.access_token().to_string();
        let me = self.me.clone();

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = me.upgrade() else {
                return;
            };
            inner.release_timer(generation);
            tracing::debug!("proactive token refresh firing");
            if let Err(e) = inner.client.try_refresh(Some(&stale)).await {
                tracing::warn!(error = %e, "proactive token refresh failed; session will expire naturally");
            }
        });

        tracing::debug!(delay_secs = delay.as_secs(), "token refresh scheduled");
        let previous = self
            .refresh_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((generation, handle));
        if let Some((_, old)) = previous {
            old.abort();
        }
    }

    /// Forget the handle of a timer that has fired, without aborting it.
    fn release_timer(&self, generation: u64) {
        let mut slot = self.refresh_timer.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
            slot.take();
        }
    }

    fn cancel_timer(&self) {
        if let Some((_, handle)) = self.refresh_timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    fn has_armed_timer(&self) -> bool {
        self.refresh_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl SessionListener for StoreInner {
    fn tokens_refreshed(&self, refreshed: &RefreshedTokens) {
        let Some(current) = self.current() else {
            tracing::debug!("tokens refreshed without a live session; ignoring");
            return;
        };

        let mut next = current.with_tokens(refreshed.tokens.clone(), refreshed.issued_at);
        if let Some(codes) = &refreshed.permissions {
            next = next.with_permissions(codes.iter().cloned().collect());
        }

        let next = Arc::new(next);
        self.replace(Some(next.clone()));
        self.storage.save(&next);
        self.schedule_refresh(&next);
    }

    fn session_expired(&self) {
        tracing::info!("session expired; clearing stored session");
        self.cancel_timer();
        self.replace(None);
        self.storage.clear();
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::MemorySessionStorage;
    use tillwise_core::RecordId;

    fn store_with(storage: Arc<MemorySessionStorage>) -> SessionStore {
        let client = ApiClient::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
        SessionStore::new(client, storage)
    }

    fn session(expires_in: i64, refresh: Option<&str>, perms: &[&'static str]) -> Session {
        Session::new(
            SessionUser {
                id: RecordId::new(3),
                username: "manager".into(),
                full_name: None,
                email: None,
                role: None,
                is_active: true,
            },
            perms.iter().copied().collect(),
            TokenSet {
                access_token: "access-1".into(),
                refresh_token: refresh.map(Into::into),
                token_type: "bearer".into(),
                expires_in,
            },
            Utc::now(),
        )
    }

    #[test]
    fn credentials_are_validated_locally() {
        assert!(Credentials::new("", "pw").validate().is_err());
        assert!(Credentials::new("bob", "").validate().is_err());
        assert!(Credentials::new("bob", "pw").validate().is_ok());
        assert!(!format!("{:?}", Credentials::new("bob", "hunter2")).contains("hunter2"));
    }

    #[test]
    fn permission_payload_accepts_both_shapes() {
        let list: PermissionPayload = serde_json::from_str(r#"["sales:view"]"#).unwrap();
        assert!(list.into_set().contains("sales:view"));
        let wrapped: PermissionPayload = serde_json::from_str(r#"{"permissions":["all"]}"#).unwrap();
        assert!(wrapped.into_set().grants_all());
    }

    #[tokio::test]
    async fn init_restores_and_schedules_refresh() {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.save(&session(900, Some("refresh-1"), &["sales:view"]));

        let store = store_with(storage.clone());
        let restored = store.init().unwrap();
        assert_eq!(restored.user.username, "manager");
        assert_eq!(store.state(), AuthState::Authenticated);
        assert_eq!(store.client().tokens().access().as_deref(), Some("access-1"));
        assert!(store.refresh_scheduled());
        assert!(store.has_permission(["sales:view"]));
        assert!(!store.has_permission(["sales:refund"]));

        store.shutdown();
        assert!(!store.refresh_scheduled());
    }

    #[tokio::test]
    async fn expired_session_without_refresh_token_is_discarded() {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.save(&session(-10, None, &[]));

        let store = store_with(storage.clone());
        assert!(store.init().is_none());
        assert!(storage.raw().is_none());
        assert_eq!(store.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn expired_session_with_refresh_token_is_kept_but_anonymous() {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.save(&session(-10, Some("refresh-1"), &[]));

        let store = store_with(storage);
        assert!(store.init().is_some());
        assert_eq!(store.state(), AuthState::Anonymous);
        assert!(store.refresh_scheduled());
        store.shutdown();
    }

    #[tokio::test]
    async fn session_expired_signal_clears_everything() {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.save(&session(900, Some("refresh-1"), &["all"]));
        let store = store_with(storage.clone());
        store.init();

        store.inner.session_expired();
        assert!(store.current().is_none());
        assert!(storage.raw().is_none());
        assert!(!store.refresh_scheduled());
    }

    #[tokio::test]
    async fn refreshed_tokens_replace_the_session_wholesale() {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.save(&session(900, Some("refresh-1"), &["sales:view"]));
        let store = store_with(storage.clone());
        let before = store.init().unwrap();

        store.inner.tokens_refreshed(&RefreshedTokens {
            tokens: TokenSet {
                access_token: "access-2".into(),
                refresh_token: None,
                token_type: "bearer".into(),
                expires_in: 1800,
            },
            permissions: Some(vec!["all".into()]),
            issued_at: Utc::now(),
        });

        let after = store.current().unwrap();
        assert_eq!(after.access_token(), "access-2");
        assert_eq!(after.refresh_token(), Some("refresh-1"));
        assert!(after.permissions.grants_all());
        // The earlier snapshot is unchanged.
        assert_eq!(before.access_token(), "access-1");
        assert_eq!(storage.load().unwrap().access_token(), "access-2");
        store.shutdown();
    }

    #[tokio::test]
    async fn permission_queries_follow_policy() {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.save(&session(900, Some("r"), &[]));
        let store = store_with(storage);
        store.init();

        let req = PermissionRequirement::one("backups:view");
        // Empty held set: navigation falls back (permissive default), mutations do not.
        assert!(store.can_view(&req));
        assert!(!store.can(&req));
        assert_eq!(
            store.require(&req).unwrap_err(),
            ClientError::Forbidden {
                missing: "backups:view".into()
            }
        );

        store.inner.permissions_loading.store(true, Ordering::SeqCst);
        assert_eq!(store.permission_state(), PermissionState::Loading);
        store.shutdown();
    }

    #[tokio::test]
    async fn require_without_session_is_not_authenticated() {
        let store = store_with(Arc::new(MemorySessionStorage::new()));
        assert_eq!(
            store.require(&PermissionRequirement::none()).unwrap_err(),
            ClientError::NotAuthenticated
        );
    }
}
