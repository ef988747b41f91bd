//! HTTP client wrapper over the backend REST API.
//!
//! Every call goes through [`ApiClient::send`], which:
//! - attaches `Authorization: Bearer <token>` when a token is held
//! - enforces the configured timeout
//! - unwraps the response envelope
//! - on a 401 (outside the auth endpoints) runs a single-flight token refresh
//!   and retries the request exactly once
//! - retries idempotent GETs on network failures with exponential backoff

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tillwise_auth::TokenSet;
use tillwise_core::{ApiError, ClientError, ClientResult, Envelope, ErrorBody};

use crate::config::ClientConfig;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Receives session lifecycle signals from the HTTP layer.
///
/// Implemented by the session store so a reactive refresh (or its failure)
/// updates the persisted session.
pub trait SessionListener: Send + Sync {
    /// A refresh exchange produced new tokens.
    fn tokens_refreshed(&self, refreshed: &RefreshedTokens);

    /// A refresh exchange failed; the session cannot be recovered.
    fn session_expired(&self);
}

/// Payload of a successful `/auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(flatten)]
    pub tokens: TokenSet,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// Tokens from a completed refresh, stamped with the time they were issued.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub tokens: TokenSet,
    pub permissions: Option<Vec<String>>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Credentials {
    access: Option<String>,
    refresh: Option<String>,
    epoch: u64,
}

/// Shared access/refresh token state.
///
/// Written only by the session store and by the refresh path.
#[derive(Debug, Default)]
pub struct TokenHandle(RwLock<Credentials>);

impl TokenHandle {
    pub fn access(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).access.clone()
    }

    pub fn refresh(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).refresh.clone()
    }

    pub fn set(&self, access: String, refresh: Option<String>) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        guard.access = Some(access);
        if refresh.is_some() {
            guard.refresh = refresh;
        }
    }

    /// Counter bumped by every [`TokenHandle::clear`].
    pub fn epoch(&self) -> u64 {
        self.0.read().unwrap_or_else(PoisonError::into_inner).epoch
    }

    /// Store `access`/`refresh` only if no clear happened since `epoch` was read.
    pub fn set_if_epoch(&self, epoch: u64, access: String, refresh: Option<String>) -> bool {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if guard.epoch != epoch {
            return false;
        }
        guard.access = Some(access);
        if refresh.is_some() {
            guard.refresh = refresh;
        }
        true
    }

    pub fn clear(&self) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        let epoch = guard.epoch.wrapping_add(1);
        *guard = Credentials {
            epoch,
            ..Credentials::default()
        };
    }
}

/// A request to send through [`ApiClient::send`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ClientResult<Self> {
        let value = serde_json::to_value(body).map_err(|e| ClientError::Decode(format!("request body: {e}")))?;
        self.body = Some(value);
        Ok(self)
    }

    fn is_auth_endpoint(&self) -> bool {
        let path = self.path.split('?').next().unwrap_or_default().trim_end_matches('/');
        path.ends_with(LOGIN_PATH) || path.ends_with(REFRESH_PATH)
    }

    fn is_idempotent(&self) -> bool {
        self.method == Method::GET
    }
}

struct Inner {
    config: ClientConfig,
    http: reqwest::Client,
    tokens: TokenHandle,
    refresh_gate: tokio::sync::Mutex<()>,
    refreshing: AtomicBool,
    listener: RwLock<Option<Weak<dyn SessionListener>>>,
}

/// Cheap-to-clone handle over the backend API.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base_url", &self.inner.config.api_base_url)
            .field("authenticated", &self.inner.tokens.access().is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http,
                tokens: TokenHandle::default(),
                refresh_gate: tokio::sync::Mutex::new(()),
                refreshing: AtomicBool::new(false),
                listener: RwLock::new(None),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &TokenHandle {
        &self.inner.tokens
    }

    pub fn set_tokens(&self, access: String, refresh: Option<String>) {
        self.inner.tokens.set(access, refresh);
    }

    pub fn clear_tokens(&self) {
        self.inner.tokens.clear();
    }

    /// `true` while a refresh exchange is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::SeqCst)
    }

    pub fn set_listener(&self, listener: Weak<dyn SessionListener>) {
        *self.inner.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn listener(&self) -> Option<Arc<dyn SessionListener>> {
        self.inner
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convenience verbs
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn get_query<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> ClientResult<T> {
        let mut req = ApiRequest::get(path);
        req.query.extend_from_slice(query);
        self.send(req).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiRequest::new(Method::POST, path).json(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiRequest::new(Method::PUT, path).json(body)?).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(ApiRequest::new(Method::PATCH, path).json(body)?).await
    }

    /// Any verb with an optional JSON body.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut req = ApiRequest::new(method, path);
        if let Some(body) = body {
            req = req.json(body)?;
        }
        self.send(req).await
    }

    /// DELETE; the envelope may omit `data`.
    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        self.send_optional::<Value>(ApiRequest::new(Method::DELETE, path)).await.map(|_| ())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Core
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a request and return the envelope's `data`.
    pub async fn send<T: DeserializeOwned>(&self, req: ApiRequest) -> ClientResult<T> {
        self.send_optional(req).await?.ok_or(ClientError::MissingData)
    }

    /// Send a request whose successful envelope may carry no `data`.
    pub async fn send_optional<T: DeserializeOwned>(&self, req: ApiRequest) -> ClientResult<Option<T>> {
        let attempts = if req.is_idempotent() {
            self.inner.config.retry_count + 1
        } else {
            1
        };
        let mut backoff = self.inner.config.retry_backoff;

        let mut attempt = 1;
        loop {
            match self.send_authorized(&req).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        method = %req.method,
                        path = %req.path,
                        attempt,
                        error = %e,
                        "transient request failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Send with an explicit access token, bypassing the shared credentials
    /// and the refresh path.
    pub async fn send_as<T: DeserializeOwned>(&self, req: ApiRequest, access_token: &str) -> ClientResult<T> {
        self.send_as_optional(req, access_token)
            .await?
            .ok_or(ClientError::MissingData)
    }

    pub async fn send_as_optional<T: DeserializeOwned>(
        &self,
        req: ApiRequest,
        access_token: &str,
    ) -> ClientResult<Option<T>> {
        self.send_once(&req, Some(access_token)).await
    }

    async fn send_authorized<T: DeserializeOwned>(&self, req: &ApiRequest) -> ClientResult<Option<T>> {
        let token = self.inner.tokens.access();
        let first = self.send_once(req, token.as_deref()).await;

        let unauthorized = matches!(&first, Err(ClientError::Api(e)) if e.status == 401);
        if !unauthorized || req.is_auth_endpoint() {
            return first;
        }

        tracing::debug!(path = %req.path, "401 received, refreshing credentials");
        if let Err(refresh_err) = self.refresh(token.as_deref()).await {
            tracing::debug!(error = %refresh_err, "refresh failed; surfacing original 401");
            return first;
        }

        // Exactly one retry; a second 401 is returned as-is.
        let token = self.inner.tokens.access();
        self.send_once(req, token.as_deref()).await
    }

    async fn send_once<T: DeserializeOwned>(&self, req: &ApiRequest, token: Option<&str>) -> ClientResult<Option<T>> {
        let url = self.inner.config.url(&req.path);
        let mut builder = self.inner.http.request(req.method.clone(), &url);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!(method = %req.method, path = %req.path, "sending request");

        let timeout = self.inner.config.request_timeout;
        let exchange = async {
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let bytes = resp.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        };

        let (status, bytes) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if e.is_timeout() => return Err(timeout_error(timeout)),
            Ok(Err(e)) => return Err(ClientError::Network(e.to_string())),
            Err(_) => return Err(timeout_error(timeout)),
        };

        decode_response(status, &bytes)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange the refresh token for new credentials (single-flight).
    ///
    /// `stale_access` is the access token the caller last used. If another
    /// caller already replaced it while this one waited, the exchange is
    /// skipped and the caller simply retries with the current token. Pass
    /// `None` to force an exchange.
    ///
    /// On failure the credentials are cleared and the listener is told the
    /// session expired.
    pub async fn refresh(&self, stale_access: Option<&str>) -> ClientResult<()> {
        self.refresh_with(stale_access, true).await
    }

    /// Like [`ApiClient::refresh`], but a failed exchange leaves the current
    /// credentials in place to expire naturally. Used by the proactive timer.
    pub async fn try_refresh(&self, stale_access: Option<&str>) -> ClientResult<()> {
        self.refresh_with(stale_access, false).await
    }

    async fn refresh_with(&self, stale_access: Option<&str>, clear_on_failure: bool) -> ClientResult<()> {
        let _gate = self.inner.refresh_gate.lock().await;

        if let Some(stale) = stale_access {
            match self.inner.tokens.access() {
                Some(current) if current != stale => return Ok(()),
                Some(_) => {}
                None => return Err(ClientError::NotAuthenticated),
            }
        }

        let Some(refresh_token) = self.inner.tokens.refresh() else {
            tracing::info!("no refresh token held; session cannot be renewed");
            if clear_on_failure {
                self.expire();
            }
            return Err(ClientError::NotAuthenticated);
        };

        let epoch = self.inner.tokens.epoch();
        self.inner.refreshing.store(true, Ordering::SeqCst);
        let issued_at = Utc::now();
        let result = self.exchange_refresh_token(&refresh_token).await;
        self.inner.refreshing.store(false, Ordering::SeqCst);

        match result {
            Ok(resp) => {
                let installed = self.inner.tokens.set_if_epoch(
                    epoch,
                    resp.tokens.access_token.clone(),
                    resp.tokens.refresh_token.clone(),
                );
                if !installed {
                    // Signed out (or in again) while the exchange was in flight.
                    tracing::info!("credentials cleared during refresh; discarding new tokens");
                    return Err(ClientError::NotAuthenticated);
                }
                tracing::info!(expires_in = resp.tokens.expires_in, "access token refreshed");
                if let Some(listener) = self.listener() {
                    listener.tokens_refreshed(&RefreshedTokens {
                        tokens: resp.tokens,
                        permissions: resp.permissions,
                        issued_at,
                    });
                }
                Ok(())
            }
            Err(e) if clear_on_failure => {
                tracing::warn!(error = %e, "token refresh failed; clearing session");
                self.expire();
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed; keeping current credentials");
                Err(e)
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> ClientResult<RefreshResponse> {
        let req = ApiRequest::new(Method::POST, REFRESH_PATH)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))?;
        self.send_once::<RefreshResponse>(&req, None)
            .await?
            .ok_or(ClientError::MissingData)
    }

    fn expire(&self) {
        self.inner.tokens.clear();
        if let Some(listener) = self.listener() {
            listener.session_expired();
        }
    }
}

fn timeout_error(timeout: std::time::Duration) -> ClientError {
    ClientError::Timeout {
        after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Turn a raw response into the envelope's data or a typed error.
pub(crate) fn decode_response<T: DeserializeOwned>(status: u16, body: &[u8]) -> ClientResult<Option<T>> {
    let success = (200..300).contains(&status);

    match serde_json::from_slice::<Envelope<T>>(body) {
        Ok(envelope) => envelope.into_optional(status),
        Err(_) if !success => Err(non_envelope_error(status, body).into()),
        Err(e) => Err(ClientError::Decode(e.to_string())),
    }
}

/// Best-effort error for bodies that are not an envelope (proxies, framework
/// defaults such as `{"detail": "..."}`, HTML error pages).
fn non_envelope_error(status: u16, body: &[u8]) -> ApiError {
    let value: Option<Value> = serde_json::from_slice(body).ok();

    let error_body = value.as_ref().and_then(|v| v.get("error")).and_then(|e| {
        serde_json::from_value::<ErrorBody>(e.clone()).ok()
    });
    let message = value.as_ref().and_then(|v| {
        v.get("detail")
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    ApiError::from_status(status, error_body, message)
}
