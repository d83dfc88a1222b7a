// ── ApiClient ──
//
// Every outbound call goes through here. Cacheable reads are served from
// (or de-duplicated by) the request cache; everything else hits the
// network under a loading guard, with a bearer from the session store and
// a fresh idempotency key on mutating methods. Auth failures are handled
// centrally: the session is cleared and a redirect signal goes out before
// the caller ever sees the error.

use std::sync::Arc;
use std::time::Duration;

use ledgerlink_api::{
    HeaderMap, HeaderName, HeaderValue, Method, RestClient, RestRequest, RestResponse, TlsMode,
    TransportConfig,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, RequestCache};
use crate::config::{ClientConfig, TlsVerification};
use crate::error::CoreError;
use crate::loading::LoadingCoordinator;
use crate::session::{Credential, Profile, Role, Session, SessionStatus, SessionStore};
use crate::token;

const LOGIN_PATH: &str = "/api/auth/login";
const VERIFY_OTP_PATH: &str = "/api/auth/verify-otp";
const PROFILE_PATH: &str = "/api/user/profile";

// ── Signals ──────────────────────────────────────────────────────────

/// Session lifecycle events for whoever drives navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSignal {
    /// The credential expired or was refused. Redirect to sign-in.
    SessionExpired,
    /// Explicit logout.
    SignedOut,
}

/// Result of the first authentication step.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// The server wants a one-time passcode. No session exists yet.
    OtpRequired { email: String, message: Option<String> },
    /// Signed in without a second step.
    Authenticated(Arc<Session>),
}

/// Body of a successful sign-in: credential plus profile fields.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
    #[serde(default)]
    email: Option<String>,
    role: Role,
    #[serde(flatten)]
    profile: Profile,
}

// ── RequestOptions ───────────────────────────────────────────────────

/// Per-call settings for [`ApiClient::request`].
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Explicit bearer; falls back to the session credential.
    pub token: Option<SecretString>,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Serve from / store into the request cache. Ignored for mutations.
    pub cacheable: bool,
    /// Overrides the configured default TTL.
    pub ttl: Option<Duration>,
    pub loading_message: Option<String>,
    /// Cache prefixes evicted after a successful mutation.
    pub invalidates: Vec<String>,
    /// Reuse a key when retrying the same logical submission.
    pub idempotency_key: Option<String>,
    /// Send without a credential (sign-in endpoints).
    pub anonymous: bool,
    /// Leave the global loading state alone (background refreshes).
    pub silent: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            token: None,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            cacheable: false,
            ttl: None,
            loading_message: None,
            invalidates: Vec::new(),
            idempotency_key: None,
            anonymous: false,
            silent: false,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    /// A cacheable GET with the default TTL.
    pub fn cached() -> Self {
        Self {
            cacheable: true,
            ..Self::default()
        }
    }

    pub fn post(body: Value) -> Self {
        Self::mutation(Method::POST, Some(body))
    }

    pub fn put(body: Option<Value>) -> Self {
        Self::mutation(Method::PUT, body)
    }

    pub fn delete() -> Self {
        Self::mutation(Method::DELETE, None)
    }

    pub fn mutation(method: Method, body: Option<Value>) -> Self {
        Self {
            method,
            body,
            ..Self::default()
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.cacheable = true;
        self.ttl = Some(ttl);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.loading_message = Some(message.into());
        self
    }

    pub fn invalidating<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invalidates.extend(prefixes.into_iter().map(Into::into));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    fn is_mutating(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

// ── ApiClient ────────────────────────────────────────────────────────

struct ApiInner {
    rest: RestClient,
    session: Arc<SessionStore>,
    cache: RequestCache,
    loading: LoadingCoordinator,
    default_ttl: Duration,
    signals: broadcast::Sender<AuthSignal>,
}

/// Orchestrates cache, loading state, credentials, and error
/// classification for every request. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiInner>,
}

impl ApiClient {
    /// Build the HTTP transport described by `config` and wire it to the
    /// shared services.
    pub fn new(
        config: &ClientConfig,
        session: Arc<SessionStore>,
        cache: RequestCache,
        loading: LoadingCoordinator,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: tls_to_transport(&config.tls),
            timeout: config.timeout,
        };
        let rest = RestClient::new(config.base_url.clone(), &transport)?;
        Ok(Self::with_rest(rest, session, cache, loading, config.cache_ttl))
    }

    /// Wire an existing `RestClient` (tests, custom transports).
    pub fn with_rest(
        rest: RestClient,
        session: Arc<SessionStore>,
        cache: RequestCache,
        loading: LoadingCoordinator,
        default_ttl: Duration,
    ) -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(ApiInner {
                rest,
                session,
                cache,
                loading,
                default_ttl,
                signals,
            }),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    pub fn cache(&self) -> &RequestCache {
        &self.inner.cache
    }

    pub fn loading(&self) -> &LoadingCoordinator {
        &self.inner.loading
    }

    /// Redirect-to-login and sign-out notifications.
    pub fn auth_signals(&self) -> broadcast::Receiver<AuthSignal> {
        self.inner.signals.subscribe()
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Issue a request and decode the response body into `T`.
    ///
    /// On a cacheable read the body is checked against `T` before it is
    /// stored, so a response of the wrong shape is never cached.
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<T, CoreError> {
        let value = self
            .fetch(path, opts, Some(check_shape::<T> as ShapeCheck))
            .await?;
        T::deserialize(&*value).map_err(CoreError::malformed)
    }

    /// Issue a request and return the raw JSON body.
    pub async fn request_value(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<Arc<Value>, CoreError> {
        self.fetch(path, opts, None).await
    }

    async fn fetch(
        &self,
        path: &str,
        mut opts: RequestOptions,
        check: Option<ShapeCheck>,
    ) -> Result<Arc<Value>, CoreError> {
        let bearer = self.resolve_bearer(&opts)?;

        if opts.cacheable && !opts.is_mutating() {
            let key = CacheKey::new(&opts.method, path, &opts.query, opts.body.as_ref());
            let ttl = opts.ttl.unwrap_or(self.inner.default_ttl);
            let this = self.clone();
            let owned_path = path.to_owned();
            return self
                .inner
                .cache
                .fetch_or_join(&key, ttl, async move {
                    let body = this.dispatch(&owned_path, opts, bearer).await?.body;
                    if let Some(check) = check {
                        check(&body)?;
                    }
                    Ok(body)
                })
                .await;
        }

        let invalidates = std::mem::take(&mut opts.invalidates);
        let response = self.dispatch(path, opts, bearer).await?;
        for prefix in &invalidates {
            self.inner.cache.invalidate_prefix(prefix);
        }
        Ok(Arc::new(response.body))
    }

    /// One network round trip under a loading guard.
    async fn dispatch(
        &self,
        path: &str,
        opts: RequestOptions,
        bearer: Option<SecretString>,
    ) -> Result<RestResponse, CoreError> {
        let _loading = (!opts.silent).then(|| {
            self.inner
                .loading
                .acquire(opts.loading_message.as_deref())
        });
        let mutating = opts.is_mutating();
        let anonymous = opts.anonymous;

        let mut request = RestRequest::new(opts.method, path)
            .query(opts.query)
            .headers(opts.headers);
        if let Some(body) = opts.body {
            request = request.body(body);
        }
        if let Some(token) = bearer {
            request = request.bearer(token);
        }
        if mutating {
            let key = opts
                .idempotency_key
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            request = request.idempotency_key(key);
        }

        match self.inner.rest.send(request).await {
            Ok(response) => Ok(response),
            Err(ledgerlink_api::Error::Unauthorized { status, message }) if anonymous => {
                // Bad credentials on a sign-in endpoint, not a lost session.
                Err(CoreError::ValidationRejected { status, message })
            }
            Err(e) if e.is_auth_failure() => {
                let err = CoreError::from(e);
                self.expire_session(&err.to_string());
                Err(err)
            }
            Err(e) => {
                debug!(path, error = %e, "request failed");
                Err(e.into())
            }
        }
    }

    fn resolve_bearer(&self, opts: &RequestOptions) -> Result<Option<SecretString>, CoreError> {
        if let Some(token) = &opts.token {
            let now = self.inner.session.clock().now();
            if token::is_valid_at(token.expose_secret(), now) {
                return Ok(Some(token.clone()));
            }
            return Err(self.auth_expired("credential expired"));
        }
        if opts.anonymous {
            return Ok(None);
        }

        match self.inner.session.status() {
            SessionStatus::Active(session) => Ok(Some(SecretString::from(
                session.credential.token.clone(),
            ))),
            SessionStatus::Expired => Err(self.auth_expired("credential expired")),
            // Nothing was lost, so there is nobody to redirect.
            SessionStatus::Absent => Err(CoreError::AuthExpired {
                reason: "not signed in".into(),
            }),
        }
    }

    fn auth_expired(&self, reason: &str) -> CoreError {
        self.expire_session(reason);
        CoreError::AuthExpired {
            reason: reason.to_owned(),
        }
    }

    fn expire_session(&self, reason: &str) {
        warn!(reason, "session invalidated");
        self.inner.session.clear();
        self.inner.cache.clear();
        let _ = self.inner.signals.send(AuthSignal::SessionExpired);
    }

    // ── Authentication ───────────────────────────────────────────────

    /// First sign-in step. A `202` means a passcode was sent; no session is
    /// created until [`verify_otp`](Self::verify_otp) succeeds.
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, CoreError> {
        let opts = RequestOptions::post(json!({
            "email": email,
            "password": password.expose_secret(),
        }))
        .anonymous()
        .message("Signing in...");

        let response = self.dispatch(LOGIN_PATH, opts, None).await?;
        if response.is_accepted() {
            info!(email, "one-time passcode required");
            return Ok(LoginOutcome::OtpRequired {
                email: email.to_owned(),
                message: response
                    .body
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            });
        }

        self.establish(response.body, email).map(LoginOutcome::Authenticated)
    }

    /// Second sign-in step.
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<Arc<Session>, CoreError> {
        let opts = RequestOptions::post(json!({ "email": email, "otp": otp }))
            .anonymous()
            .message("Verifying code...");
        let response = self.dispatch(VERIFY_OTP_PATH, opts, None).await?;
        self.establish(response.body, email)
    }

    fn establish(&self, body: Value, email: &str) -> Result<Arc<Session>, CoreError> {
        let auth: AuthResponse = serde_json::from_value(body).map_err(CoreError::malformed)?;

        let now = self.inner.session.clock().now();
        if !token::is_valid_at(&auth.token, now) {
            return Err(CoreError::AuthExpired {
                reason: "server issued an expired credential".into(),
            });
        }

        let session = Session::new(
            Credential {
                token: auth.token,
                email: auth.email.unwrap_or_else(|| email.to_owned()),
                role: auth.role,
            },
            auth.profile,
        );
        info!(email = %session.credential.email, role = %session.credential.role, "signed in");
        self.inner.session.set(session.clone());
        Ok(Arc::new(session))
    }

    /// Forget the session and everything cached under it.
    pub fn logout(&self) {
        self.inner.session.clear();
        self.inner.cache.clear();
        let _ = self.inner.signals.send(AuthSignal::SignedOut);
        info!("signed out");
    }

    /// Re-fetch the profile and merge it into the current session. Runs
    /// without touching the loading state.
    pub async fn refresh_profile(&self) -> Result<Arc<Session>, CoreError> {
        let profile: Profile = self
            .request(PROFILE_PATH, RequestOptions::get().silent())
            .await?;
        self.inner
            .session
            .update_profile(profile)
            .ok_or_else(|| self.auth_expired("session ended during profile refresh"))
    }

    /// Re-evaluate the held credential. Emits `SessionExpired` when a
    /// session existed but is no longer usable.
    pub fn check_session(&self) -> Option<Arc<Session>> {
        match self.inner.session.status() {
            SessionStatus::Active(session) => Some(session),
            SessionStatus::Expired => {
                let _ = self.inner.signals.send(AuthSignal::SessionExpired);
                info!("session expired");
                None
            }
            SessionStatus::Absent => None,
        }
    }
}

type ShapeCheck = fn(&Value) -> Result<(), CoreError>;

fn check_shape<T: DeserializeOwned>(value: &Value) -> Result<(), CoreError> {
    T::deserialize(value).map(drop).map_err(CoreError::malformed)
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_safe_methods_are_non_mutating() {
        assert!(!RequestOptions::get().is_mutating());
        assert!(RequestOptions::post(json!({})).is_mutating());
        assert!(RequestOptions::put(None).is_mutating());
        assert!(RequestOptions::delete().is_mutating());
    }

    #[test]
    fn ttl_implies_cacheable() {
        let opts = RequestOptions::get().ttl(Duration::from_secs(5));
        assert!(opts.cacheable);
        assert_eq!(opts.ttl, Some(Duration::from_secs(5)));
    }

    #[test]
    fn auth_response_splits_credential_from_profile() {
        let auth: AuthResponse = serde_json::from_value(json!({
            "token": "t",
            "role": "ADMIN",
            "name": "Ana",
            "accountNumber": "ACC9",
            "branch": "North",
        }))
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(auth.role, Role::Admin);
        assert!(auth.email.is_none());
        assert_eq!(auth.profile.account_number.as_deref(), Some("ACC9"));
        assert_eq!(auth.profile.extra.get("branch"), Some(&json!("North")));
        assert!(!auth.profile.extra.contains_key("token"));
    }
}
