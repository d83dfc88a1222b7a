// ── Notification channel ──
//
// One logical realtime connection per process, keyed by (identity,
// credential). A background task drives the Disconnected -> Connecting ->
// Connected state machine and retries on a fixed delay until `disconnect`
// cancels it. Inbound payloads are decoded and fanned out synchronously to
// listeners in registration order; undecodable payloads are dropped.

use std::sync::Arc;
use std::time::Duration;

use ledgerlink_api::{RealtimeConnector, RealtimeSession};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::event::NotificationEvent;
use crate::config::ClientConfig;
use crate::observer::{ObserverRegistry, Subscription};
use crate::session::Session;

/// Connection state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Reconnect policy.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Fixed wait between attempts. Default: 5s.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before the channel gives up and goes
    /// Disconnected. `None` retries until `disconnect`.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: None,
        }
    }
}

impl From<&ClientConfig> for ChannelConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay,
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }
}

// ── Shared state (owned by both the handle and the loop) ─────────────

struct ChannelShared {
    state: watch::Sender<ChannelState>,
    listeners: ObserverRegistry<NotificationEvent>,
}

impl ChannelShared {
    fn set_state(&self, state: ChannelState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn deliver(&self, payload: &str) {
        match NotificationEvent::decode(payload) {
            Ok(event) => self.listeners.notify(&event),
            Err(e) => warn!(error = %e, "dropping undecodable notification"),
        }
    }
}

struct ActiveConnection {
    identity: String,
    credential: SecretString,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveConnection {
    fn is_for(&self, identity: &str, credential: &SecretString) -> bool {
        self.identity == identity && self.credential.expose_secret() == credential.expose_secret()
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!(identity = %self.identity, "notification loop panicked");
            }
        }
    }
}

struct ChannelInner {
    connector: Arc<dyn RealtimeConnector>,
    config: ChannelConfig,
    shared: Arc<ChannelShared>,
    active: Mutex<Option<ActiveConnection>>,
}

// ── NotificationChannel ──────────────────────────────────────────────

/// Handle to the process-wide notification connection. Cheap to clone.
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<ChannelInner>,
}

impl NotificationChannel {
    pub fn new(connector: Arc<dyn RealtimeConnector>, config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                connector,
                config,
                shared: Arc::new(ChannelShared {
                    state,
                    listeners: ObserverRegistry::new(),
                }),
                active: Mutex::new(None),
            }),
        }
    }

    /// Start (or keep) the connection for `identity`.
    ///
    /// A no-op when a live connection for the same identity and credential
    /// already exists. Any other connection is torn down first.
    pub async fn connect(&self, identity: &str, credential: SecretString) {
        let mut active = self.inner.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.is_for(identity, &credential) && !current.task.is_finished() {
                debug!(identity, "notification channel already active");
                return;
            }
        }

        if let Some(previous) = active.take() {
            info!(identity = %previous.identity, "tearing down previous notification connection");
            previous.shutdown().await;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&self.inner.connector),
            self.inner.config.clone(),
            Arc::clone(&self.inner.shared),
            identity.to_owned(),
            credential.clone(),
            cancel.clone(),
        ));

        *active = Some(ActiveConnection {
            identity: identity.to_owned(),
            credential,
            cancel,
            task,
        });
    }

    /// [`connect`](Self::connect) with the identity and credential of `session`.
    pub async fn connect_session(&self, session: &Session) {
        self.connect(
            &session.credential.email,
            SecretString::from(session.credential.token.clone()),
        )
        .await;
    }

    /// Tear down the connection. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let previous = self.inner.active.lock().await.take();
        if let Some(previous) = previous {
            info!(identity = %previous.identity, "disconnecting notification channel");
            previous.shutdown().await;
        }
        self.inner.shared.set_state(ChannelState::Disconnected);
    }

    /// Register a listener. Listeners run synchronously, in registration
    /// order; a panicking listener is skipped without affecting the rest.
    pub fn add_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.inner.shared.listeners.subscribe(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.shared.listeners.len()
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.shared.state.subscribe()
    }

    /// Identity of the current connection, if any.
    pub async fn identity(&self) -> Option<String> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .map(|active| active.identity.clone())
    }
}

// ── Background loop ──────────────────────────────────────────────────

async fn run(
    connector: Arc<dyn RealtimeConnector>,
    config: ChannelConfig,
    shared: Arc<ChannelShared>,
    identity: String,
    credential: SecretString,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;

    loop {
        shared.set_state(ChannelState::Connecting);
        let (was_connected, result) =
            run_session(connector.as_ref(), &shared, &identity, &credential, &cancel).await;

        if cancel.is_cancelled() {
            break;
        }

        if was_connected {
            failures = 0;
        }
        failures += 1;

        match result {
            Ok(()) => info!(identity = %identity, "notification stream ended, reconnecting"),
            Err(e) => warn!(identity = %identity, error = %e, attempt = failures, "notification channel error"),
        }

        if let Some(max) = config.max_reconnect_attempts {
            if failures > max {
                error!(identity = %identity, max_attempts = max, "notification reconnect limit reached, giving up");
                break;
            }
        }

        shared.set_state(ChannelState::Connecting);
        debug!(
            delay_ms = u64::try_from(config.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "waiting before reconnect"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }

    shared.set_state(ChannelState::Disconnected);
    debug!(identity = %identity, "notification loop exiting");
}

/// One connection lifetime. Returns whether the handshake succeeded, and
/// how the session ended.
async fn run_session(
    connector: &dyn RealtimeConnector,
    shared: &ChannelShared,
    identity: &str,
    credential: &SecretString,
    cancel: &CancellationToken,
) -> (bool, Result<(), ledgerlink_api::Error>) {
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => return (false, Ok(())),
        result = connector.connect(identity, credential) => result,
    };
    let mut session: Box<dyn RealtimeSession> = match connected {
        Ok(session) => session,
        Err(e) => return (false, Err(e)),
    };

    shared.set_state(ChannelState::Connected);
    info!(identity, "notification channel connected");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                session.close().await;
                return (true, Ok(()));
            }
            payload = session.next_payload() => match payload {
                Some(Ok(text)) => shared.deliver(&text),
                Some(Err(e)) => return (true, Err(e)),
                None => return (true, Ok(())),
            }
        }
    }
}
