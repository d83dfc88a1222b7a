// ── Service context ──
//
// The process-wide services, constructed once and handed to consumers.
// Nothing in this crate is a global: tests build as many independent
// contexts as they like.

use std::sync::Arc;

use ledgerlink_api::{RealtimeConnector, StompConnector};
use tracing::info;

use crate::cache::RequestCache;
use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::loading::LoadingCoordinator;
use crate::monitor::SessionMonitor;
use crate::notification::{ChannelConfig, NotificationChannel, NotificationInbox};
use crate::observer::Subscription;
use crate::session::SessionStore;

pub struct Services {
    pub config: ClientConfig,
    pub session: Arc<SessionStore>,
    pub cache: RequestCache,
    pub loading: LoadingCoordinator,
    pub api: ApiClient,
    pub notifications: NotificationChannel,
    pub inbox: NotificationInbox,
    inbox_feed: Subscription,
}

impl Services {
    /// In-memory session, wall clock, STOMP notifications at
    /// `config.realtime_url`.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        let connector = Arc::new(StompConnector::new(config.realtime_url.clone()));
        Self::with_parts(config, Arc::new(SessionStore::in_memory()), connector)
    }

    pub fn with_parts(
        config: ClientConfig,
        session: Arc<SessionStore>,
        connector: Arc<dyn RealtimeConnector>,
    ) -> Result<Self, CoreError> {
        let cache = RequestCache::new();
        let loading = LoadingCoordinator::new();
        let api = ApiClient::new(&config, Arc::clone(&session), cache.clone(), loading.clone())?;
        let notifications = NotificationChannel::new(connector, ChannelConfig::from(&config));
        let inbox = NotificationInbox::new();
        let inbox_feed = inbox.attach(&notifications);

        Ok(Self {
            config,
            session,
            cache,
            loading,
            api,
            notifications,
            inbox,
            inbox_feed,
        })
    }

    /// Connect the notification channel for the current session.
    pub async fn connect_notifications(&self) -> Result<(), CoreError> {
        let session = self.session.get().ok_or_else(|| CoreError::AuthExpired {
            reason: "not signed in".into(),
        })?;
        self.notifications.connect_session(&session).await;
        Ok(())
    }

    pub fn start_monitor(&self) -> SessionMonitor {
        SessionMonitor::from_config(self.api.clone(), &self.config)
    }

    /// Log out and drop everything tied to the old identity.
    pub async fn sign_out(&self) {
        self.api.logout();
        self.notifications.disconnect().await;
        self.inbox.clear();
        info!("services reset after sign-out");
    }

    /// Stop feeding the inbox from the channel.
    pub fn detach_inbox(&self) {
        self.inbox_feed.unsubscribe();
    }
}
