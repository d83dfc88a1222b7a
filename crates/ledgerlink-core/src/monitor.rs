// ── Session monitor ──
//
// Background task that re-checks credential validity on a short interval
// and refreshes the denormalized profile on a longer one. Reads through
// `SessionStore` validate on their own; this only makes expiry visible
// (and the redirect signal fire) without waiting for the next request.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ApiClient;
use crate::config::ClientConfig;

/// Handle to the running monitor. Stop it with [`shutdown`](Self::shutdown).
pub struct SessionMonitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionMonitor {
    pub fn spawn(api: ApiClient, validity_interval: Duration, refresh_interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(api, validity_interval, refresh_interval, cancel.clone()));
        Self { cancel, task }
    }

    pub fn from_config(api: ApiClient, config: &ClientConfig) -> Self {
        Self::spawn(
            api,
            config.validity_check_interval,
            config.profile_refresh_interval,
        )
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn run(
    api: ApiClient,
    validity_interval: Duration,
    refresh_interval: Duration,
    cancel: CancellationToken,
) {
    let mut validity = tokio::time::interval(validity_interval);
    validity.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut refresh = tokio::time::interval(refresh_interval);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The profile was just fetched at sign-in.
    refresh.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = validity.tick() => {
                api.check_session();
            }
            _ = refresh.tick() => {
                if api.session().get().is_none() {
                    continue;
                }
                match api.refresh_profile().await {
                    Ok(_) => debug!("profile refreshed"),
                    Err(e) => warn!(error = %e, "profile refresh failed"),
                }
            }
        }
    }

    debug!("session monitor exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use ledgerlink_api::{RestClient, TransportConfig};
    use url::Url;

    use crate::cache::RequestCache;
    use crate::client::AuthSignal;
    use crate::loading::LoadingCoordinator;
    use crate::session::{Credential, MemoryStorage, Profile, Role, Session, SessionStore};
    use crate::token::ManualClock;
    use crate::token::test_tokens::token_expiring;

    #[tokio::test(start_paused = true)]
    async fn expiry_is_detected_on_the_next_tick() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let store = Arc::new(SessionStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(clock.clone()),
        ));
        store.set(Session::new(
            Credential {
                token: token_expiring(start + chrono::Duration::seconds(60)),
                email: "jo@bank.io".into(),
                role: Role::User,
            },
            Profile::default(),
        ));

        let rest = RestClient::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            &TransportConfig::default(),
        )
        .unwrap();
        let api = ApiClient::with_rest(
            rest,
            store.clone(),
            RequestCache::new(),
            LoadingCoordinator::new(),
            Duration::from_secs(30),
        );
        let mut signals = api.auth_signals();

        let monitor = SessionMonitor::spawn(api, Duration::from_secs(30), Duration::from_secs(3600));
        tokio::task::yield_now().await;
        assert!(store.get().is_some());

        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(signals.recv().await.unwrap(), AuthSignal::SessionExpired);
        assert!(store.get().is_none());

        monitor.shutdown().await;
    }
}
