//! `watch`: tail live notifications until Ctrl-C.

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use ledgerlink_core::{AuthSignal, ChannelState, Services};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::output;

pub async fn handle(services: &Services, format: OutputFormat) -> Result<(), CliError> {
    let color = output::should_color();
    let feed = services.notifications.add_listener(move |event| {
        output::print_output(&output::render_event(format, event, color));
    });

    let mut signals = services.api.auth_signals();
    let mut state = services.notifications.watch_state();
    let monitor = services.start_monitor();
    services.connect_notifications().await?;
    eprintln!("Watching notifications (Ctrl-C to stop)");

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),

            signal = signals.recv() => match signal {
                Ok(AuthSignal::SessionExpired) => break Err(CliError::AuthExpired {
                    reason: "session expired while watching".into(),
                }),
                Ok(AuthSignal::SignedOut) | Err(RecvError::Closed) => break Ok(()),
                Err(RecvError::Lagged(_)) => {}
            },

            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *state.borrow_and_update();
                info!(state = %current, "notification channel");
                if current == ChannelState::Disconnected {
                    break Err(CliError::Unavailable {
                        message: "notification channel gave up reconnecting".into(),
                    });
                }
            }
        }
    };

    debug!("stopping watch");
    feed.unsubscribe();
    monitor.shutdown().await;
    services.notifications.disconnect().await;
    result
}
