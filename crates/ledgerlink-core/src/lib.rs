// ledgerlink-core: Session, cache, loading-state, and notification services for Ledgerlink clients

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod loading;
pub mod model;
pub mod monitor;
pub mod notification;
pub mod observer;
pub mod operations;
pub mod session;
pub mod token;

pub use cache::{CacheKey, RequestCache};
pub use client::{ApiClient, AuthSignal, LoginOutcome, RequestOptions};
pub use config::{ClientConfig, TlsVerification};
pub use context::Services;
pub use error::CoreError;
pub use guard::{RouteDecision, RouteGuard};
pub use loading::{LoadingCoordinator, LoadingGuard, LoadingState};
pub use monitor::SessionMonitor;
pub use notification::{
    ChannelConfig, ChannelState, NotificationChannel, NotificationEvent, NotificationInbox,
};
pub use observer::Subscription;
pub use session::{
    Credential, MemoryStorage, Profile, Role, Session, SessionStatus, SessionStorage, SessionStore,
};
pub use token::{Clock, ManualClock, SystemClock};
