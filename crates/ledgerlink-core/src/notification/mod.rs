//! Realtime notifications: the reconnecting channel, the wire event, and a
//! local inbox that tracks seen/toast state.

pub mod channel;
pub mod event;
pub mod inbox;

pub use channel::{ChannelConfig, ChannelState, NotificationChannel};
pub use event::NotificationEvent;
pub use inbox::NotificationInbox;
