//! Change notification: observer lists and file watching.

pub mod subscriber;
#[cfg(feature = "file-watch")]
pub mod watcher;

pub use subscriber::{SubscriberRegistry, SubscriptionHandle};
#[cfg(feature = "file-watch")]
pub use watcher::ConfigWatcher;
