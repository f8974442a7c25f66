//! Push notifications: payload normalization and click handling.

mod dispatcher;
mod payload;

pub use dispatcher::{ClickOutcome, NotificationClick, NotificationDispatcher};
pub use payload::{NotificationDefaults, NotificationPayload};
