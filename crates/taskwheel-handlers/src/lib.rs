//! Built-in job handlers.
//!
//! These are the handlers the daemon registers out of the box. An
//! embedding application registers its own [`JobHandler`] implementations
//! alongside (or instead of) these.

mod echo;
mod notify;

pub use echo::EchoHandler;
pub use notify::{LogNotifier, Notification, Notifier, NotifyHandler};
