//! User-facing notifications raised by background work.
//!
//! Background tasks never print. They hand a [`Notification`] to a
//! [`Notifier`], which the orchestrating loop drains and displays. Repeated
//! failures of the same probe are reported once per session through
//! [`Notifier::notify_once`].

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Sink for notifications.
///
/// Implementors only provide [`emit`](Self::emit) and
/// [`first_time`](Self::first_time); deduplication is shared.
pub trait Notifier: Send + Sync {
    /// Deliver a notification unconditionally.
    fn emit(&self, notification: Notification);

    /// Record `key` and return true if it had not been seen before.
    fn first_time(&self, key: &str) -> bool;

    fn notify(&self, notification: Notification) {
        self.emit(notification);
    }

    /// Deliver a notification only the first time `key` is seen.
    fn notify_once(&self, key: &str, notification: Notification) {
        if self.first_time(key) {
            self.emit(notification);
        }
    }
}

/// Set of keys already reported.
#[derive(Debug, Default)]
pub struct SeenKeys(Mutex<HashSet<String>>);

impl SeenKeys {
    pub fn insert(&self, key: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string())
    }
}

/// Forwards notifications to the orchestrating loop over a channel.
#[derive(Debug)]
pub struct ChannelNotifier {
    tx: Sender<Notification>,
    seen: SeenKeys,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Notification>) -> Self {
        Self {
            tx,
            seen: SeenKeys::default(),
        }
    }
}

impl Notifier for ChannelNotifier {
    fn emit(&self, notification: Notification) {
        // Receiver gone means the loop is shutting down
        let _ = self.tx.send(notification);
    }

    fn first_time(&self, key: &str) -> bool {
        self.seen.insert(key)
    }
}

/// Writes notifications to the log. Used by one-shot CLI commands that have
/// no event loop to display them.
#[derive(Debug, Default)]
pub struct LogNotifier {
    seen: SeenKeys,
}

impl Notifier for LogNotifier {
    fn emit(&self, notification: Notification) {
        match notification.severity {
            Severity::Error => log::error!("{}", notification.message),
            Severity::Warning => log::warn!("{}", notification.message),
            Severity::Info => log::info!("{}", notification.message),
        }
    }

    fn first_time(&self, key: &str) -> bool {
        self.seen.insert(key)
    }
}
