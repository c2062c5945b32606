//! Outbound notification boundary.
//!
//! Real email transport lives outside this system; the engine only needs a
//! `notify(address, subject, body)` capability. Delivery failures are logged
//! and recovered locally, never fatal to the caller: an offer counts as
//! issued once recorded, and the next periodic sweep is the only retry.

use std::sync::Mutex;

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Abstract notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Logs deliveries instead of sending them (dev/single-process default).
#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LoggingNotifier {
    fn notify(&self, address: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        info!(address, subject, "notification dispatched");
        Ok(())
    }
}

/// A delivered notification, as captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// Captures notifications for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, address: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Notification {
                address: address.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        }
        Ok(())
    }
}

/// Always fails delivery (tests for the fire-and-forget contract).
#[derive(Debug, Default)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, address: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        Err(NotifyError::DeliveryFailed(format!(
            "unreachable transport for {address}"
        )))
    }
}
