//! Desktop notification delivery.
//!
//! Reminders are a best-effort amenity: delivery failures are logged by
//! [`Notifier`] and never reach a client.

use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::NotificationConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("desktop notification failed: {0}")]
    Desktop(String),
}

/// Something that can show a titled message to the user.
pub trait NotificationSink: Send + Sync {
    fn show(&self, title: &str, message: &str) -> Result<(), NotifyError>;

    /// Sink name for logging.
    fn name(&self) -> &str;
}

/// Native desktop notifications with the configured icon.
pub struct DesktopSink {
    icon_path: String,
}

impl DesktopSink {
    pub fn new(icon_path: impl Into<String>) -> Self {
        Self {
            icon_path: icon_path.into(),
        }
    }
}

impl NotificationSink for DesktopSink {
    fn show(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let mut notification = notify_rust::Notification::new();
        notification.summary(title).body(message).icon(&self.icon_path);
        run_blocking(move || {
            notification
                .show()
                .map(|_| ())
                .map_err(|e| NotifyError::Desktop(e.to_string()))
        })
    }

    fn name(&self) -> &str {
        "desktop"
    }
}

/// Run a blocking delivery. Inside a tokio runtime it goes to the blocking pool and
/// failures are logged there; outside one it runs inline and returns its result.
fn run_blocking<F>(deliver: F) -> Result<(), NotifyError>
where
    F: FnOnce() -> Result<(), NotifyError> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || {
                if let Err(e) = deliver() {
                    tracing::warn!(error = %e, "Failed to send notification");
                }
            });
            Ok(())
        }
        Err(_) => deliver(),
    }
}

/// Headless sink: notifications become log lines.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn show(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(title = %title, "Notification: {}", message);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Records every delivery in memory.
#[derive(Default)]
pub struct MemorySink {
    shown: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages shown so far, in delivery order.
    pub fn messages(&self) -> Vec<String> {
        self.deliveries().into_iter().map(|(_, m)| m).collect()
    }

    pub fn deliveries(&self) -> Vec<(String, String)> {
        match self.shown.lock() {
            Ok(shown) => shown.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for MemorySink {
    fn show(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        let mut shown = self.shown.lock().unwrap_or_else(|p| p.into_inner());
        shown.push((title.to_string(), message.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

pub fn create_sink(config: &NotificationConfig) -> Arc<dyn NotificationSink> {
    if config.enabled {
        Arc::new(DesktopSink::new(config.icon_path.clone()))
    } else {
        Arc::new(LogSink)
    }
}

/// A sink plus the title its messages are shown under.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    title: String,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, title: impl Into<String>) -> Self {
        Self {
            sink,
            title: title.into(),
        }
    }

    /// The same sink under a different title.
    pub fn with_title(&self, title: impl Into<String>) -> Self {
        Self {
            sink: self.sink.clone(),
            title: title.into(),
        }
    }

    /// Show `message`, logging instead of failing when delivery does not work.
    pub fn notify(&self, message: &str) {
        if let Err(e) = self.sink.show(&self.title, message) {
            tracing::warn!(sink = self.sink.name(), error = %e, "Failed to send notification");
        }
    }
}
