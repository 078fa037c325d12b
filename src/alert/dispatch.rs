//! Alert dispatch.
//!
//! Turns an `AlertEvent` into a `Notification` (title, body, priority,
//! sound, vibration) and hands it to a `NotificationSink`. Critical alerts
//! always get maximum priority with sound and vibration; attention alerts
//! get elevated priority with optional sound.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::logging::{self, Component};
use crate::model::{AlertEvent, DispatchError, Severity};

// ---------------------------------------------------------------------------
// Notification types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Max,
}

/// What a sink is asked to present to the caregiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub play_sound: bool,
    pub vibrate: bool,
    /// Delivery channel: `critical` for critical alerts, `alerts` otherwise.
    pub channel: &'static str,
    /// Critical notifications stay until dismissed.
    pub sticky: bool,
}

/// Delivery collaborator (local push notification, webhook, log...).
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Returned for every successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    pub priority: Priority,
    pub played_sound: bool,
    pub vibrated: bool,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    attention_sound: bool,
    subject_id: Option<String>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink, attention_sound: true, subject_id: None }
    }

    /// Whether attention-level alerts play a sound (critical always do).
    pub fn with_attention_sound(mut self, enabled: bool) -> Self {
        self.attention_sound = enabled;
        self
    }

    /// Subject identifier attached to dispatch log lines.
    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Builds the notification for an event without sending it.
    pub fn notification_for(&self, event: &AlertEvent) -> Notification {
        match event.severity {
            Severity::Critical => Notification {
                title: event.title.clone(),
                body: format!(
                    "{}\nValue: {}\nCheck on the baby immediately!",
                    event.message, event.value
                ),
                priority: Priority::Max,
                play_sound: true,
                vibrate: true,
                channel: "critical",
                sticky: true,
            },
            // The deduplicator only builds events for abnormal metrics; a
            // hand-built normal event is presented like attention.
            Severity::Attention | Severity::Normal => Notification {
                title: event.title.clone(),
                body: format!("{}\nValue: {}\nMonitor closely.", event.message, event.value),
                priority: Priority::High,
                play_sound: self.attention_sound,
                vibrate: event.requires_vibration,
                channel: "alerts",
                sticky: false,
            },
        }
    }

    /// Delivers one event. A sink failure is logged and returned; the caller
    /// must then leave the cooldown unrecorded.
    pub fn dispatch(&self, event: &AlertEvent) -> Result<DispatchReceipt, DispatchError> {
        let notification = self.notification_for(event);
        let subject = self.subject_id.as_deref();

        match self.sink.deliver(&notification) {
            Ok(()) => {
                logging::info(
                    Component::Dispatch,
                    subject,
                    &format!(
                        "Sent {} alert for {} ({}) at priority {:?}",
                        event.severity, event.metric, event.value, notification.priority
                    ),
                );
                Ok(DispatchReceipt {
                    priority: notification.priority,
                    played_sound: notification.play_sound,
                    vibrated: notification.vibrate,
                })
            }
            Err(e) => {
                logging::error(
                    Component::Dispatch,
                    subject,
                    &format!("Failed to deliver {} alert: {}", event.key(), e),
                );
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Writes notifications to the service log. Never fails.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError> {
        let line = format!(
            "[{}] {} | {}",
            notification.channel,
            notification.title,
            notification.body.replace('\n', " | ")
        );
        match notification.priority {
            Priority::Max => logging::error(Component::Dispatch, None, &line),
            Priority::High => logging::warn(Component::Dispatch, None, &line),
        }
        Ok(())
    }
}

/// POSTs each notification as JSON to an HTTP endpoint (push gateway,
/// chat webhook, etc.).
pub struct WebhookSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

impl NotificationSink for WebhookSink {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError::Rejected(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
