//! Status notifications for the operator-facing feed
//!
//! The engine fires these and moves on; it never waits for a consumer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::model::{ChargePoint, ChargePointId, StatusProcess, Step};

/// Severity attached to process notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criticality {
    Info,
    Success,
    Error,
}

/// Event published to the feed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    StatusChanged {
        id: ChargePointId,
        last_update: DateTime<Utc>,
        error: String,
        online: bool,
        step: Step,
        status: StatusProcess,
    },
    Process {
        client_id: String,
        criticality: Criticality,
        message: String,
    },
    Connected {
        client_id: String,
    },
    Disconnected {
        client_id: String,
    },
}

impl Notification {
    pub fn status_changed(cp: &ChargePoint) -> Self {
        Notification::StatusChanged {
            id: cp.id(),
            last_update: cp.last_update(),
            error: cp.error().to_string(),
            online: cp.is_online(),
            step: cp.step(),
            status: cp.status(),
        }
    }

    /// Outcome of the current phase, if there is one to report
    pub fn process_outcome(cp: &ChargePoint) -> Option<Self> {
        let (criticality, message) = match (cp.status(), cp.step()) {
            (StatusProcess::Failed, step) => (Criticality::Error, format!("{} failed", step)),
            (StatusProcess::Finished, step) => (Criticality::Success, format!("{} succeeded", step)),
            // Moving on to configuration means the firmware phase went through
            (_, Step::Configuration) => (Criticality::Success, format!("{} succeeded", Step::Firmware)),
            _ => return None,
        };
        Some(Notification::Process {
            client_id: cp.client_id().to_string(),
            criticality,
            message,
        })
    }

    pub fn message(&self) -> String {
        match self {
            Notification::StatusChanged { id, step, status, .. } => {
                format!("charge point {} is {} / {}", id, step, status)
            }
            Notification::Process { client_id, message, .. } => format!("{}: {}", client_id, message),
            Notification::Connected { client_id } => format!("{} connected", client_id),
            Notification::Disconnected { client_id } => format!("{} disconnected", client_id),
        }
    }
}

/// Sink for engine events
pub trait Notifier: Send + Sync {
    fn on_status_changed(&self, cp: &ChargePoint);

    fn on_process_finished_or_failed(&self, cp: &ChargePoint);

    fn on_connected(&self, cp: &ChargePoint);

    fn on_disconnected(&self, cp: &ChargePoint);
}

/// Fans notifications out to any number of subscribers.
///
/// Slow subscribers lag and lose events; publishing never blocks.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    fn publish(&self, notification: Notification) {
        // No subscriber is fine
        if self.tx.send(notification).is_err() {
            trace!("Notification dropped: no subscriber");
        }
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn on_status_changed(&self, cp: &ChargePoint) {
        self.publish(Notification::status_changed(cp));
    }

    fn on_process_finished_or_failed(&self, cp: &ChargePoint) {
        if let Some(notification) = Notification::process_outcome(cp) {
            self.publish(notification);
        }
    }

    fn on_connected(&self, cp: &ChargePoint) {
        self.publish(Notification::Connected {
            client_id: cp.client_id().to_string(),
        });
    }

    fn on_disconnected(&self, cp: &ChargePoint) {
        self.publish(Notification::Disconnected {
            client_id: cp.client_id().to_string(),
        });
    }
}
