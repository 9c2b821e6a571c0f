//! Collaborator sinks: audit trail (bitácora) and alert notifications.
//!
//! Both are fire-and-forget from the engine's point of view. Audit entries are
//! recorded after the owning transaction committed; notification failures are
//! logged and never fail the operation that produced them.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use stockledger_core::UserId;

/// One audit trail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: UserId,
    pub action: String,
    pub description: String,
    pub table: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor_id: UserId,
        action: impl Into<String>,
        description: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            action: action.into(),
            description: description.into(),
            table: table.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Sink for audit entries.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, entry: AuditEntry);
}

/// Writes audit entries as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            actor_id = %entry.actor_id,
            action = %entry.action,
            table = %entry.table,
            "{}",
            entry.description
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _entry: AuditEntry) {}
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    inner: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<AuditEntry> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.all().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// Alert addressed to a set of recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub payload: JsonValue,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("notification not enqueued: {0}")]
pub struct NotificationError(pub String);

/// Enqueue-only contract towards the notification dispatcher.
pub trait NotificationSink: Send + Sync + 'static {
    fn enqueue(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn enqueue(&self, _notification: Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Writes notifications on the `notifications` target (worker default until a
/// real dispatcher is wired).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn enqueue(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            target: "notifications",
            recipients = ?notification.recipients,
            payload = %notification.payload,
            "alert enqueued"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    inner: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn enqueue(&self, notification: Notification) -> Result<(), NotificationError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}
