//! The shared notification center.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::notification::{Notification, NotificationId, Severity};

/// Top offset of the first visible notification, in pixels.
pub const FIRST_OFFSET_PX: u32 = 20;

/// Vertical distance between stacked notifications, in pixels.
pub const STACK_SPACING_PX: u32 = 60;

const EVENT_CAPACITY: usize = 64;

/// Why a notification went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DismissReason {
    Expired,
    Dismissed,
    Cleared,
}

/// Change feed for UI consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Shown(Notification),
    Dismissed {
        id: NotificationId,
        reason: DismissReason,
    },
}

/// A notification together with its position in the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleNotification {
    #[serde(flatten)]
    pub notification: Notification,
    pub offset_px: u32,
}

#[derive(Debug)]
struct Inner {
    active: Mutex<Vec<Notification>>,
    events: broadcast::Sender<NotificationEvent>,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: NotificationId, reason: DismissReason) -> bool {
        let removed = {
            let mut active = self.active();
            let before = active.len();
            active.retain(|n| n.id != id);
            active.len() != before
        };

        if removed {
            tracing::debug!(%id, ?reason, "notification removed");
            // No subscribers is fine
            let _ = self.events.send(NotificationEvent::Dismissed { id, reason });
        }
        removed
    }
}

/// Holds the active notifications. Clones share the same collection.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    /// Posts a notification and schedules its removal.
    ///
    /// `duration` of `None` uses the severity's default; `Some(Duration::ZERO)`
    /// keeps the notification until [`remove`](Self::remove) is called.
    pub fn show(
        &self,
        message: impl Into<String>,
        severity: Severity,
        duration: Option<Duration>,
    ) -> NotificationId {
        let duration = duration.unwrap_or_else(|| severity.default_duration());
        let notification = Notification::new(message, severity, duration);
        let id = notification.id;

        self.inner.active().push(notification.clone());
        metrics::counter!("notifications_shown_total", "severity" => severity.as_str())
            .increment(1);
        tracing::debug!(%id, %severity, message = %notification.message, "notification shown");
        let _ = self.inner.events.send(NotificationEvent::Shown(notification));

        if !duration.is_zero() {
            self.schedule_removal(id, duration);
        }
        id
    }

    fn schedule_removal(&self, id: NotificationId, after: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%id, "no async runtime; notification must be dismissed explicitly");
            return;
        };

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = inner.upgrade() {
                inner.remove(id, DismissReason::Expired);
            }
        });
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, Severity::Success, None)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, Severity::Error, None)
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, Severity::Info, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.show(message, Severity::Warning, None)
    }

    /// Dismisses a notification. Returns false if it was already gone.
    pub fn remove(&self, id: NotificationId) -> bool {
        self.inner.remove(id, DismissReason::Dismissed)
    }

    /// Dismisses everything. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *self.inner.active());
        for notification in &removed {
            let _ = self.inner.events.send(NotificationEvent::Dismissed {
                id: notification.id,
                reason: DismissReason::Cleared,
            });
        }
        removed.len()
    }

    /// Active notifications top to bottom, in insertion order.
    pub fn visible(&self) -> Vec<VisibleNotification> {
        self.inner
            .active()
            .iter()
            .zip(0u32..)
            .map(|(notification, index)| VisibleNotification {
                notification: notification.clone(),
                offset_px: FIRST_OFFSET_PX + index * STACK_SPACING_PX,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.active().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.active().is_empty()
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.inner.active().iter().find(|n| n.id == id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.inner.events.subscribe()
    }
}
