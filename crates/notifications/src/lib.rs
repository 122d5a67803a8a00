//! Notification channel for transient user feedback.
//!
//! Any component can post a [`Notification`] through a
//! [`NotificationCenter`] without waiting on its display lifecycle: each
//! notification removes itself after its duration unless it was posted with a
//! duration of zero.

pub mod center;
pub mod notification;

pub use center::{DismissReason, NotificationCenter, NotificationEvent, VisibleNotification};
pub use notification::{Notification, NotificationId, Severity};
