use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NotificationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// How a notification is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Info,
    Warning,
}

impl Severity {
    /// Display time used when the caller does not pass one.
    pub fn default_duration(&self) -> Duration {
        match self {
            Severity::Success | Severity::Info => Duration::from_millis(3000),
            Severity::Warning => Duration::from_millis(4000),
            Severity::Error => Duration::from_millis(5000),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Info => "info",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub severity: Severity,
    /// Milliseconds until automatic removal; 0 means it stays until dismissed.
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity, duration: Duration) -> Self {
        Self {
            id: NotificationId::new(),
            message: message.into(),
            severity,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            created_at: Utc::now(),
        }
    }

    /// True if this notification only goes away when dismissed.
    pub fn is_sticky(&self) -> bool {
        self.duration_ms == 0
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_durations_by_severity() {
        assert_eq!(Severity::Success.default_duration().as_millis(), 3000);
        assert_eq!(Severity::Error.default_duration().as_millis(), 5000);
        assert_eq!(Severity::Info.default_duration().as_millis(), 3000);
        assert_eq!(Severity::Warning.default_duration().as_millis(), 4000);
    }

    #[test]
    fn serializes_for_clients() {
        let notification = Notification::new("Saved", Severity::Success, Duration::ZERO);
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json["severity"], "success");
        assert_eq!(json["durationMs"], 0);
        assert!(notification.is_sticky());
    }

    #[test]
    fn id_parses_from_display() {
        let id = NotificationId::new();
        assert_eq!(id.to_string().parse::<NotificationId>().unwrap(), id);
        assert!("not-a-uuid".parse::<NotificationId>().is_err());
    }
}
