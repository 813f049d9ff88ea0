use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced to the caller of `schedule_alarm`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// The exact-wake capability has not been granted. Nothing was registered.
    #[error("Cannot schedule exact alarms")]
    PermissionDenied,

    /// The request was invalid or the OS rejected the wake registration.
    #[error("{0}")]
    RegistrationFailure(String),
}

impl SchedulingError {
    /// Wire code reported to the front-end.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulingError::PermissionDenied => "NO_PERMISSION",
            SchedulingError::RegistrationFailure(_) => "ALARM_ERROR",
        }
    }
}

/// A platform resource used during delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    NotificationChannel,
    WakeLock,
    Foreground,
    Notification,
    UrgentUi,
    Audio,
    Vibration,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::NotificationChannel => write!(f, "notification channel"),
            Resource::WakeLock => write!(f, "wake lock"),
            Resource::Foreground => write!(f, "foreground status"),
            Resource::Notification => write!(f, "notification"),
            Resource::UrgentUi => write!(f, "urgent UI"),
            Resource::Audio => write!(f, "audio"),
            Resource::Vibration => write!(f, "vibration"),
        }
    }
}

/// Failures that happen after an alarm has been accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// A resource could not be acquired mid-session. Delivery continues degraded.
    #[error("{resource} unavailable: {message}")]
    Resource { resource: Resource, message: String },

    /// The wake trigger could not reach the delivery service. The alarm is dropped.
    #[error("delivery handoff failed: {0}")]
    Handoff(String),
}

impl DeliveryError {
    pub fn resource(resource: Resource, message: impl Into<String>) -> Self {
        DeliveryError::Resource {
            resource,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_errors_map_to_wire_codes() {
        assert_eq!(SchedulingError::PermissionDenied.code(), "NO_PERMISSION");
        assert_eq!(
            SchedulingError::RegistrationFailure("boom".into()).code(),
            "ALARM_ERROR"
        );
    }

    #[test]
    fn resource_failure_names_the_resource() {
        let err = DeliveryError::resource(Resource::WakeLock, "denied");
        assert_eq!(err.to_string(), "wake lock unavailable: denied");
    }
}
