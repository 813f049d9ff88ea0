//! Value types exchanged with the notification and media collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use wakebell_core::config::{ChannelConfig, CHANNEL_VIBRATION_PATTERN};
use wakebell_core::AlarmPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Importance {
    Default,
    High,
}

/// Registration data for the urgent alert channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: Importance,
    /// Deliver even while do-not-disturb is on.
    pub bypass_dnd: bool,
    pub vibration_pattern: Vec<u64>,
    pub lights: bool,
    pub public_on_lock_screen: bool,
}

impl ChannelSpec {
    pub fn urgent(config: &ChannelConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            description: config.description.clone(),
            importance: Importance::High,
            bypass_dnd: true,
            vibration_pattern: CHANNEL_VIBRATION_PATTERN.to_vec(),
            lights: true,
            public_on_lock_screen: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Default,
    High,
    Max,
}

/// Kind of system-configured sound, in order of preference for alarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CueKind {
    Alarm,
    Ringtone,
    Notification,
}

impl CueKind {
    /// Fallback order used when resolving the alert sound.
    pub const PREFERENCE: [CueKind; 3] = [CueKind::Alarm, CueKind::Ringtone, CueKind::Notification];
}

impl fmt::Display for CueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CueKind::Alarm => write!(f, "alarm"),
            CueKind::Ringtone => write!(f, "ringtone"),
            CueKind::Notification => write!(f, "notification"),
        }
    }
}

/// A resolved system sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub kind: CueKind,
    pub uri: String,
}

/// A persistent, high-priority alert posted to the notification surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    /// Category hint; alarms are ranked above other interruptions.
    pub category: String,
    /// Escalate straight to the urgent UI, even over the lock screen.
    pub full_screen: bool,
    /// Repeat the alert cue until the notification is cleared.
    pub insistent: bool,
    pub auto_cancel: bool,
    pub ongoing: bool,
    pub public_on_lock_screen: bool,
    pub vibration_pattern: Vec<u64>,
    pub sound: Option<CueKind>,
}

impl AlertNotification {
    pub fn urgent(channel_id: &str, payload: &AlarmPayload) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            priority: Priority::Max,
            category: "alarm".to_string(),
            full_screen: true,
            insistent: true,
            auto_cancel: true,
            ongoing: false,
            public_on_lock_screen: true,
            vibration_pattern: CHANNEL_VIBRATION_PATTERN.to_vec(),
            sound: Some(CueKind::Alarm),
        }
    }
}
