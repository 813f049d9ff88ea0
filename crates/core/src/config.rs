use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_i32(profile: &str, key: &str, default: i32) -> i32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Vibration pattern attached to the notification channel and the alert notification.
pub const CHANNEL_VIBRATION_PATTERN: &[u64] = &[0, 1000, 500, 1000];

/// Waveform looped by the presenter while alerting.
pub const PRESENTER_VIBRATION_PATTERN: &[u64] = &[0, 1000, 500, 1000, 500, 1000, 500];

const DEFAULT_GRACE_PERIOD_MS: u64 = 10_000;
const DEFAULT_WAKE_LOCK_CEILING_MS: u64 = 60_000;
const DEFAULT_WAKE_LOCK_TAG: &str = "Wakebell::DeliveryWakeLock";
const DEFAULT_FOREGROUND_NOTIFICATION_ID: i32 = 9999;

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub delivery: DeliveryConfig,
    pub channel: ChannelConfig,
    pub presenter: PresenterConfig,
    pub bus: BusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            delivery: DeliveryConfig::default(),
            channel: ChannelConfig::default(),
            presenter: PresenterConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `WAKEBELL_PROFILE` env var. When set (e.g. `BEDSIDE`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("WAKEBELL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            delivery: DeliveryConfig::from_env_profiled(p),
            channel: ChannelConfig::from_env_profiled(p),
            presenter: PresenterConfig::from_env_profiled(p),
            bus: BusConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  delivery:   grace_period_ms={}, wake_lock_ceiling_ms={}, tag={}",
            self.delivery.grace_period_ms,
            self.delivery.wake_lock_ceiling_ms,
            self.delivery.wake_lock_tag
        );
        tracing::info!("  channel:    id={}, name={}", self.channel.id, self.channel.name);
        tracing::info!("  presenter:  volume={}", self.presenter.volume);
        tracing::info!("  bus:        command_queue_capacity={}", self.bus.command_queue_capacity);
    }
}

// ── Delivery ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// How long a session runs without a dismissal before it stops itself.
    pub grace_period_ms: u64,
    /// Hard ceiling passed to the power manager when acquiring the wake lock.
    pub wake_lock_ceiling_ms: u64,
    pub wake_lock_tag: String,
    /// Notification id used while the service holds foreground status.
    pub foreground_notification_id: i32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            wake_lock_ceiling_ms: DEFAULT_WAKE_LOCK_CEILING_MS,
            wake_lock_tag: DEFAULT_WAKE_LOCK_TAG.to_string(),
            foreground_notification_id: DEFAULT_FOREGROUND_NOTIFICATION_ID,
        }
    }
}

impl DeliveryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            grace_period_ms: profiled_env_u64(p, "GRACE_PERIOD_MS", DEFAULT_GRACE_PERIOD_MS),
            wake_lock_ceiling_ms: profiled_env_u64(p, "WAKE_LOCK_CEILING_MS", DEFAULT_WAKE_LOCK_CEILING_MS),
            wake_lock_tag: profiled_env_or(p, "WAKE_LOCK_TAG", DEFAULT_WAKE_LOCK_TAG),
            foreground_notification_id: profiled_env_i32(
                p,
                "FOREGROUND_NOTIFICATION_ID",
                DEFAULT_FOREGROUND_NOTIFICATION_ID,
            ),
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn wake_lock_ceiling(&self) -> Duration {
        Duration::from_millis(self.wake_lock_ceiling_ms)
    }
}

// ── Notification channel ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: "alarm_fullscreen".to_string(),
            name: "Alarm Notifications".to_string(),
            description: "Full screen alarm notifications".to_string(),
        }
    }
}

impl ChannelConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            id: profiled_env_or(p, "CHANNEL_ID", "alarm_fullscreen"),
            name: profiled_env_or(p, "CHANNEL_NAME", "Alarm Notifications"),
            description: profiled_env_or(p, "CHANNEL_DESCRIPTION", "Full screen alarm notifications"),
        }
    }
}

// ── Presenter ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterConfig {
    /// Fixed playback volume, 0.0 to 1.0.
    pub volume: f32,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

impl PresenterConfig {
    fn from_env_profiled(p: &str) -> Self {
        let volume = profiled_env_or(p, "ALERT_VOLUME", "1.0")
            .parse::<f32>()
            .unwrap_or(1.0);
        Self {
            volume: if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 },
        }
    }
}

// ── Command bus ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub command_queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { command_queue_capacity: 64 }
    }
}

impl BusConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            command_queue_capacity: (profiled_env_u64(p, "COMMAND_QUEUE_CAPACITY", 64) as usize).max(1),
        }
    }
}
