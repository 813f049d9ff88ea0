//! Collaborator traits.
//!
//! Each trait covers one OS capability. Every call with an external effect
//! returns a `Result` so the pipeline can treat failure as a modeled branch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use wakebell_core::{AlarmPayload, RequestCode};

use crate::error::PlatformError;
use crate::types::{AlertNotification, ChannelSpec, Cue, CueKind};

// ── Wake scheduling ──────────────────────────────────────────────────

/// Callback identity invoked by the OS at the registered instant.
///
/// Implementations must return promptly: the host may reclaim the process
/// as soon as the call returns.
pub trait WakeHandler: Send + Sync {
    fn on_wake(&self, code: RequestCode, payload: &[u8]);
}

/// One durable OS wake registration.
pub struct WakeRegistration {
    pub code: RequestCode,
    pub fire_at_epoch_millis: i64,
    /// Opaque bytes handed back to the handler unchanged.
    pub payload: Vec<u8>,
    pub handler: Arc<dyn WakeHandler>,
}

/// Exact-time wake primitive. Registrations outlive the registering caller
/// and can wake a suspended device.
#[async_trait]
pub trait WakeScheduler: Send + Sync {
    /// Whether the exact-timing capability has been granted.
    fn can_schedule_exact(&self) -> bool;

    /// Register a wake callback. A registration with the same code is replaced.
    async fn register(&self, registration: WakeRegistration) -> Result<(), PlatformError>;

    /// Codes of registrations that have not fired yet.
    fn pending(&self) -> Vec<RequestCode>;
}

// ── Power ────────────────────────────────────────────────────────────

/// A token keeping the device out of low-power sleep.
pub trait WakeLock: Send + Sync {
    fn is_held(&self) -> bool;

    /// Release the lock. Fails with [`PlatformError::NotHeld`] if it was
    /// already released or expired.
    fn release(&self) -> Result<(), PlatformError>;
}

pub trait PowerManager: Send + Sync {
    /// Acquire a wake lock that the OS drops on its own after `ceiling`.
    fn acquire(&self, tag: &str, ceiling: Duration) -> Result<Box<dyn WakeLock>, PlatformError>;
}

// ── Notifications & keepalive ────────────────────────────────────────

pub trait NotificationSurface: Send + Sync {
    /// Register the alert channel. Registering an existing channel is a no-op.
    fn ensure_channel(&self, spec: &ChannelSpec) -> Result<(), PlatformError>;

    fn post(&self, id: i32, notification: &AlertNotification) -> Result<(), PlatformError>;

    fn clear(&self, id: i32) -> Result<(), PlatformError>;
}

/// Foreground marking that protects the delivering process from reclamation.
pub trait KeepAlive: Send + Sync {
    fn start_foreground(&self, id: i32, notification: &AlertNotification) -> Result<(), PlatformError>;

    /// Leave foreground. With `keep_notification` the foreground notification stays visible.
    fn stop_foreground(&self, keep_notification: bool) -> Result<(), PlatformError>;
}

/// Direct activation of the urgent interface, bypassing the notification surface.
pub trait UrgentUi: Send + Sync {
    fn launch(&self, payload: &AlarmPayload) -> Result<(), PlatformError>;
}

// ── Media ────────────────────────────────────────────────────────────

/// A looping playback on the alarm stream.
pub trait Playback: Send + Sync {
    fn is_playing(&self) -> bool;

    fn stop(&mut self) -> Result<(), PlatformError>;

    /// Free the underlying player. Consumes the handle, so it runs at most once.
    fn release(self: Box<Self>);
}

pub trait AudioOutput: Send + Sync {
    /// The system default sound of the given kind, if one is configured.
    fn default_cue(&self, kind: CueKind) -> Option<Cue>;

    /// Start looping `cue` on the alarm stream at a fixed `volume` (0.0..=1.0).
    fn start_loop(&self, cue: &Cue, volume: f32) -> Result<Box<dyn Playback>, PlatformError>;
}

pub trait Vibrator: Send + Sync {
    /// Play `pattern` (alternating off/on millis). With `repeat_from` the
    /// pattern loops from that index until cancelled.
    fn vibrate(&self, pattern: &[u64], repeat_from: Option<usize>) -> Result<(), PlatformError>;

    fn cancel(&self);
}

// ── Bundle ───────────────────────────────────────────────────────────

/// Every collaborator the pipeline needs, behind shared trait objects.
#[derive(Clone)]
pub struct Platform {
    pub wake: Arc<dyn WakeScheduler>,
    pub power: Arc<dyn PowerManager>,
    pub notifications: Arc<dyn NotificationSurface>,
    pub keepalive: Arc<dyn KeepAlive>,
    pub ui: Arc<dyn UrgentUi>,
    pub audio: Arc<dyn AudioOutput>,
    pub vibrator: Arc<dyn Vibrator>,
}
