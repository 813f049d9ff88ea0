//! Recording in-process host.
//!
//! `SimHost` implements every collaborator trait. Calls are appended to an
//! event log that tests (and the CLI) can inspect, and individual
//! capabilities can be made to fail with [`SimHost::inject`]. Timers run on
//! `tokio::time`, so paused-clock tests advance through wake instants,
//! wake-lock ceilings and grace periods deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use wakebell_core::{AlarmPayload, RequestCode};

use crate::error::PlatformError;
use crate::traits::{
    AudioOutput, KeepAlive, NotificationSurface, Platform, Playback, PowerManager, UrgentUi,
    Vibrator, WakeLock, WakeRegistration, WakeScheduler,
};
use crate::types::{AlertNotification, ChannelSpec, Cue, CueKind};

/// One observable call made against the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    WakeRegistered { code: RequestCode, fire_at_epoch_millis: i64 },
    WakeReplaced { code: RequestCode },
    WakeFired { code: RequestCode },
    ChannelRegistered { id: String },
    WakeLockAcquired { tag: String, ceiling_ms: u64 },
    WakeLockReleased { tag: String },
    WakeLockExpired { tag: String },
    ForegroundStarted { id: i32 },
    ForegroundStopped { keep_notification: bool },
    NotificationPosted { id: i32, title: String, body: String, full_screen: bool },
    NotificationCleared { id: i32 },
    UrgentUiLaunched { title: String, body: String },
    AudioStarted { cue: CueKind, volume: f32 },
    AudioStopped,
    AudioReleased,
    VibrationStarted { pattern: Vec<u64>, repeat_from: Option<usize> },
    VibrationCancelled,
}

/// A capability that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    WakeRegistration,
    ChannelRegistration,
    WakeLock,
    Foreground,
    Notification,
    UrgentUi,
    Audio,
    Vibration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingWake {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SimState {
    events: Mutex<Vec<HostEvent>>,
    faults: Mutex<HashSet<Fault>>,
    exact_alarms_allowed: AtomicBool,
    available_cues: Mutex<Vec<CueKind>>,
    registrations: Mutex<HashMap<RequestCode, PendingWake>>,
    channels: Mutex<HashSet<String>>,
    next_generation: AtomicU64,
    held_wake_locks: AtomicUsize,
}

impl SimState {
    fn record(&self, event: HostEvent) {
        debug!(?event, "host event");
        lock(&self.events).push(event);
    }

    fn check(&self, fault: Fault, what: &str) -> Result<(), PlatformError> {
        if lock(&self.faults).contains(&fault) {
            return Err(PlatformError::Unavailable(format!("{what} (injected fault)")));
        }
        Ok(())
    }
}

/// In-process host recording every collaborator call. Cheap to clone.
#[derive(Clone)]
pub struct SimHost {
    state: Arc<SimState>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    /// A host with exact alarms allowed, every cue configured and no faults.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SimState {
                events: Mutex::new(Vec::new()),
                faults: Mutex::new(HashSet::new()),
                exact_alarms_allowed: AtomicBool::new(true),
                available_cues: Mutex::new(CueKind::PREFERENCE.to_vec()),
                registrations: Mutex::new(HashMap::new()),
                channels: Mutex::new(HashSet::new()),
                next_generation: AtomicU64::new(0),
                held_wake_locks: AtomicUsize::new(0),
            }),
        }
    }

    /// Bundle this host as the full collaborator set.
    pub fn platform(&self) -> Platform {
        Platform {
            wake: Arc::new(self.clone()),
            power: Arc::new(self.clone()),
            notifications: Arc::new(self.clone()),
            keepalive: Arc::new(self.clone()),
            ui: Arc::new(self.clone()),
            audio: Arc::new(self.clone()),
            vibrator: Arc::new(self.clone()),
        }
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.state.faults).insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        lock(&self.state.faults).remove(&fault);
    }

    pub fn set_exact_alarms_allowed(&self, allowed: bool) {
        self.state.exact_alarms_allowed.store(allowed, Ordering::SeqCst);
    }

    /// Restrict which system sounds are configured.
    pub fn set_available_cues(&self, cues: &[CueKind]) {
        *lock(&self.state.available_cues) = cues.to_vec();
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<HostEvent> {
        lock(&self.state.events).clone()
    }

    /// Number of logged events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&HostEvent) -> bool) -> usize {
        lock(&self.state.events).iter().filter(|e| predicate(e)).count()
    }

    /// Number of wake locks currently held (acquired and neither released nor expired).
    pub fn held_wake_locks(&self) -> usize {
        self.state.held_wake_locks.load(Ordering::SeqCst)
    }
}

// ── Wake scheduling ──────────────────────────────────────────────────

#[async_trait]
impl WakeScheduler for SimHost {
    fn can_schedule_exact(&self) -> bool {
        self.state.exact_alarms_allowed.load(Ordering::SeqCst)
    }

    async fn register(&self, registration: WakeRegistration) -> Result<(), PlatformError> {
        self.state.check(Fault::WakeRegistration, "wake registration")?;

        let WakeRegistration {
            code,
            fire_at_epoch_millis,
            payload,
            handler,
        } = registration;

        // Past instants fire right away.
        let delay = fire_at_epoch_millis
            .saturating_sub(Utc::now().timestamp_millis())
            .max(0) as u64;
        let generation = self.state.next_generation.fetch_add(1, Ordering::SeqCst);

        // Hold the map while spawning so a zero-delay wake can't look itself up
        // before it has been inserted.
        let mut registrations = lock(&self.state.registrations);
        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            {
                let mut registrations = lock(&state.registrations);
                if registrations.get(&code).map(|p| p.generation) == Some(generation) {
                    registrations.remove(&code);
                }
            }
            state.record(HostEvent::WakeFired { code });
            handler.on_wake(code, &payload);
        });

        let previous = registrations.insert(code, PendingWake { generation, handle });
        drop(registrations);
        if let Some(previous) = previous {
            previous.handle.abort();
            self.state.record(HostEvent::WakeReplaced { code });
        }
        self.state.record(HostEvent::WakeRegistered {
            code,
            fire_at_epoch_millis,
        });
        info!(request_code = %code, delay_ms = delay, "wake registered");
        Ok(())
    }

    fn pending(&self) -> Vec<RequestCode> {
        let mut codes: Vec<RequestCode> = lock(&self.state.registrations).keys().copied().collect();
        codes.sort();
        codes
    }
}

// ── Power ────────────────────────────────────────────────────────────

struct SimWakeLock {
    tag: String,
    held: Arc<AtomicBool>,
    state: Arc<SimState>,
    expiry: JoinHandle<()>,
}

impl WakeLock for SimWakeLock {
    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    fn release(&self) -> Result<(), PlatformError> {
        if !self.held.swap(false, Ordering::SeqCst) {
            return Err(PlatformError::NotHeld(self.tag.clone()));
        }
        self.expiry.abort();
        self.state.held_wake_locks.fetch_sub(1, Ordering::SeqCst);
        self.state.record(HostEvent::WakeLockReleased {
            tag: self.tag.clone(),
        });
        Ok(())
    }
}

impl PowerManager for SimHost {
    fn acquire(&self, tag: &str, ceiling: Duration) -> Result<Box<dyn WakeLock>, PlatformError> {
        self.state.check(Fault::WakeLock, "power manager")?;

        let held = Arc::new(AtomicBool::new(true));
        self.state.held_wake_locks.fetch_add(1, Ordering::SeqCst);
        self.state.record(HostEvent::WakeLockAcquired {
            tag: tag.to_string(),
            ceiling_ms: ceiling.as_millis() as u64,
        });

        let expiry_held = held.clone();
        let expiry_state = self.state.clone();
        let expiry_tag = tag.to_string();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            if expiry_held.swap(false, Ordering::SeqCst) {
                expiry_state.held_wake_locks.fetch_sub(1, Ordering::SeqCst);
                expiry_state.record(HostEvent::WakeLockExpired { tag: expiry_tag });
            }
        });

        Ok(Box::new(SimWakeLock {
            tag: tag.to_string(),
            held,
            state: self.state.clone(),
            expiry,
        }))
    }
}

// ── Notifications & keepalive ────────────────────────────────────────

impl NotificationSurface for SimHost {
    fn ensure_channel(&self, spec: &ChannelSpec) -> Result<(), PlatformError> {
        self.state.check(Fault::ChannelRegistration, "notification channel")?;
        if lock(&self.state.channels).insert(spec.id.clone()) {
            self.state.record(HostEvent::ChannelRegistered { id: spec.id.clone() });
        }
        Ok(())
    }

    fn post(&self, id: i32, notification: &AlertNotification) -> Result<(), PlatformError> {
        self.state.check(Fault::Notification, "notification surface")?;
        if !lock(&self.state.channels).contains(&notification.channel_id) {
            return Err(PlatformError::Rejected(format!(
                "unknown channel '{}'",
                notification.channel_id
            )));
        }
        self.state.record(HostEvent::NotificationPosted {
            id,
            title: notification.title.clone(),
            body: notification.body.clone(),
            full_screen: notification.full_screen,
        });
        Ok(())
    }

    fn clear(&self, id: i32) -> Result<(), PlatformError> {
        self.state.record(HostEvent::NotificationCleared { id });
        Ok(())
    }
}

impl KeepAlive for SimHost {
    fn start_foreground(&self, id: i32, _notification: &AlertNotification) -> Result<(), PlatformError> {
        self.state.check(Fault::Foreground, "foreground service")?;
        self.state.record(HostEvent::ForegroundStarted { id });
        Ok(())
    }

    fn stop_foreground(&self, keep_notification: bool) -> Result<(), PlatformError> {
        self.state.record(HostEvent::ForegroundStopped { keep_notification });
        Ok(())
    }
}

impl UrgentUi for SimHost {
    fn launch(&self, payload: &AlarmPayload) -> Result<(), PlatformError> {
        self.state.check(Fault::UrgentUi, "activity launch")?;
        self.state.record(HostEvent::UrgentUiLaunched {
            title: payload.title.clone(),
            body: payload.body.clone(),
        });
        Ok(())
    }
}

// ── Media ────────────────────────────────────────────────────────────

struct SimPlayback {
    playing: bool,
    state: Arc<SimState>,
}

impl Playback for SimPlayback {
    fn is_playing(&self) -> bool {
        self.playing
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        if self.playing {
            self.playing = false;
            self.state.record(HostEvent::AudioStopped);
        }
        Ok(())
    }

    fn release(self: Box<Self>) {
        self.state.record(HostEvent::AudioReleased);
    }
}

impl AudioOutput for SimHost {
    fn default_cue(&self, kind: CueKind) -> Option<Cue> {
        lock(&self.state.available_cues).contains(&kind).then(|| Cue {
            kind,
            uri: format!("sim://cue/{kind}"),
        })
    }

    fn start_loop(&self, cue: &Cue, volume: f32) -> Result<Box<dyn Playback>, PlatformError> {
        self.state.check(Fault::Audio, "media player")?;
        self.state.record(HostEvent::AudioStarted {
            cue: cue.kind,
            volume,
        });
        Ok(Box::new(SimPlayback {
            playing: true,
            state: self.state.clone(),
        }))
    }
}

impl Vibrator for SimHost {
    fn vibrate(&self, pattern: &[u64], repeat_from: Option<usize>) -> Result<(), PlatformError> {
        self.state.check(Fault::Vibration, "vibrator")?;
        self.state.record(HostEvent::VibrationStarted {
            pattern: pattern.to_vec(),
            repeat_from,
        });
        Ok(())
    }

    fn cancel(&self) {
        self.state.record(HostEvent::VibrationCancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::WakeHandler;
    use std::sync::atomic::AtomicU32;

    struct CountingHandler {
        fired: AtomicU32,
    }

    impl WakeHandler for CountingHandler {
        fn on_wake(&self, _code: RequestCode, _payload: &[u8]) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registration(fire_at: i64, handler: Arc<CountingHandler>) -> WakeRegistration {
        WakeRegistration {
            code: RequestCode::from_epoch_millis(fire_at),
            fire_at_epoch_millis: fire_at,
            payload: Vec::new(),
            handler,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn same_code_replaces_pending_wake() {
        let host = SimHost::new();
        let handler = Arc::new(CountingHandler { fired: AtomicU32::new(0) });
        let fire_at = Utc::now().timestamp_millis() + 5_000;

        host.register(registration(fire_at, handler.clone())).await.unwrap();
        host.register(registration(fire_at, handler.clone())).await.unwrap();
        assert_eq!(host.pending().len(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(handler.fired.load(Ordering::SeqCst), 1);
        assert!(host.pending().is_empty());
        assert_eq!(host.count(|e| matches!(e, HostEvent::WakeReplaced { .. })), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn far_out_instants_do_not_overflow() {
        let host = SimHost::new();
        let handler = Arc::new(CountingHandler { fired: AtomicU32::new(0) });

        host.register(registration(i64::MIN, handler.clone())).await.unwrap();
        host.register(registration(i64::MAX, handler.clone())).await.unwrap();
        assert_eq!(host.pending().len(), 2);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handler.fired.load(Ordering::SeqCst), 1);
        assert_eq!(host.pending(), vec![RequestCode::from_epoch_millis(i64::MAX)]);
    }

    #[tokio::test(start_paused = true)]
    async fn wake_lock_expires_at_ceiling() {
        let host = SimHost::new();
        let wake_lock = host.acquire("test", Duration::from_secs(60)).unwrap();
        assert_eq!(host.held_wake_locks(), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!wake_lock.is_held());
        assert_eq!(host.held_wake_locks(), 0);
        assert_eq!(wake_lock.release(), Err(PlatformError::NotHeld("test".into())));
    }

    #[tokio::test]
    async fn injected_fault_fails_the_call() {
        let host = SimHost::new();
        host.inject(Fault::WakeLock);
        assert!(host.acquire("test", Duration::from_secs(1)).is_err());
        host.clear_fault(Fault::WakeLock);
        assert!(host.acquire("test", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn missing_cues_resolve_to_none() {
        let host = SimHost::new();
        host.set_available_cues(&[CueKind::Notification]);
        assert!(host.default_cue(CueKind::Alarm).is_none());
        assert_eq!(
            host.default_cue(CueKind::Notification).map(|c| c.kind),
            Some(CueKind::Notification)
        );
    }
}
