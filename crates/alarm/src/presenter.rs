//! Urgent alert interface and its sensory loop.
//!
//! An [`AlertPresenter`] is one activation of the urgent interface:
//! `Inactive → Alerting → Dismissed`. Dismissed is terminal. A new alarm
//! gets a new presenter; [`PresenterSlot`] keeps at most one of them alive.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use wakebell_core::config::{PresenterConfig, PRESENTER_VIBRATION_PATTERN};
use wakebell_core::{AlarmPayload, DeliveryError, Resource};
use wakebell_platform::{AudioOutput, CueKind, Playback, Vibrator};

use crate::lock;

/// Background colour of the urgent interface.
pub const ALERT_BACKGROUND: &str = "#FF1744";

/// Label of the single user action.
pub const DISMISS_LABEL: &str = "DISMISS ALARM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterState {
    Inactive,
    Alerting,
    Dismissed,
}

/// What the interface does with the system back/away gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    /// Swallowed; the alert keeps running.
    Ignored,
    /// Handled by the host as usual.
    Default,
}

/// Window flags requested from the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub show_when_locked: bool,
    pub turn_screen_on: bool,
    pub keep_screen_on: bool,
    pub dismiss_keyguard: bool,
}

impl WindowPolicy {
    pub fn urgent() -> Self {
        Self {
            show_when_locked: true,
            turn_screen_on: true,
            keep_screen_on: true,
            dismiss_keyguard: true,
        }
    }
}

/// Everything the host needs to render the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertView {
    pub title: String,
    pub body: String,
    pub background: &'static str,
    pub action_label: &'static str,
    pub window: WindowPolicy,
}

struct PresenterInner {
    state: PresenterState,
    playback: Option<Box<dyn Playback>>,
    vibrating: bool,
}

// ── AlertPresenter ───────────────────────────────────────────────────

pub struct AlertPresenter {
    id: Uuid,
    payload: AlarmPayload,
    volume: f32,
    audio: Arc<dyn AudioOutput>,
    vibrator: Arc<dyn Vibrator>,
    inner: Mutex<PresenterInner>,
}

impl AlertPresenter {
    pub fn new(
        payload: AlarmPayload,
        volume: f32,
        audio: Arc<dyn AudioOutput>,
        vibrator: Arc<dyn Vibrator>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            volume,
            audio,
            vibrator,
            inner: Mutex::new(PresenterInner {
                state: PresenterState::Inactive,
                playback: None,
                vibrating: false,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn payload(&self) -> &AlarmPayload {
        &self.payload
    }

    pub fn state(&self) -> PresenterState {
        lock(&self.inner).state
    }

    /// Start the vibration and audio loops.
    ///
    /// Only the first call on an inactive presenter does anything. A failed
    /// loop does not stop the other one; the failures are returned so the
    /// caller can record the degradation.
    pub fn activate(&self) -> Vec<DeliveryError> {
        let mut inner = lock(&self.inner);
        if inner.state != PresenterState::Inactive {
            debug!(presenter_id = %self.id, state = ?inner.state, "presenter already activated");
            return Vec::new();
        }
        inner.state = PresenterState::Alerting;

        let mut degraded = Vec::new();

        match self.vibrator.vibrate(PRESENTER_VIBRATION_PATTERN, Some(0)) {
            Ok(()) => inner.vibrating = true,
            Err(e) => {
                warn!(presenter_id = %self.id, error = %e, "vibration unavailable, continuing without it");
                degraded.push(DeliveryError::resource(Resource::Vibration, e.to_string()));
            }
        }

        let cue = CueKind::PREFERENCE
            .iter()
            .find_map(|kind| self.audio.default_cue(*kind));
        match cue {
            Some(cue) => match self.audio.start_loop(&cue, self.volume) {
                Ok(playback) => {
                    debug!(presenter_id = %self.id, cue = %cue.kind, "alert sound looping");
                    inner.playback = Some(playback);
                }
                Err(e) => {
                    warn!(presenter_id = %self.id, error = %e, "alert sound failed, vibration only");
                    degraded.push(DeliveryError::resource(Resource::Audio, e.to_string()));
                }
            },
            None => {
                warn!(presenter_id = %self.id, "no alarm, ringtone or notification sound configured");
                degraded.push(DeliveryError::resource(
                    Resource::Audio,
                    "no default sound configured",
                ));
            }
        }

        info!(
            presenter_id = %self.id,
            title = %self.payload.title,
            degraded = degraded.len(),
            "alert presenter alerting"
        );
        degraded
    }

    /// The user's dismiss action. Returns `true` only for the call that
    /// moved the presenter out of `Alerting`.
    pub fn dismiss(&self) -> bool {
        let was_alerting = self.finish();
        if was_alerting {
            info!(presenter_id = %self.id, "alarm dismissed");
        }
        was_alerting
    }

    /// Forced teardown by the host. Releases exactly what `dismiss` would.
    pub fn teardown(&self) -> bool {
        let was_alerting = self.finish();
        if was_alerting {
            info!(presenter_id = %self.id, "alert presenter torn down");
        }
        was_alerting
    }

    pub fn back_pressed(&self) -> BackAction {
        match self.state() {
            PresenterState::Alerting => BackAction::Ignored,
            _ => BackAction::Default,
        }
    }

    pub fn view(&self) -> AlertView {
        AlertView {
            title: self.payload.title.clone(),
            body: self.payload.body.clone(),
            background: ALERT_BACKGROUND,
            action_label: DISMISS_LABEL,
            window: WindowPolicy::urgent(),
        }
    }

    fn finish(&self) -> bool {
        let mut inner = lock(&self.inner);
        let was_alerting = inner.state == PresenterState::Alerting;
        inner.state = PresenterState::Dismissed;

        if let Some(mut playback) = inner.playback.take() {
            if playback.is_playing() {
                if let Err(e) = playback.stop() {
                    warn!(presenter_id = %self.id, error = %e, "failed to stop alert sound");
                }
            }
            playback.release();
        }
        if inner.vibrating {
            self.vibrator.cancel();
            inner.vibrating = false;
        }
        was_alerting
    }
}

impl Drop for AlertPresenter {
    fn drop(&mut self) {
        self.finish();
    }
}

// ── PresenterSlot ────────────────────────────────────────────────────

/// Receives the id of the delivery session whose alert the user dismissed.
type DismissHook = Arc<dyn Fn(Uuid) + Send + Sync>;

/// Result of [`PresenterSlot::activate`].
pub struct Activation {
    pub presenter: Arc<AlertPresenter>,
    /// The same alarm was already on screen and was brought forward.
    pub reused: bool,
    pub degraded: Vec<DeliveryError>,
}

struct OnScreen {
    presenter: Arc<AlertPresenter>,
    /// Delivery session the alert belongs to. `None` for a direct launch.
    session_id: Option<Uuid>,
}

/// Holds the single on-screen presenter and the session that owns it.
pub struct PresenterSlot {
    volume: f32,
    audio: Arc<dyn AudioOutput>,
    vibrator: Arc<dyn Vibrator>,
    current: Mutex<Option<OnScreen>>,
    on_dismiss: Mutex<Option<DismissHook>>,
}

impl PresenterSlot {
    pub fn new(
        config: &PresenterConfig,
        audio: Arc<dyn AudioOutput>,
        vibrator: Arc<dyn Vibrator>,
    ) -> Self {
        Self {
            volume: config.volume,
            audio,
            vibrator,
            current: Mutex::new(None),
            on_dismiss: Mutex::new(None),
        }
    }

    /// Called after a user dismissal of a session-owned alert, outside any
    /// presenter lock.
    pub fn on_dismiss(&self, hook: impl Fn(Uuid) + Send + Sync + 'static) {
        *lock(&self.on_dismiss) = Some(Arc::new(hook));
    }

    /// Show `payload` on behalf of `session_id`. An alerting presenter with
    /// the same payload is kept and handed to the new session; anything else
    /// on screen is torn down and replaced.
    pub fn activate(&self, payload: &AlarmPayload, session_id: Option<Uuid>) -> Activation {
        let mut current = lock(&self.current);

        if let Some(existing) = current.as_mut() {
            if existing.presenter.state() == PresenterState::Alerting
                && existing.presenter.payload() == payload
            {
                debug!(presenter_id = %existing.presenter.id(), "alarm already on screen");
                if session_id.is_some() {
                    existing.session_id = session_id;
                }
                return Activation {
                    presenter: existing.presenter.clone(),
                    reused: true,
                    degraded: Vec::new(),
                };
            }
        }

        if let Some(previous) = current.take() {
            previous.presenter.teardown();
        }

        let presenter = Arc::new(AlertPresenter::new(
            payload.clone(),
            self.volume,
            self.audio.clone(),
            self.vibrator.clone(),
        ));
        let degraded = presenter.activate();
        *current = Some(OnScreen {
            presenter: presenter.clone(),
            session_id,
        });

        Activation {
            presenter,
            reused: false,
            degraded,
        }
    }

    /// Dismiss whatever is on screen. Returns whether an alert was stopped.
    /// The hook only hears about alerts that belong to a session.
    pub fn dismiss_current(&self) -> bool {
        let Some((presenter, session_id)) = lock(&self.current)
            .as_ref()
            .map(|s| (s.presenter.clone(), s.session_id))
        else {
            return false;
        };
        if !presenter.dismiss() {
            return false;
        }

        let Some(session_id) = session_id else {
            debug!(presenter_id = %presenter.id(), "dismissed alert without a session");
            return true;
        };
        let hook = lock(&self.on_dismiss).clone();
        if let Some(hook) = hook {
            hook(session_id);
        }
        true
    }

    pub fn teardown_current(&self) -> bool {
        match lock(&self.current).take() {
            Some(on_screen) => on_screen.presenter.teardown(),
            None => false,
        }
    }

    /// Tear down the on-screen alert only if `session_id` still owns it.
    pub fn teardown_session(&self, session_id: Uuid) -> bool {
        let mut current = lock(&self.current);
        if current.as_ref().and_then(|s| s.session_id) != Some(session_id) {
            return false;
        }
        match current.take() {
            Some(on_screen) => on_screen.presenter.teardown(),
            None => false,
        }
    }

    pub fn current(&self) -> Option<Arc<AlertPresenter>> {
        lock(&self.current).as_ref().map(|s| s.presenter.clone())
    }

    /// Session that owns the on-screen alert, if any.
    pub fn current_session(&self) -> Option<Uuid> {
        lock(&self.current).as_ref().and_then(|s| s.session_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use wakebell_platform::{Fault, HostEvent, SimHost};

    use super::*;

    fn presenter(host: &SimHost) -> AlertPresenter {
        let platform = host.platform();
        AlertPresenter::new(
            AlarmPayload::new(Some("Wake up".into()), Some("Meeting at 9".into())),
            1.0,
            platform.audio,
            platform.vibrator,
        )
    }

    fn slot(host: &SimHost) -> PresenterSlot {
        let platform = host.platform();
        PresenterSlot::new(&PresenterConfig::default(), platform.audio, platform.vibrator)
    }

    #[test]
    fn activation_loops_sound_and_vibration() {
        let host = SimHost::new();
        let presenter = presenter(&host);
        assert_eq!(presenter.state(), PresenterState::Inactive);

        let degraded = presenter.activate();
        assert!(degraded.is_empty());
        assert_eq!(presenter.state(), PresenterState::Alerting);
        assert_eq!(
            host.count(|e| matches!(e, HostEvent::AudioStarted { cue: CueKind::Alarm, .. })),
            1
        );
        assert_eq!(
            host.count(|e| matches!(e, HostEvent::VibrationStarted { repeat_from: Some(0), .. })),
            1
        );

        // A second activation is ignored.
        assert!(presenter.activate().is_empty());
        assert_eq!(host.count(|e| matches!(e, HostEvent::AudioStarted { .. })), 1);
    }

    #[test]
    fn dismiss_is_idempotent() {
        let host = SimHost::new();
        let presenter = presenter(&host);
        presenter.activate();

        assert!(presenter.dismiss());
        assert!(!presenter.dismiss());
        assert!(!presenter.teardown());
        assert_eq!(presenter.state(), PresenterState::Dismissed);
        assert_eq!(host.count(|e| matches!(e, HostEvent::AudioStopped)), 1);
        assert_eq!(host.count(|e| matches!(e, HostEvent::AudioReleased)), 1);
        assert_eq!(host.count(|e| matches!(e, HostEvent::VibrationCancelled)), 1);
    }

    #[test]
    fn dismiss_after_teardown_releases_nothing_twice() {
        let host = SimHost::new();
        let presenter = presenter(&host);
        presenter.activate();

        assert!(presenter.teardown());
        assert!(!presenter.dismiss());
        drop(presenter);
        assert_eq!(host.count(|e| matches!(e, HostEvent::AudioReleased)), 1);
        assert_eq!(host.count(|e| matches!(e, HostEvent::VibrationCancelled)), 1);
    }

    #[test]
    fn dismissed_presenter_never_alerts_again() {
        let host = SimHost::new();
        let presenter = presenter(&host);
        presenter.activate();
        presenter.dismiss();

        assert!(presenter.activate().is_empty());
        assert_eq!(presenter.state(), PresenterState::Dismissed);
        assert_eq!(host.count(|e| matches!(e, HostEvent::AudioStarted { .. })), 1);
    }

    #[test]
    fn cue_falls_back_through_ringtone_and_notification() {
        let host = SimHost::new();
        host.set_available_cues(&[CueKind::Notification]);
        let presenter = presenter(&host);
        assert!(presenter.activate().is_empty());
        assert_eq!(
            host.count(|e| matches!(e, HostEvent::AudioStarted { cue: CueKind::Notification, .. })),
            1
        );
    }

    #[test]
    fn missing_sound_degrades_to_vibration_only() {
        let host = SimHost::new();
        host.set_available_cues(&[]);
        let presenter = presenter(&host);

        let degraded = presenter.activate();
        assert_eq!(
            degraded,
            vec![DeliveryError::resource(Resource::Audio, "no default sound configured")]
        );
        assert_eq!(presenter.state(), PresenterState::Alerting);
        assert_eq!(host.count(|e| matches!(e, HostEvent::VibrationStarted { .. })), 1);
    }

    #[test]
    fn audio_and_vibration_failures_are_reported_not_fatal() {
        let host = SimHost::new();
        host.inject(Fault::Audio);
        host.inject(Fault::Vibration);
        let presenter = presenter(&host);

        let degraded = presenter.activate();
        assert_eq!(degraded.len(), 2);
        assert_eq!(presenter.state(), PresenterState::Alerting);
        assert!(presenter.dismiss());
        assert_eq!(host.count(|e| matches!(e, HostEvent::VibrationCancelled)), 0);
    }

    #[test]
    fn back_gesture_is_ignored_while_alerting() {
        let host = SimHost::new();
        let presenter = presenter(&host);
        assert_eq!(presenter.back_pressed(), BackAction::Default);
        presenter.activate();
        assert_eq!(presenter.back_pressed(), BackAction::Ignored);
        presenter.dismiss();
        assert_eq!(presenter.back_pressed(), BackAction::Default);
    }

    #[test]
    fn view_carries_payload_and_window_policy() {
        let host = SimHost::new();
        let view = presenter(&host).view();
        assert_eq!(view.title, "Wake up");
        assert_eq!(view.body, "Meeting at 9");
        assert_eq!(view.background, "#FF1744");
        assert_eq!(view.action_label, "DISMISS ALARM");
        assert!(view.window.show_when_locked && view.window.dismiss_keyguard);
    }

    #[test]
    fn slot_reuses_alerting_presenter_for_same_payload() {
        let host = SimHost::new();
        let slot = slot(&host);
        let payload = AlarmPayload::default();

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let first = slot.activate(&payload, Some(a));
        let second = slot.activate(&payload, Some(b));
        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.presenter.id(), second.presenter.id());
        assert_eq!(host.count(|e| matches!(e, HostEvent::AudioStarted { .. })), 1);

        // The newer session owns the alert now; a direct launch does not steal it.
        assert_eq!(slot.current_session(), Some(b));
        assert!(slot.activate(&payload, None).reused);
        assert_eq!(slot.current_session(), Some(b));
        assert!(!slot.teardown_session(a));
        assert!(slot.teardown_session(b));
    }

    #[test]
    fn slot_replaces_presenter_for_new_payload() {
        let host = SimHost::new();
        let slot = slot(&host);

        let first = slot.activate(&AlarmPayload::new(Some("One".into()), None), None);
        let second = slot.activate(&AlarmPayload::new(Some("Two".into()), None), None);
        assert_eq!(first.presenter.state(), PresenterState::Dismissed);
        assert_eq!(second.presenter.state(), PresenterState::Alerting);
        assert_eq!(host.count(|e| matches!(e, HostEvent::AudioReleased)), 1);
    }

    #[test]
    fn slot_hook_receives_owning_session_once() {
        let host = SimHost::new();
        let slot = slot(&host);
        let dismissed = Arc::new(Mutex::new(Vec::new()));
        let seen = dismissed.clone();
        slot.on_dismiss(move |session_id| seen.lock().unwrap().push(session_id));

        let session_id = Uuid::new_v4();
        slot.activate(&AlarmPayload::default(), Some(session_id));
        assert!(slot.dismiss_current());
        assert!(!slot.dismiss_current());
        assert_eq!(*dismissed.lock().unwrap(), vec![session_id]);

        // Teardown releases without counting as a user dismissal.
        slot.activate(&AlarmPayload::new(Some("Later".into()), None), Some(Uuid::new_v4()));
        assert!(slot.teardown_current());
        assert!(slot.current().is_none());
        assert_eq!(dismissed.lock().unwrap().len(), 1);
    }

    #[test]
    fn direct_launch_dismissal_forwards_nothing() {
        let host = SimHost::new();
        let slot = slot(&host);
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = calls.clone();
        slot.on_dismiss(move |_| {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        });

        let activation = slot.activate(&AlarmPayload::default(), None);
        assert!(slot.dismiss_current());
        assert_eq!(activation.presenter.state(), PresenterState::Dismissed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
