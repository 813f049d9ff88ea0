//! WakeDeliveryService: runs one bounded delivery session at a time.
//!
//! Every state change arrives as a [`DeliveryCommand`] on the command queue
//! and is handled by a single worker loop, so a dismissal and the auto-stop
//! timer can never interleave. The session's wake lock sits behind a
//! check-and-set: whichever ending reaches it first releases it, the other
//! finds nothing to do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wakebell_bus::{topics, BusError, Message, PipelineSender, Worker};
use wakebell_core::config::{ChannelConfig, DeliveryConfig};
use wakebell_core::{AlarmPayload, DeliveryError, Resource};
use wakebell_platform::{AlertNotification, ChannelSpec, Platform, WakeLock};

use crate::lock;
use crate::presenter::PresenterSlot;

// ── Commands ─────────────────────────────────────────────────────────

/// Messages consumed by the delivery worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryCommand {
    /// Begin a session, superseding any active one.
    Start { payload: AlarmPayload },
    /// User dismissal of the given session's alert.
    Dismiss { session_id: Uuid },
    /// Grace period elapsed for the given session.
    AutoStop { session_id: Uuid },
}

impl DeliveryCommand {
    pub fn to_message(&self) -> Result<Message, BusError> {
        Ok(Message::new(topics::DELIVERY_COMMAND, self)?)
    }
}

/// Queue a dismissal of `session_id` without waiting.
pub fn request_dismiss(commands: &dyn PipelineSender, session_id: Uuid) -> Result<(), BusError> {
    commands.try_send(DeliveryCommand::Dismiss { session_id }.to_message()?)
}

// ── Session ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    Dismissed,
    TimedOut,
    Superseded,
    Shutdown,
}

struct SessionState {
    wake_lock: Option<Box<dyn WakeLock>>,
    presenter_active: bool,
    ended: Option<EndReason>,
    degraded: Vec<DeliveryError>,
}

/// Runtime record of one alarm delivery.
pub struct DeliverySession {
    pub id: Uuid,
    pub payload: AlarmPayload,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    /// Id of the alert notification, separate from the foreground one.
    pub alert_notification_id: i32,
    state: Mutex<SessionState>,
}

impl DeliverySession {
    fn new(payload: AlarmPayload, config: &DeliveryConfig) -> Self {
        let started_at = Utc::now();
        let deadline_at = i64::try_from(config.grace_period_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|grace| started_at.checked_add_signed(grace))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: Uuid::new_v4(),
            payload,
            started_at,
            deadline_at,
            alert_notification_id: (started_at.timestamp_millis() & i64::from(i32::MAX)) as i32,
            state: Mutex::new(SessionState {
                wake_lock: None,
                presenter_active: false,
                ended: None,
                degraded: Vec::new(),
            }),
        }
    }

    pub fn wake_lock_held(&self) -> bool {
        lock(&self.state)
            .wake_lock
            .as_ref()
            .is_some_and(|l| l.is_held())
    }

    pub fn presenter_active(&self) -> bool {
        lock(&self.state).presenter_active
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        lock(&self.state).ended
    }

    pub fn is_active(&self) -> bool {
        self.end_reason().is_none()
    }

    /// Resources that could not be acquired for this session.
    pub fn degraded(&self) -> Vec<Resource> {
        lock(&self.state)
            .degraded
            .iter()
            .filter_map(|e| match e {
                DeliveryError::Resource { resource, .. } => Some(*resource),
                DeliveryError::Handoff(_) => None,
            })
            .collect()
    }

    fn degrade(&self, error: DeliveryError) {
        warn!(session_id = %self.id, error = %error, "delivery degraded");
        lock(&self.state).degraded.push(error);
    }

    fn hold(&self, wake_lock: Box<dyn WakeLock>) {
        lock(&self.state).wake_lock = Some(wake_lock);
    }

    fn set_presenter_active(&self, active: bool) {
        lock(&self.state).presenter_active = active;
    }

    /// Mark the session ended. Only the first caller gets `Some`, carrying
    /// the wake lock (if any) it is now responsible for releasing.
    fn close(&self, reason: EndReason) -> Option<Option<Box<dyn WakeLock>>> {
        let mut state = lock(&self.state);
        if state.ended.is_some() {
            return None;
        }
        state.ended = Some(reason);
        state.presenter_active = false;
        Some(state.wake_lock.take())
    }
}

// ── Service ──────────────────────────────────────────────────────────

struct ActiveSession {
    session: Arc<DeliverySession>,
    auto_stop: JoinHandle<()>,
}

pub struct DeliveryService {
    delivery: DeliveryConfig,
    channel: ChannelConfig,
    platform: Platform,
    presenters: Arc<PresenterSlot>,
    /// Loopback used by the auto-stop timer.
    commands: Arc<dyn PipelineSender>,
    active: Arc<Mutex<Option<ActiveSession>>>,
    channel_registered: AtomicBool,
}

impl DeliveryService {
    pub fn new(
        delivery: DeliveryConfig,
        channel: ChannelConfig,
        platform: Platform,
        presenters: Arc<PresenterSlot>,
        commands: Arc<dyn PipelineSender>,
    ) -> Self {
        Self {
            delivery,
            channel,
            platform,
            presenters,
            commands,
            active: Arc::new(Mutex::new(None)),
            channel_registered: AtomicBool::new(false),
        }
    }

    pub fn active_session(&self) -> Option<Arc<DeliverySession>> {
        lock(&self.active).as_ref().map(|a| a.session.clone())
    }

    /// Decode and apply one message from the command queue.
    pub fn handle_message(&self, message: &Message) -> Result<(), BusError> {
        if message.topic != topics::DELIVERY_COMMAND {
            debug!(topic = %message.topic, "ignoring message on foreign topic");
            return Ok(());
        }
        let command: DeliveryCommand = message.decode()?;
        self.handle_command(command);
        Ok(())
    }

    pub fn handle_command(&self, command: DeliveryCommand) {
        match command {
            DeliveryCommand::Start { payload } => {
                self.start(payload);
            }
            DeliveryCommand::Dismiss { session_id } => {
                self.dismiss(session_id);
            }
            DeliveryCommand::AutoStop { session_id } => {
                self.auto_stop(session_id);
            }
        }
    }

    /// Start a session for `payload`, superseding any active one.
    ///
    /// The auto-stop timer is armed before any resource is touched so the
    /// cleanup path exists whatever happens in the steps below.
    pub fn start(&self, payload: AlarmPayload) -> Arc<DeliverySession> {
        self.end_active(None, EndReason::Superseded);

        let session = Arc::new(DeliverySession::new(payload, &self.delivery));
        let auto_stop = self.arm_auto_stop(&session);
        *lock(&self.active) = Some(ActiveSession {
            session: session.clone(),
            auto_stop,
        });
        info!(
            session_id = %session.id,
            title = %session.payload.title,
            deadline_at = %session.deadline_at,
            "delivery session started"
        );

        if let Err(e) = self.ensure_channel() {
            session.degrade(e);
        }

        match self
            .platform
            .power
            .acquire(&self.delivery.wake_lock_tag, self.delivery.wake_lock_ceiling())
        {
            Ok(wake_lock) => session.hold(wake_lock),
            Err(e) => session.degrade(DeliveryError::resource(Resource::WakeLock, e.to_string())),
        }

        let notification = AlertNotification::urgent(&self.channel.id, &session.payload);
        if let Err(e) = self
            .platform
            .keepalive
            .start_foreground(self.delivery.foreground_notification_id, &notification)
        {
            session.degrade(DeliveryError::resource(Resource::Foreground, e.to_string()));
        }

        let activation = self.presenters.activate(&session.payload, Some(session.id));
        for error in activation.degraded {
            session.degrade(error);
        }
        session.set_presenter_active(true);

        if let Err(e) = self
            .platform
            .notifications
            .post(session.alert_notification_id, &notification)
        {
            session.degrade(DeliveryError::resource(Resource::Notification, e.to_string()));
        }

        if let Err(e) = self.platform.ui.launch(&session.payload) {
            warn!(session_id = %session.id, error = %e, "direct UI launch failed (non-fatal)");
            lock(&session.state)
                .degraded
                .push(DeliveryError::resource(Resource::UrgentUi, e.to_string()));
        }

        session
    }

    /// End the session on user dismissal. A dismissal aimed at a session
    /// that already ended or was superseded is ignored.
    pub fn dismiss(&self, session_id: Uuid) -> bool {
        self.end_active(Some(session_id), EndReason::Dismissed)
    }

    /// End the session when its grace period has elapsed. Stale timers for
    /// sessions that already ended are ignored.
    pub fn auto_stop(&self, session_id: Uuid) -> bool {
        self.end_active(Some(session_id), EndReason::TimedOut)
    }

    fn ensure_channel(&self) -> Result<(), DeliveryError> {
        if self.channel_registered.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.platform
            .notifications
            .ensure_channel(&ChannelSpec::urgent(&self.channel))
            .map_err(|e| DeliveryError::resource(Resource::NotificationChannel, e.to_string()))?;
        self.channel_registered.store(true, Ordering::SeqCst);
        debug!(channel_id = %self.channel.id, "notification channel registered");
        Ok(())
    }

    fn arm_auto_stop(&self, session: &Arc<DeliverySession>) -> JoinHandle<()> {
        let grace = self.delivery.grace_period();
        let commands = self.commands.clone();
        let session = session.clone();
        let keepalive = self.platform.keepalive.clone();
        let active = self.active.clone();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let queued = DeliveryCommand::AutoStop { session_id: session.id }
                .to_message()
                .and_then(|m| commands.try_send(m));
            match queued {
                Ok(()) => debug!(session_id = %session.id, "auto-stop queued"),
                Err(e) => {
                    // No worker to serialize with; the check-and-set still holds.
                    warn!(session_id = %session.id, error = %e, "auto-stop not queued, releasing directly");
                    if let Some(wake_lock) = session.close(EndReason::TimedOut) {
                        release(&session, wake_lock);
                        {
                            let mut active = lock(&active);
                            if active.as_ref().is_some_and(|a| a.session.id == session.id) {
                                active.take();
                            }
                        }
                        if let Err(e) = keepalive.stop_foreground(true) {
                            warn!(session_id = %session.id, error = %e, "failed to leave foreground");
                        }
                    }
                }
            }
        })
    }

    /// Take the active session out of the slot if it matches, then clean it up.
    fn end_active(&self, session_id: Option<Uuid>, reason: EndReason) -> bool {
        let ended = {
            let mut active = lock(&self.active);
            let matches = active
                .as_ref()
                .is_some_and(|a| session_id.map_or(true, |id| id == a.session.id));
            if matches {
                active.take()
            } else {
                None
            }
        };

        let Some(ActiveSession { session, auto_stop }) = ended else {
            debug!(?session_id, ?reason, "no matching active session");
            return false;
        };
        auto_stop.abort();

        let Some(wake_lock) = session.close(reason) else {
            return false;
        };
        release(&session, wake_lock);

        // An untouched alarm keeps alerting until the user acknowledges it.
        // A superseding session takes the presenter over.
        if matches!(reason, EndReason::Dismissed | EndReason::Shutdown) {
            self.presenters.teardown_session(session.id);
        }

        match reason {
            EndReason::Dismissed => {
                self.leave_foreground(&session, false);
                if let Err(e) = self.platform.notifications.clear(session.alert_notification_id) {
                    warn!(session_id = %session.id, error = %e, "failed to clear alert notification");
                }
            }
            EndReason::TimedOut | EndReason::Shutdown => self.leave_foreground(&session, true),
            // The next session takes over foreground status.
            EndReason::Superseded => {}
        }

        info!(session_id = %session.id, ?reason, "delivery session ended");
        true
    }

    fn leave_foreground(&self, session: &DeliverySession, keep_notification: bool) {
        if let Err(e) = self.platform.keepalive.stop_foreground(keep_notification) {
            warn!(session_id = %session.id, error = %e, "failed to leave foreground");
        }
    }
}

fn release(session: &DeliverySession, wake_lock: Option<Box<dyn WakeLock>>) {
    let Some(wake_lock) = wake_lock else {
        return;
    };
    if !wake_lock.is_held() {
        debug!(session_id = %session.id, "wake lock already expired");
        return;
    }
    match wake_lock.release() {
        Ok(()) => debug!(session_id = %session.id, "wake lock released"),
        Err(e) => warn!(session_id = %session.id, error = %e, "wake lock release failed"),
    }
}

#[async_trait]
impl Worker for DeliveryService {
    async fn start(&self) -> Result<(), BusError> {
        info!(
            grace_period_ms = self.delivery.grace_period_ms,
            wake_lock_ceiling_ms = self.delivery.wake_lock_ceiling_ms,
            "delivery service ready"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), BusError> {
        self.end_active(None, EndReason::Shutdown);
        Ok(())
    }
}
