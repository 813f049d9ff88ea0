//! End-to-end delivery through the full runtime on virtual time.

use std::time::Duration;

use chrono::Utc;

use wakebell_alarm::{AlarmRuntime, EndReason, PresenterState};
use wakebell_core::{AlarmPayload, AlarmRequest, Config, RequestCode, SchedulingError};
use wakebell_platform::{Fault, HostEvent, SimHost};

fn start() -> (SimHost, AlarmRuntime) {
    let host = SimHost::new();
    let runtime = AlarmRuntime::start(Config::default(), host.platform());
    (host, runtime)
}

fn wake_up() -> AlarmPayload {
    AlarmPayload::new(Some("Wake up".into()), Some("Meeting at 9".into()))
}

fn in_millis(ms: i64) -> i64 {
    Utc::now().timestamp_millis() + ms
}

fn sessions_started(host: &SimHost) -> usize {
    host.count(|e| matches!(e, HostEvent::WakeLockAcquired { .. }))
}

#[tokio::test(start_paused = true)]
async fn scheduled_alarm_starts_exactly_one_session_with_payload() {
    let (host, runtime) = start();
    runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(wake_up(), in_millis(5_000)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert_eq!(sessions_started(&host), 0);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(sessions_started(&host), 1);
    let session = runtime.delivery().active_session().unwrap();
    assert_eq!(session.payload, wake_up());

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rescheduling_same_instant_fires_once() {
    let (host, runtime) = start();
    let fire_at = in_millis(3_000);

    for _ in 0..2 {
        runtime
            .scheduler()
            .schedule_alarm(AlarmRequest::new(wake_up(), fire_at))
            .await
            .unwrap();
    }
    assert_eq!(
        runtime.platform().wake.pending(),
        vec![RequestCode::from_epoch_millis(fire_at)]
    );

    tokio::time::sleep(Duration::from_millis(5_000)).await;
    assert_eq!(host.count(|e| matches!(e, HostEvent::WakeFired { .. })), 1);
    assert_eq!(sessions_started(&host), 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dismiss_before_grace_period_releases_once() {
    let (host, runtime) = start();
    runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(wake_up(), in_millis(1_000)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    let session = runtime.delivery().active_session().unwrap();

    assert!(runtime.dismiss());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.end_reason(), Some(EndReason::Dismissed));
    assert_eq!(host.count(|e| matches!(e, HostEvent::WakeLockReleased { .. })), 1);

    // Well past the grace period and the wake-lock ceiling.
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(host.count(|e| matches!(e, HostEvent::WakeLockReleased { .. })), 1);
    assert_eq!(host.count(|e| matches!(e, HostEvent::WakeLockExpired { .. })), 0);
    assert_eq!(host.count(|e| matches!(e, HostEvent::AudioReleased)), 1);
    assert_eq!(
        host.count(|e| matches!(e, HostEvent::NotificationCleared { id } if *id == session.alert_notification_id)),
        1
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn untouched_session_ends_within_grace_period() {
    let (host, runtime) = start();
    runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(wake_up(), in_millis(1_000)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let session = runtime.delivery().active_session().unwrap();
    assert!(session.wake_lock_held());

    tokio::time::sleep(Duration::from_millis(9_000)).await;
    assert!(session.is_active());

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(session.end_reason(), Some(EndReason::TimedOut));
    assert!(!session.wake_lock_held());
    assert_eq!(host.held_wake_locks(), 0);
    assert!(runtime.delivery().active_session().is_none());
    assert_eq!(
        host.count(|e| matches!(e, HostEvent::ForegroundStopped { keep_notification: true })),
        1
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn end_to_end_wake_up_meeting_at_nine() {
    let (host, runtime) = start();
    let handler = runtime.command_handler();
    let raw = format!(
        r#"{{"method":"scheduleAlarm","args":{{"timestamp":{},"title":"Wake up","body":"Meeting at 9"}}}}"#,
        in_millis(2_000)
    );
    assert_eq!(handler.handle_json(&raw).await, r#"{"ok":true}"#);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(
        host.count(|e| matches!(
            e,
            HostEvent::NotificationPosted { title, body, full_screen: true, .. }
                if title == "Wake up" && body == "Meeting at 9"
        )),
        1
    );
    let presenter = runtime.presenters().current().unwrap();
    assert_eq!(presenter.state(), PresenterState::Alerting);
    assert_eq!(presenter.view().title, "Wake up");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(runtime.delivery().active_session().is_none());
    assert_eq!(host.held_wake_locks(), 0);

    // The alarm rings on after the session times out, until acknowledged.
    assert_eq!(presenter.state(), PresenterState::Alerting);
    assert_eq!(host.count(|e| matches!(e, HostEvent::AudioStopped)), 0);
    assert_eq!(handler.handle_json(r#"{"method":"dismiss"}"#).await, r#"{"ok":true}"#);
    assert_eq!(presenter.state(), PresenterState::Dismissed);
    assert_eq!(host.count(|e| matches!(e, HostEvent::AudioReleased)), 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn second_alarm_supersedes_the_first() {
    let (host, runtime) = start();
    let other = AlarmPayload::new(Some("Second".into()), None);
    runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(wake_up(), in_millis(1_000)))
        .await
        .unwrap();
    runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(other.clone(), in_millis(4_000)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let first = runtime.delivery().active_session().unwrap();

    tokio::time::sleep(Duration::from_millis(3_000)).await;
    let second = runtime.delivery().active_session().unwrap();
    assert_eq!(first.end_reason(), Some(EndReason::Superseded));
    assert_eq!(second.payload, other);
    assert_eq!(host.held_wake_locks(), 1);
    assert_eq!(runtime.presenters().current().unwrap().payload(), &other);

    runtime.shutdown().await.unwrap();
    assert_eq!(host.held_wake_locks(), 0);
}

#[tokio::test(start_paused = true)]
async fn permission_denied_is_surfaced_and_nothing_fires() {
    let (host, runtime) = start();
    host.set_exact_alarms_allowed(false);

    let err = runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(wake_up(), in_millis(1_000)))
        .await
        .unwrap_err();
    assert_eq!(err, SchedulingError::PermissionDenied);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sessions_started(&host), 0);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn past_instant_fires_immediately() {
    let (host, runtime) = start();
    runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(wake_up(), in_millis(-60_000)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(sessions_started(&host), 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_resources_still_give_the_user_a_signal() {
    let (host, runtime) = start();
    host.inject(Fault::WakeLock);
    host.inject(Fault::Audio);
    host.inject(Fault::UrgentUi);

    runtime
        .scheduler()
        .schedule_alarm(AlarmRequest::new(wake_up(), in_millis(1_000)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(host.count(|e| matches!(e, HostEvent::NotificationPosted { .. })), 1);
    assert_eq!(host.count(|e| matches!(e, HostEvent::VibrationStarted { .. })), 1);
    let session = runtime.delivery().active_session().unwrap();
    assert!(!session.wake_lock_held());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.end_reason(), Some(EndReason::TimedOut));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn launch_alarm_bypasses_the_timer() {
    let (host, runtime) = start();
    let handler = runtime.command_handler();

    let reply = handler
        .handle_json(r#"{"method":"launchAlarm","args":{"title":"Test"}}"#)
        .await;
    assert_eq!(reply, r#"{"ok":true}"#);
    assert_eq!(host.count(|e| matches!(e, HostEvent::WakeRegistered { .. })), 0);

    let presenter = runtime.presenters().current().unwrap();
    assert_eq!(presenter.payload().title, "Test");
    assert_eq!(presenter.payload().body, "Time to wake up!");

    assert_eq!(handler.handle_json(r#"{"method":"dismiss"}"#).await, r#"{"ok":true}"#);
    assert_eq!(presenter.state(), PresenterState::Dismissed);

    runtime.shutdown().await.unwrap();
}
