//! AlarmScheduler: front-end requests to OS wake registrations.

use std::sync::Arc;

use tracing::{error, info, warn};

use wakebell_core::{Ack, AlarmRequest, RequestCode, SchedulingError};
use wakebell_platform::{PlatformError, WakeRegistration, WakeScheduler};

use crate::presenter::PresenterSlot;
use crate::trigger::{encode_payload, WakeTrigger};

pub struct AlarmScheduler {
    wake: Arc<dyn WakeScheduler>,
    trigger: Arc<WakeTrigger>,
    presenters: Arc<PresenterSlot>,
}

impl AlarmScheduler {
    pub fn new(
        wake: Arc<dyn WakeScheduler>,
        trigger: Arc<WakeTrigger>,
        presenters: Arc<PresenterSlot>,
    ) -> Self {
        Self {
            wake,
            trigger,
            presenters,
        }
    }

    /// Register one exact wake callback for `request`.
    ///
    /// The registration is keyed by the request code, so scheduling the same
    /// instant again replaces the pending one. Without the exact-timing
    /// capability nothing is registered.
    pub async fn schedule_alarm(&self, request: AlarmRequest) -> Result<Ack, SchedulingError> {
        let Some(fire_at_epoch_millis) = request.fire_at_epoch_millis else {
            warn!("schedule request without a fire time");
            return Err(SchedulingError::RegistrationFailure(
                "fire time (epoch millis) is required".to_string(),
            ));
        };

        if !self.wake.can_schedule_exact() {
            warn!(fire_at_epoch_millis, "exact alarm capability not granted");
            return Err(SchedulingError::PermissionDenied);
        }

        let code = RequestCode::from_epoch_millis(fire_at_epoch_millis);
        let payload = encode_payload(&request.payload)
            .map_err(|e| SchedulingError::RegistrationFailure(e.to_string()))?;

        self.wake
            .register(WakeRegistration {
                code,
                fire_at_epoch_millis,
                payload,
                handler: self.trigger.clone(),
            })
            .await
            .map_err(|e| {
                error!(request_code = %code, error = %e, "wake registration failed");
                match e {
                    PlatformError::PermissionDenied(_) => SchedulingError::PermissionDenied,
                    other => SchedulingError::RegistrationFailure(other.to_string()),
                }
            })?;

        info!(
            request_code = %code,
            fire_at_epoch_millis,
            title = %request.payload.title,
            "alarm scheduled"
        );
        Ok(Ack {
            request_code: Some(code),
            fire_at_epoch_millis: Some(fire_at_epoch_millis),
        })
    }

    /// Show the alert now, bypassing the OS timer. Downstream failures only
    /// degrade the alert, so this always acknowledges.
    pub fn launch_immediate(&self, request: AlarmRequest) -> Ack {
        let activation = self.presenters.activate(&request.payload, None);
        for degraded in &activation.degraded {
            warn!(error = %degraded, "immediate alarm degraded");
        }
        info!(
            presenter_id = %activation.presenter.id(),
            title = %request.payload.title,
            "alarm launched"
        );
        Ack::immediate()
    }
}
