//! WakeTrigger: the handler the OS invokes at the target instant.
//!
//! Two states, `Idle` and `Handoff`. The handoff is a single non-blocking
//! enqueue of [`DeliveryCommand::Start`]; nothing else happens here because
//! the host may reclaim the process as soon as `on_wake` returns.

use std::sync::Arc;

use tracing::{error, info, warn};

use wakebell_bus::PipelineSender;
use wakebell_core::{AlarmPayload, DeliveryError, RequestCode};
use wakebell_platform::WakeHandler;

use crate::delivery::DeliveryCommand;

/// Encode a payload into the opaque bytes carried by a wake registration.
pub fn encode_payload(payload: &AlarmPayload) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(payload)
}

pub struct WakeTrigger {
    commands: Arc<dyn PipelineSender>,
}

impl WakeTrigger {
    pub fn new(commands: Arc<dyn PipelineSender>) -> Self {
        Self { commands }
    }

    /// Extract the payload and queue one start command.
    ///
    /// Undecodable payload bytes fall back to the default payload so the
    /// user still gets an alarm.
    pub fn handoff(&self, code: RequestCode, payload: &[u8]) -> Result<(), DeliveryError> {
        let payload = match rmp_serde::from_slice::<AlarmPayload>(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(request_code = %code, error = %e, "unreadable alarm payload, using defaults");
                AlarmPayload::default()
            }
        };

        let message = DeliveryCommand::Start { payload }
            .to_message()
            .map_err(|e| DeliveryError::Handoff(e.to_string()))?;
        self.commands
            .try_send(message)
            .map_err(|e| DeliveryError::Handoff(e.to_string()))
    }
}

impl WakeHandler for WakeTrigger {
    fn on_wake(&self, code: RequestCode, payload: &[u8]) {
        info!(request_code = %code, "alarm wake received");
        match self.handoff(code, payload) {
            Ok(()) => info!(request_code = %code, "delivery requested"),
            Err(e) => error!(request_code = %code, error = %e, "alarm dropped"),
        }
    }
}
