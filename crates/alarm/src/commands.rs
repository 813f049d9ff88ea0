//! Front-end command entry points.
//!
//! A call is `{"method": "...", "args": {...}}`; the reply is either
//! `{"ok": true}` or `{"error": CODE, "message": "..."}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use wakebell_core::{AlarmPayload, AlarmRequest, SchedulingError};

use crate::presenter::PresenterSlot;
use crate::scheduler::AlarmScheduler;

pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";
pub const BAD_REQUEST: &str = "BAD_REQUEST";

/// A decoded front-end call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Default, Deserialize)]
struct AlarmArgs {
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

impl AlarmArgs {
    fn parse(args: Value) -> Result<Self, serde_json::Error> {
        if args.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(args)
    }

    fn payload(&self) -> AlarmPayload {
        AlarmPayload::new(self.title.clone(), self.body.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandReply {
    Success { ok: bool },
    Failure { error: String, message: String },
}

impl CommandReply {
    pub fn ok() -> Self {
        CommandReply::Success { ok: true }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        CommandReply::Failure {
            error: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandReply::Success { ok: true })
    }
}

impl From<SchedulingError> for CommandReply {
    fn from(e: SchedulingError) -> Self {
        CommandReply::error(e.code(), e.to_string())
    }
}

#[derive(Clone)]
pub struct CommandHandler {
    scheduler: Arc<AlarmScheduler>,
    presenters: Arc<PresenterSlot>,
}

impl CommandHandler {
    pub fn new(scheduler: Arc<AlarmScheduler>, presenters: Arc<PresenterSlot>) -> Self {
        Self {
            scheduler,
            presenters,
        }
    }

    pub async fn handle(&self, call: MethodCall) -> CommandReply {
        debug!(method = %call.method, "front-end call");
        match call.method.as_str() {
            "launchAlarm" => match AlarmArgs::parse(call.args) {
                Ok(args) => {
                    self.scheduler
                        .launch_immediate(AlarmRequest::immediate(args.payload()));
                    CommandReply::ok()
                }
                Err(e) => CommandReply::error(BAD_REQUEST, e.to_string()),
            },
            "scheduleAlarm" => {
                let args = match AlarmArgs::parse(call.args) {
                    Ok(args) => args,
                    Err(e) => return SchedulingError::RegistrationFailure(e.to_string()).into(),
                };
                let request = AlarmRequest {
                    payload: args.payload(),
                    fire_at_epoch_millis: args.timestamp,
                };
                match self.scheduler.schedule_alarm(request).await {
                    Ok(_) => CommandReply::ok(),
                    Err(e) => e.into(),
                }
            }
            "dismiss" => self.dismiss(),
            other => {
                warn!(method = %other, "unknown front-end method");
                CommandReply::error(NOT_IMPLEMENTED, format!("unknown method '{other}'"))
            }
        }
    }

    /// Parse one JSON call and produce the JSON reply.
    pub async fn handle_json(&self, raw: &str) -> String {
        let reply = match serde_json::from_str::<MethodCall>(raw) {
            Ok(call) => self.handle(call).await,
            Err(e) => CommandReply::error(BAD_REQUEST, e.to_string()),
        };
        serde_json::to_string(&reply).unwrap_or_else(|e| {
            format!(r#"{{"error":"{BAD_REQUEST}","message":"reply encoding failed: {e}"}}"#)
        })
    }

    /// Dismiss the on-screen alert. Its session, if it has one, is ended by
    /// the presenter's dismiss hook. Dismissing nothing is not an error.
    fn dismiss(&self) -> CommandReply {
        if !self.presenters.dismiss_current() {
            debug!("no alert on screen to dismiss");
        }
        CommandReply::ok()
    }
}
