//! Interfaces to the host OS collaborators used by alarm delivery.
//!
//! This crate provides:
//! - One trait per collaborator: wake scheduling, power management,
//!   notification surface, keepalive, urgent UI, audio output, vibration
//! - `Platform`, the bundle of collaborators handed to the pipeline
//! - `SimHost`, an in-process implementation that records every call and
//!   supports fault injection

pub mod error;
pub mod sim;
pub mod traits;
pub mod types;

pub use error::PlatformError;
pub use sim::{Fault, HostEvent, SimHost};
pub use traits::{
    AudioOutput, KeepAlive, NotificationSurface, Platform, Playback, PowerManager, UrgentUi,
    Vibrator, WakeHandler, WakeLock, WakeRegistration, WakeScheduler,
};
pub use types::{AlertNotification, ChannelSpec, Cue, CueKind, Importance, Priority};
