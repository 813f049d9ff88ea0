//! Alarm delivery pipeline.
//!
//! ```text
//! AlarmScheduler ──(OS wake)──► WakeTrigger ──(command queue)──► DeliveryService ──► AlertPresenter
//! ```
//!
//! - [`scheduler::AlarmScheduler`] turns a request into one exact OS wake registration
//! - [`trigger::WakeTrigger`] is the OS callback; it only queues a start command
//! - [`delivery::DeliveryService`] runs one bounded delivery session at a time
//! - [`presenter::AlertPresenter`] loops sound and vibration until dismissed
//! - [`commands::CommandHandler`] is the front-end entry point
//! - [`runtime::AlarmRuntime`] wires the pieces together

pub mod commands;
pub mod delivery;
pub mod presenter;
pub mod runtime;
pub mod scheduler;
pub mod trigger;

pub use commands::{CommandHandler, CommandReply};
pub use delivery::{DeliveryCommand, DeliveryService, DeliverySession, EndReason};
pub use presenter::{AlertPresenter, PresenterSlot, PresenterState};
pub use runtime::AlarmRuntime;
pub use scheduler::AlarmScheduler;
pub use trigger::WakeTrigger;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
