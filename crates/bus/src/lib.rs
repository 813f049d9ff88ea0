//! In-process message bus for alarm delivery commands.
//!
//! This crate provides:
//! - `Message` envelope with MessagePack payloads
//! - `PipelineSender` / `PipelineReceiver` traits for one-way work handoff
//! - A bounded channel pipeline that carries encoded envelopes
//! - `Worker` lifecycle runner with a serialized message loop and graceful shutdown

pub mod channel;
pub mod error;
pub mod message;
pub mod topics;
pub mod traits;
pub mod worker;

pub use channel::{pipeline, ChannelReceiver, ChannelSender};
pub use error::BusError;
pub use message::Message;
pub use traits::{PipelineReceiver, PipelineSender};
pub use worker::{Worker, WorkerBuilder, WorkerRunner, WorkerRunnerConfig};
