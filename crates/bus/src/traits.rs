use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BusError;
use crate::message::Message;

/// Sends work items into a one-way pipeline.
///
/// `try_send` never waits; it is the only call allowed from handlers that
/// must return immediately (e.g. an OS wake callback).
#[async_trait]
pub trait PipelineSender: Send + Sync {
    /// Push a message, waiting for queue space if the pipeline is full.
    async fn send(&self, message: Message) -> Result<(), BusError>;

    /// Push a message without waiting. Fails if the pipeline is full or closed.
    fn try_send(&self, message: Message) -> Result<(), BusError>;
}

/// Blanket implementation so `Arc<dyn PipelineSender>` can be used directly.
#[async_trait]
impl<T: PipelineSender + ?Sized> PipelineSender for Arc<T> {
    async fn send(&self, message: Message) -> Result<(), BusError> {
        (**self).send(message).await
    }

    fn try_send(&self, message: Message) -> Result<(), BusError> {
        (**self).try_send(message)
    }
}

/// Receives work items from a pipeline.
#[async_trait]
pub trait PipelineReceiver: Send + Sync {
    /// Pull the next message. Blocks until one is available; fails once
    /// every sender is gone and the queue is drained.
    async fn recv(&self) -> Result<Message, BusError>;
}
