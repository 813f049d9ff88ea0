//! Bounded in-process pipeline.
//!
//! Envelopes are encoded to bytes on send and decoded on receive, so the
//! consumer never shares memory with the producer.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::BusError;
use crate::message::Message;
use crate::traits::{PipelineReceiver, PipelineSender};

/// Create a pipeline that queues up to `capacity` encoded messages.
pub fn pipeline(capacity: usize) -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSender { tx },
        ChannelReceiver { rx: Mutex::new(rx) },
    )
}

/// Producer side of [`pipeline`]. Cheap to clone.
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<Vec<u8>>,
}

#[async_trait]
impl PipelineSender for ChannelSender {
    async fn send(&self, message: Message) -> Result<(), BusError> {
        let bytes = message.to_wire()?;
        self.tx
            .send(bytes)
            .await
            .map_err(|_| BusError::Closed(message.topic.clone()))?;
        debug!(topic = %message.topic, correlation_id = %message.correlation_id, "message queued");
        Ok(())
    }

    fn try_send(&self, message: Message) -> Result<(), BusError> {
        let bytes = message.to_wire()?;
        self.tx.try_send(bytes).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BusError::Full(message.topic.clone()),
            mpsc::error::TrySendError::Closed(_) => BusError::Closed(message.topic.clone()),
        })?;
        debug!(topic = %message.topic, correlation_id = %message.correlation_id, "message queued");
        Ok(())
    }
}

/// Consumer side of [`pipeline`].
pub struct ChannelReceiver {
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
}

#[async_trait]
impl PipelineReceiver for ChannelReceiver {
    async fn recv(&self) -> Result<Message, BusError> {
        let mut rx = self.rx.lock().await;
        let bytes = rx
            .recv()
            .await
            .ok_or_else(|| BusError::Closed("all senders dropped".to_string()))?;
        Ok(Message::from_wire(&bytes)?)
    }
}
