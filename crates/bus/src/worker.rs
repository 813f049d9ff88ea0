//! Worker trait and lifecycle management.
//!
//! Provides the [`Worker`] trait for long-running consumers, [`WorkerBuilder`]
//! for fluent configuration, and [`WorkerRunner`] which drives a serialized
//! message loop: one message is handled to completion before the next is
//! pulled, so handlers never race each other.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::BusError;
use crate::message::{Message, ENVELOPE_VERSION};
use crate::traits::PipelineReceiver;

// ── Worker trait ─────────────────────────────────────────────────────

/// A long-running consumer of pipeline messages.
///
/// Implementors define their startup/shutdown logic. The [`WorkerRunner`]
/// handles the message loop and signal handling.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Called once before the first message is pulled.
    async fn start(&self) -> Result<(), BusError>;

    /// Called once during graceful shutdown. Release everything still held.
    async fn stop(&self) -> Result<(), BusError>;
}

// ── Message handler type ─────────────────────────────────────────────

/// Boxed async function that handles an incoming message.
pub type MessageHandler =
    Box<dyn Fn(Message) -> Pin<Box<dyn Future<Output = Result<(), BusError>> + Send>> + Send + Sync>;

// ── WorkerBuilder ────────────────────────────────────────────────────

/// Fluent builder for configuring a [`WorkerRunner`].
///
/// # Example
/// ```ignore
/// let runner = WorkerBuilder::new("delivery")
///     .shutdown_timeout(Duration::from_secs(2))
///     .on_message(|msg| async move {
///         println!("got: {}", msg.topic);
///         Ok(())
///     })
///     .build();
/// ```
pub struct WorkerBuilder {
    name: String,
    shutdown_timeout: Duration,
    message_handler: Option<MessageHandler>,
    handle_os_signals: bool,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shutdown_timeout: Duration::from_secs(5),
            message_handler: None,
            handle_os_signals: true,
        }
    }

    /// Set the maximum time to wait for `stop()` during shutdown (default: 5s).
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Register a handler for incoming messages.
    pub fn on_message<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BusError>> + Send + 'static,
    {
        self.message_handler = Some(Box::new(move |msg| Box::pin(handler(msg))));
        self
    }

    /// Whether SIGINT/SIGTERM also trigger shutdown (default: true).
    /// Embedded runners turn this off and rely on the notify handle alone.
    pub fn handle_os_signals(mut self, enabled: bool) -> Self {
        self.handle_os_signals = enabled;
        self
    }

    /// Build the runner configuration.
    pub fn build(self) -> WorkerRunnerConfig {
        WorkerRunnerConfig {
            name: self.name,
            shutdown_timeout: self.shutdown_timeout,
            message_handler: self.message_handler,
            handle_os_signals: self.handle_os_signals,
        }
    }
}

// ── WorkerRunnerConfig ───────────────────────────────────────────────

/// Configuration produced by [`WorkerBuilder`], consumed by [`WorkerRunner`].
pub struct WorkerRunnerConfig {
    pub name: String,
    pub shutdown_timeout: Duration,
    pub message_handler: Option<MessageHandler>,
    pub handle_os_signals: bool,
}

// ── WorkerRunner ─────────────────────────────────────────────────────

/// Runs a [`Worker`] against a pipeline until shutdown.
///
/// 1. calls `start()`
/// 2. pulls and handles messages one at a time
/// 3. on shutdown signal (or pipeline closure) calls `stop()` under a timeout
pub struct WorkerRunner;

impl WorkerRunner {
    /// Run a worker to completion.
    ///
    /// Returns when `shutdown_notify` fires, an OS signal arrives (if enabled),
    /// or every sender of the pipeline has been dropped.
    pub async fn run(
        worker: Arc<dyn Worker>,
        receiver: Arc<dyn PipelineReceiver>,
        config: WorkerRunnerConfig,
        shutdown_notify: Option<Arc<Notify>>,
    ) -> Result<(), BusError> {
        let worker_name = config.name.clone();
        info!(worker = %worker_name, "starting worker");

        worker.start().await?;
        info!(worker = %worker_name, "worker started");

        let shutdown = Arc::new(Notify::new());

        let sig_shutdown = shutdown.clone();
        let sig_name = worker_name.clone();
        let handle_os_signals = config.handle_os_signals;
        let signal_handle = tokio::spawn(async move {
            Self::wait_for_shutdown(shutdown_notify, handle_os_signals).await;
            info!(worker = %sig_name, "shutdown signal received");
            sig_shutdown.notify_one();
        });

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                received = receiver.recv() => match received {
                    Ok(message) => Self::dispatch(&worker_name, &config, message).await,
                    Err(BusError::Closed(reason)) => {
                        info!(worker = %worker_name, reason = %reason, "pipeline closed");
                        break;
                    }
                    Err(e) => {
                        warn!(worker = %worker_name, error = %e, "failed to receive message");
                    }
                },
            }
        }

        signal_handle.abort();

        info!(worker = %worker_name, timeout = ?config.shutdown_timeout, "stopping worker");
        match tokio::time::timeout(config.shutdown_timeout, worker.stop()).await {
            Ok(Ok(())) => {
                info!(worker = %worker_name, "worker stopped gracefully");
            }
            Ok(Err(e)) => {
                warn!(worker = %worker_name, error = %e, "worker stop returned error");
            }
            Err(_) => {
                warn!(worker = %worker_name, "worker stop timed out, forcing shutdown");
            }
        }

        info!(worker = %worker_name, "worker shutdown complete");
        Ok(())
    }

    async fn dispatch(worker_name: &str, config: &WorkerRunnerConfig, message: Message) {
        let Some(handler) = &config.message_handler else {
            debug!(worker = %worker_name, topic = %message.topic, "no handler registered, dropping message");
            return;
        };
        let topic = message.topic.clone();
        let correlation_id = message.correlation_id;
        if !message.is_supported() {
            warn!(
                worker = %worker_name,
                topic = %topic,
                correlation_id = %correlation_id,
                version = message.version,
                supported = ENVELOPE_VERSION,
                "dropping message with unsupported envelope version"
            );
            return;
        }
        debug!(
            worker = %worker_name,
            topic = %topic,
            correlation_id = %correlation_id,
            waited_ms = message.waited().num_milliseconds(),
            "dispatching message"
        );
        if let Err(e) = handler(message).await {
            warn!(
                worker = %worker_name,
                topic = %topic,
                correlation_id = %correlation_id,
                error = %e,
                "message handler failed"
            );
        }
    }

    /// Wait for either an OS shutdown signal or a programmatic notification.
    async fn wait_for_shutdown(external: Option<Arc<Notify>>, handle_os_signals: bool) {
        match (external, handle_os_signals) {
            (Some(notify), true) => {
                tokio::select! {
                    _ = Self::os_signal() => {}
                    _ = notify.notified() => {}
                }
            }
            (Some(notify), false) => notify.notified().await,
            (None, true) => Self::os_signal().await,
            (None, false) => std::future::pending::<()>().await,
        }
    }

    /// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
    async fn os_signal() {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                _ => {
                    warn!("failed to register signal handlers");
                    std::future::pending::<()>().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl_c");
                std::future::pending::<()>().await;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
