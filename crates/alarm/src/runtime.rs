//! Wiring of the full pipeline around one command queue.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use wakebell_bus::{pipeline, BusError, PipelineSender, Worker, WorkerBuilder, WorkerRunner};
use wakebell_core::Config;
use wakebell_platform::Platform;

use crate::commands::CommandHandler;
use crate::delivery::{request_dismiss, DeliveryService};
use crate::presenter::PresenterSlot;
use crate::scheduler::AlarmScheduler;
use crate::trigger::WakeTrigger;

/// A running pipeline: scheduler, trigger, delivery worker and presenter
/// slot sharing one platform and one command queue.
pub struct AlarmRuntime {
    platform: Platform,
    scheduler: Arc<AlarmScheduler>,
    presenters: Arc<PresenterSlot>,
    delivery: Arc<DeliveryService>,
    trigger: Arc<WakeTrigger>,
    shutdown: Arc<Notify>,
    worker: JoinHandle<Result<(), BusError>>,
}

impl AlarmRuntime {
    /// Wire everything and spawn the delivery worker. Must be called from
    /// within a tokio runtime.
    pub fn start(config: Config, platform: Platform) -> Self {
        let (tx, rx) = pipeline(config.bus.command_queue_capacity);
        let commands: Arc<dyn PipelineSender> = Arc::new(tx);

        let presenters = Arc::new(PresenterSlot::new(
            &config.presenter,
            platform.audio.clone(),
            platform.vibrator.clone(),
        ));
        let dismiss_commands = commands.clone();
        presenters.on_dismiss(move |session_id| {
            if let Err(e) = request_dismiss(dismiss_commands.as_ref(), session_id) {
                warn!(%session_id, error = %e, "could not forward dismissal to delivery");
            }
        });

        let delivery = Arc::new(DeliveryService::new(
            config.delivery.clone(),
            config.channel.clone(),
            platform.clone(),
            presenters.clone(),
            commands.clone(),
        ));
        let trigger = Arc::new(WakeTrigger::new(commands.clone()));
        let scheduler = Arc::new(AlarmScheduler::new(
            platform.wake.clone(),
            trigger.clone(),
            presenters.clone(),
        ));

        let handler_delivery = delivery.clone();
        let runner_config = WorkerBuilder::new("delivery-service")
            .handle_os_signals(false)
            .on_message(move |message| {
                let delivery = handler_delivery.clone();
                async move { delivery.handle_message(&message) }
            })
            .build();

        let shutdown = Arc::new(Notify::new());
        let worker: Arc<dyn Worker> = delivery.clone();
        let worker = tokio::spawn(WorkerRunner::run(
            worker,
            Arc::new(rx),
            runner_config,
            Some(shutdown.clone()),
        ));

        info!(profile = %config.profile_label(), "alarm runtime started");
        Self {
            platform,
            scheduler,
            presenters,
            delivery,
            trigger,
            shutdown,
            worker,
        }
    }

    pub fn scheduler(&self) -> &Arc<AlarmScheduler> {
        &self.scheduler
    }

    pub fn presenters(&self) -> &Arc<PresenterSlot> {
        &self.presenters
    }

    pub fn delivery(&self) -> &Arc<DeliveryService> {
        &self.delivery
    }

    /// The handler registered for every OS wake.
    pub fn trigger(&self) -> &Arc<WakeTrigger> {
        &self.trigger
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn command_handler(&self) -> CommandHandler {
        CommandHandler::new(self.scheduler.clone(), self.presenters.clone())
    }

    /// The user's dismiss action on the on-screen alert. The owning session,
    /// if any, is ended through the presenter's hook. Returns whether an
    /// alert was stopped.
    pub fn dismiss(&self) -> bool {
        self.presenters.dismiss_current()
    }

    /// Stop the delivery worker. An active session ends with `Shutdown` and
    /// the on-screen presenter is torn down.
    pub async fn shutdown(self) -> Result<(), BusError> {
        self.shutdown.notify_one();
        let result = self
            .worker
            .await
            .map_err(|e| BusError::Handler(format!("delivery worker panicked: {e}")))?;
        self.presenters.teardown_current();
        info!("alarm runtime stopped");
        result
    }
}
