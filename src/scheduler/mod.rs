//! Periodic retraining driven by a cron schedule

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::JobScheduler;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::{MaintenanceEngine, RetrainHandle};
use crate::error::{EngineError, Result};

/// Runs the engine's retraining pass on a cron schedule
///
/// Every cycle runs under its own cancellation handle, so cancelling an
/// in-flight pass never disables the cycles that follow it.
pub struct RetrainScheduler {
    config: SchedulerConfig,
    scheduler: JobScheduler,
    engine: Arc<MaintenanceEngine>,
    current_run: Arc<Mutex<Option<RetrainHandle>>>,
    running: Arc<RwLock<bool>>,
}

impl RetrainScheduler {
    pub async fn new(config: SchedulerConfig, engine: Arc<MaintenanceEngine>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| EngineError::Internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            config,
            scheduler,
            engine,
            current_run: Arc::new(Mutex::new(None)),
            running: Arc::new(RwLock::new(false)),
        })
    }

    /// Cancel the in-flight retraining pass, if one is running
    ///
    /// The next scheduled cycle starts with a fresh handle.
    pub async fn cancel_current_run(&self) {
        if let Some(handle) = self.current_run.lock().await.as_ref() {
            handle.cancel();
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        if !self.config.enabled {
            info!("Retrain scheduler is disabled in configuration");
            return Ok(());
        }

        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Retrain scheduler is already running");
                return Ok(());
            }
            *running = true;
        }

        let engine = Arc::clone(&self.engine);
        let current_run = Arc::clone(&self.current_run);
        let job = tokio_cron_scheduler::Job::new_async(
            self.config.retrain_cron.as_str(),
            move |_uuid, _lock| {
                let engine = Arc::clone(&engine);
                let current_run = Arc::clone(&current_run);
                Box::pin(async move {
                    let handle = RetrainHandle::new();
                    *current_run.lock().await = Some(handle.clone());
                    info!("Starting scheduled retraining pass");
                    match engine.retrain_all(&handle).await {
                        Ok(trained) => {
                            info!(models = trained.len(), "Scheduled retraining pass finished");
                        }
                        Err(EngineError::Cancelled(reason)) => {
                            info!(%reason, "Scheduled retraining pass cancelled");
                        }
                        Err(e) => {
                            error!(error = %e, "Scheduled retraining pass failed");
                        }
                    }
                    *current_run.lock().await = None;
                })
            },
        )
        .map_err(|e| EngineError::Internal(format!("Invalid retrain schedule: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| EngineError::Internal(format!("Failed to add retrain job: {}", e)))?;

        self.scheduler
            .start()
            .await
            .map_err(|e| EngineError::Internal(format!("Failed to start scheduler: {}", e)))?;

        info!(cron = %self.config.retrain_cron, "Retrain scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        {
            let mut running = self.running.write().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        // Abandon any in-flight training before stopping the clock
        self.cancel_current_run().await;
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| EngineError::Internal(format!("Failed to stop scheduler: {}", e)))?;

        info!("Retrain scheduler shut down");
        Ok(())
    }
}
