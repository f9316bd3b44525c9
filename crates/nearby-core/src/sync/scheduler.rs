//! Background task scheduler.
//!
//! Runs two recurring tasks:
//! - Index sync: apply change-log batches, fixed delay between runs
//! - Hot-zone refresh: reload the hot-zone directory, fixed rate

use super::synchronizer::IndexSynchronizer;
use crate::config::IndexSyncConfig;
use crate::health::{Component, HealthCheck};
use crate::hotzone::HotZoneDirectory;
use crate::metrics::ProximityMetrics;
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const INDEX_SYNC_TASK: &str = "index_sync";
pub const HOT_ZONE_REFRESH_TASK: &str = "hot_zone_refresh";

/// Status of a scheduled task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Waiting for the next run
    Idle,
    Running,
    Completed { duration: Duration },
    Failed { error: String },
    Disabled,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Completed { .. } => "completed",
            TaskStatus::Failed { .. } => "failed",
            TaskStatus::Disabled => "disabled",
        }
    }
}

/// Information about a scheduled task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: String,
    pub status: TaskStatus,
    pub last_run: Option<Instant>,
    pub success_count: u64,
    pub failure_count: u64,
}

/// Drives the index synchronizer and the hot-zone refresh.
pub struct SyncScheduler {
    config: IndexSyncConfig,
    refresh_interval: Duration,
    synchronizer: Arc<IndexSynchronizer>,
    directory: Arc<HotZoneDirectory>,
    health: Arc<HealthCheck>,
    metrics: Arc<ProximityMetrics>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: RwLock<HashMap<String, TaskInfo>>,
    handles: RwLock<Vec<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(
        config: IndexSyncConfig,
        refresh_interval: Duration,
        synchronizer: Arc<IndexSynchronizer>,
        directory: Arc<HotZoneDirectory>,
        health: Arc<HealthCheck>,
        metrics: Arc<ProximityMetrics>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            refresh_interval,
            synchronizer,
            directory,
            health,
            metrics,
            shutdown_tx,
            tasks: RwLock::new(HashMap::new()),
            handles: RwLock::new(Vec::new()),
        }
    }

    /// Start both background tasks.
    pub async fn start(self: Arc<Self>) {
        info!("Starting sync scheduler");

        if self.config.enabled {
            self.register_task(INDEX_SYNC_TASK, TaskStatus::Idle);
            let handle = self.spawn_index_sync_task();
            self.handles.write().push(handle);
        } else {
            self.register_task(INDEX_SYNC_TASK, TaskStatus::Disabled);
        }

        self.register_task(HOT_ZONE_REFRESH_TASK, TaskStatus::Idle);
        let handle = self.spawn_hot_zone_refresh_task();
        self.handles.write().push(handle);

        info!(
            index_sync = self.config.enabled,
            delay_ms = self.config.delay_ms,
            batch_size = self.config.batch_size,
            refresh_interval_secs = self.refresh_interval.as_secs(),
            "Sync scheduler started"
        );
    }

    /// Signal shutdown and wait for the tasks to finish.
    pub async fn stop(&self) {
        info!("Stopping sync scheduler");

        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = std::mem::take(&mut *self.handles.write());
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
        }
        self.health.sync_loop_stopped();

        info!("Sync scheduler stopped");
    }

    fn register_task(&self, name: &str, status: TaskStatus) {
        let info = TaskInfo {
            name: name.to_string(),
            status,
            last_run: None,
            success_count: 0,
            failure_count: 0,
        };
        self.tasks.write().insert(name.to_string(), info);
    }

    fn update_task_status(&self, name: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.write().get_mut(name) {
            match &status {
                TaskStatus::Completed { .. } => {
                    task.success_count += 1;
                    task.last_run = Some(Instant::now());
                }
                TaskStatus::Failed { .. } => {
                    task.failure_count += 1;
                    task.last_run = Some(Instant::now());
                }
                _ => {}
            }
            task.status = status;
        }
    }

    pub fn get_task_statuses(&self) -> HashMap<String, TaskInfo> {
        self.tasks.read().clone()
    }

    pub fn get_task_status(&self, name: &str) -> Option<TaskInfo> {
        self.tasks.read().get(name).cloned()
    }

    /// Fixed delay: the next batch starts `delay_ms` after the previous one
    /// finished. The first batch runs immediately.
    fn spawn_index_sync_task(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let delay = Duration::from_millis(self.config.delay_ms);

        tokio::spawn(async move {
            scheduler.health.sync_loop_started();
            loop {
                scheduler.run_index_sync().await;

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => {
                        debug!("Index sync task received shutdown signal");
                        break;
                    }
                }
            }
            scheduler.health.sync_loop_stopped();
        })
    }

    fn spawn_hot_zone_refresh_task(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = self.refresh_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            // the directory was loaded at startup
            interval_timer.tick().await;

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        scheduler.run_hot_zone_refresh().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Hot zone refresh task received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    async fn run_index_sync(&self) {
        self.update_task_status(INDEX_SYNC_TASK, TaskStatus::Running);
        let start = Instant::now();

        match self.synchronizer.sync_once(self.config.batch_size).await {
            Ok(processed) => {
                let duration = start.elapsed();
                debug!(
                    processed,
                    duration_ms = duration.as_millis() as u64,
                    "Index sync run completed"
                );
                self.health.mark_healthy(Component::IndexSync);
                self.update_task_status(INDEX_SYNC_TASK, TaskStatus::Completed { duration });
            }
            Err(e) => {
                error!(error = %e, "Index sync run failed");
                self.metrics.record_error(&e);
                self.health
                    .mark_degraded(Component::IndexSync, &e.to_string());
                self.update_task_status(
                    INDEX_SYNC_TASK,
                    TaskStatus::Failed {
                        error: e.to_string(),
                    },
                );
            }
        }

        // backlog gauges are best effort
        if let Err(e) = self.synchronizer.backlog().await {
            debug!(error = %e, "Failed to read change log backlog");
        }
    }

    async fn run_hot_zone_refresh(&self) {
        self.update_task_status(HOT_ZONE_REFRESH_TASK, TaskStatus::Running);
        let start = Instant::now();

        match self.directory.refresh().await {
            Ok(count) => {
                self.metrics.set_hot_zone_count(count);
                self.health.mark_healthy(Component::HotZones);
                self.update_task_status(
                    HOT_ZONE_REFRESH_TASK,
                    TaskStatus::Completed {
                        duration: start.elapsed(),
                    },
                );
            }
            Err(e) => {
                error!(error = %e, "Hot zone refresh failed, keeping previous zones");
                self.metrics.record_hot_zone_refresh_failure();
                self.metrics.record_error(&e);
                self.health
                    .mark_degraded(Component::HotZones, &e.to_string());
                self.update_task_status(
                    HOT_ZONE_REFRESH_TASK,
                    TaskStatus::Failed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    /// Run one sync batch now. Waits for any batch already in flight.
    pub async fn trigger_sync(&self, max_events: usize) -> Result<usize> {
        self.synchronizer.sync_once(max_events).await
    }

    /// Reload hot zones now.
    pub async fn trigger_hot_zone_refresh(&self) -> Result<usize> {
        let count = self.directory.refresh().await?;
        self.metrics.set_hot_zone_count(count);
        Ok(count)
    }

    pub fn synchronizer(&self) -> &Arc<IndexSynchronizer> {
        &self.synchronizer
    }
}
