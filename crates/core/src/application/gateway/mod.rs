// Gateway Service - job queue, single queue worker, lifecycle and notifications

pub mod constants;
pub mod queue;

#[cfg(test)]
mod tests;

use constants::*;
pub use queue::{JobQueue, QueueClosed};

use crate::application::backend::GatewayBackend;
use crate::domain::{
    JobId, JobState, JobView, NotificationBuilder, ObdCommandJob, NOTIFICATION_ID,
    STATUS_NOTIFICATION_ID,
};
use crate::error::{AppError, Result};
use crate::port::{Notifier, StateListener, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Counters since the service was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayStats {
    pub queued: u64,
    pub completed: u64,
    pub failed: u64,
    pub queue_errors: u64,
    pub cleared: u64,
}

#[derive(Default)]
struct StatsCounters {
    queued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    queue_errors: AtomicU64,
    cleared: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            queued: self.queued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
        }
    }
}

struct GatewayInner {
    backend: Arc<dyn GatewayBackend>,
    notifier: Arc<dyn Notifier>,
    time_provider: Arc<dyn TimeProvider>,
    listener: RwLock<Option<Arc<dyn StateListener>>>,

    queue: JobQueue,
    queue_counter: AtomicU64,
    is_running: AtomicBool,
    /// Set while a worker owns the queue. Only a successful
    /// compare-exchange from false may spawn a worker.
    is_queue_running: AtomicBool,
    stats: StatsCounters,

    /// Serializes start_service / stop_service / on_destroy
    lifecycle: tokio::sync::Mutex<()>,
    runtime: Handle,
}

/// Background gateway between API clients and the OBD adapter.
///
/// Clients queue [`ObdCommandJob`]s; a single worker task runs them one at a
/// time through the [`GatewayBackend`] and reports every finished job to the
/// [`StateListener`] set with [`GatewayService::set_context`].
///
/// The handle is cheap to clone; all clones share one service instance.
#[derive(Clone)]
pub struct GatewayService {
    inner: Arc<GatewayInner>,
}

impl GatewayService {
    /// Create a gateway service.
    ///
    /// Must be called from within a tokio runtime; the queue worker is
    /// spawned onto that runtime.
    pub fn new(
        backend: Arc<dyn GatewayBackend>,
        notifier: Arc<dyn Notifier>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::Internal(format!("gateway requires a tokio runtime: {}", e)))?;

        Ok(Self {
            inner: Arc::new(GatewayInner {
                backend,
                notifier,
                time_provider,
                listener: RwLock::new(None),
                queue: JobQueue::new(),
                queue_counter: AtomicU64::new(0),
                is_running: AtomicBool::new(false),
                is_queue_running: AtomicBool::new(false),
                stats: StatsCounters::default(),
                lifecycle: tokio::sync::Mutex::new(()),
                runtime,
            }),
        })
    }

    /// Handle to this service instance
    pub fn bind(&self) -> GatewayService {
        self.clone()
    }

    pub fn on_create(&self) {
        debug!("Creating service..");
        debug!("Service created.");
    }

    /// Stop the device session, refuse further jobs and remove the service
    /// notification. Jobs already queued are still drained by the worker.
    pub async fn on_destroy(&self) {
        debug!("Destroying service...");
        if self.is_running() {
            self.stop_service().await;
        }
        self.inner.queue.close();
        self.inner.notifier.cancel(NOTIFICATION_ID);
        debug!("Service destroyed.");
    }

    /// True while the device session is up
    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    /// True while a worker is draining the queue
    pub fn is_queue_running(&self) -> bool {
        self.inner.is_queue_running.load(Ordering::SeqCst)
    }

    /// True iff no job is waiting for execution
    pub fn queue_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    pub fn pending_jobs(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn stats(&self) -> GatewayStats {
        self.inner.stats.snapshot()
    }

    /// Install the listener that receives every executed job
    pub fn set_context(&self, listener: Arc<dyn StateListener>) {
        *self
            .inner
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// Add a job to the queue, setting its ID from the internal counter.
    ///
    /// A job the queue refuses comes back in `QUEUE_ERROR` state; nothing is
    /// returned as an error. A worker is started if none is running.
    pub fn queue_job(&self, mut job: ObdCommandJob) -> JobView {
        let id: JobId = self.inner.queue_counter.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Adding job[{}] to queue..", id);

        let now = self.inner.time_provider.now_millis();
        job.id = Some(id);
        job.queued_at = Some(now);

        let view = job.view();
        let view = match self.inner.queue.push(job) {
            Ok(()) => {
                self.inner.stats.queued.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = id, "Job queued successfully.");
                view
            }
            Err(QueueClosed(mut job)) => {
                job.fail_queue(QUEUE_CLOSED_MESSAGE, now);
                self.inner.stats.queue_errors.fetch_add(1, Ordering::Relaxed);
                error!(job_id = id, "Failed to queue job.");
                job.view()
            }
        };

        self.ensure_worker();
        view
    }

    /// Show a notification about the service.
    ///
    /// `notify` selects the cancelable service notification
    /// ([`NOTIFICATION_ID`]) over the transient status one.
    pub fn show_notification(
        &self,
        title: &str,
        text: &str,
        icon: i32,
        ongoing: bool,
        notify: bool,
        vibrate: bool,
    ) {
        let notification = NotificationBuilder::new(title, text)
            .icon(icon)
            .when(self.inner.time_provider.now_millis())
            .ongoing(ongoing)
            .vibrate(vibrate)
            .build();

        let id = if notify {
            NOTIFICATION_ID
        } else {
            STATUS_NOTIFICATION_ID
        };
        debug!(notification_id = id, title, text, "Showing notification");
        self.inner.notifier.notify(id, &notification);
    }

    /// Open the device session and queue the backend's init commands.
    pub async fn start_service(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        if self.inner.queue.is_closed() {
            return Err(AppError::InvalidState(
                "gateway service was destroyed".to_string(),
            ));
        }
        if self.is_running() {
            if self.inner.backend.is_connected().await {
                warn!("Service already running");
                return Ok(());
            }
            warn!("OBD session was lost, reconnecting");
        }

        info!("Starting service..");
        self.show_notification(
            NOTIFICATION_TITLE,
            "Starting OBD connection..",
            ICON_STATUS,
            true,
            true,
            false,
        );

        if let Err(e) = self.inner.backend.start().await {
            error!(error = %e, "Failed to start OBD connection");
            self.stop_locked().await;
            self.show_notification(
                NOTIFICATION_TITLE,
                &format!("Could not connect to OBD adapter: {}", e),
                ICON_ERROR,
                false,
                false,
                true,
            );
            return Err(e);
        }

        self.inner.is_running.store(true, Ordering::SeqCst);

        let init_commands = self.inner.backend.init_commands();
        debug!(count = init_commands.len(), "Queueing adapter init commands");
        for command in init_commands {
            self.queue_job(ObdCommandJob::new(command));
        }

        self.show_notification(
            NOTIFICATION_TITLE,
            "Connected to OBD adapter",
            ICON_STATUS,
            true,
            true,
            false,
        );
        info!("Service started.");
        Ok(())
    }

    /// Drop pending jobs, close the device session and remove the service
    /// notification. A job already running is not interrupted.
    pub async fn stop_service(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.stop_locked().await;
    }

    async fn stop_locked(&self) {
        info!("Stopping service..");

        let now = self.inner.time_provider.now_millis();
        let cleared = self.inner.queue.drain();
        let cleared_count = cleared.len();
        for mut job in cleared {
            job.fail_queue(QUEUE_CLEARED_MESSAGE, now);
            self.report(&job);
        }
        self.inner
            .stats
            .cleared
            .fetch_add(cleared_count as u64, Ordering::Relaxed);

        if let Err(e) = self.inner.backend.stop().await {
            warn!(error = %e, "Error while closing OBD connection");
        }

        self.inner.is_running.store(false, Ordering::SeqCst);
        self.inner.notifier.cancel(NOTIFICATION_ID);
        info!(cleared_jobs = cleared_count, "Service stopped.");
    }

    /// Wait until no job is pending and no worker is running.
    /// Returns false on timeout.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            while !self.queue_empty() || self.is_queue_running() {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }

    fn ensure_worker(&self) {
        if self.try_claim_queue() {
            let service = self.clone();
            self.inner.runtime.spawn(async move {
                service.execute_queue().await;
            });
        }
    }

    fn try_claim_queue(&self) -> bool {
        self.inner
            .is_queue_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Worker body: drain the queue, then release it
    async fn execute_queue(&self) {
        debug!("Executing queue..");
        loop {
            if let Some(job) = self.inner.queue.pop() {
                self.run_job(job).await;
                continue;
            }

            self.inner.is_queue_running.store(false, Ordering::SeqCst);
            // An enqueuer that saw the flag still set relies on us to pick up its job
            if self.inner.queue.is_empty() || !self.try_claim_queue() {
                break;
            }
        }
        debug!("Queue drained.");
    }

    async fn run_job(&self, mut job: ObdCommandJob) {
        if job.state != JobState::New {
            error!(
                job_id = ?job.id,
                state = %job.state,
                "Job state was not new, so it shouldn't be in queue. BUG ALERT!"
            );
            self.report(&job);
            return;
        }

        if let Err(e) = job.start(self.inner.time_provider.now_millis()) {
            error!(job_id = ?job.id, error = %e, "Job could not be started");
            self.report(&job);
            return;
        }
        debug!(job_id = ?job.id, command = %job.command, "Running job");

        // Run on its own task so a panicking backend only fails this job
        let backend = Arc::clone(&self.inner.backend);
        let command = job.command.clone();
        let handle = tokio::spawn(async move { backend.execute(&command).await });
        let outcome = handle.await;

        let now = self.inner.time_provider.now_millis();
        match outcome {
            Ok(Ok(response)) => match job.finish(response, now) {
                Ok(()) => {
                    self.inner.stats.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(job_id = ?job.id, "Job finished");
                }
                Err(e) => {
                    job.fail_execution(e.to_string(), now);
                    self.inner.stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            },
            Ok(Err(e)) => {
                warn!(job_id = ?job.id, command = %job.command, error = %e, "Failed to run command");
                job.fail_execution(e.to_string(), now);
                self.inner.stats.failed.fetch_add(1, Ordering::Relaxed);
                if !self.inner.backend.is_connected().await {
                    self.connection_lost(&e.to_string());
                }
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(job_id = ?job.id, "Job panicked: {:?}", join_err);
                } else {
                    error!(job_id = ?job.id, "Job cancelled: {:?}", join_err);
                }
                job.fail_execution("command execution aborted", now);
                self.inner.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.report(&job);
    }

    /// The backend dropped its session on its own. Leave the running state
    /// so a later start_service reconnects.
    fn connection_lost(&self, reason: &str) {
        if self
            .inner
            .is_running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        error!(reason, "OBD connection lost");
        self.inner.notifier.cancel(NOTIFICATION_ID);
        self.show_notification(
            NOTIFICATION_TITLE,
            &format!("OBD connection lost: {}", reason),
            ICON_ERROR,
            false,
            false,
            true,
        );
    }

    fn report(&self, job: &ObdCommandJob) {
        let listener = self
            .inner
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match listener {
            Some(listener) => listener.state_update(job),
            None => debug!(job_id = ?job.id, state = %job.state, "No listener for job update"),
        }
    }
}
