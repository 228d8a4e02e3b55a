//! Unit tests for the gateway queue and lifecycle

use super::*;
use crate::application::backend::{MockGatewayBackend, ObdBackendConfig, ObdGatewayBackend};
use crate::domain::{ObdCommand, ObdResponse};
use crate::port::notifier::mocks::RecordingNotifier;
use crate::port::obd_connection::mocks::ScriptedConnector;
use crate::port::TransportError;
use crate::port::state_listener::mocks::CollectingListener;
use crate::port::time_provider::mocks::ManualTimeProvider;
use async_trait::async_trait;
use std::sync::atomic::AtomicUsize;
use tokio::sync::Semaphore;

const WAIT: Duration = Duration::from_secs(5);

fn ok_response() -> ObdResponse {
    ObdResponse {
        raw: "OK".to_string(),
        data: Vec::new(),
        value: None,
        unit: None,
    }
}

/// Tracks how many executions overlap
#[derive(Default)]
struct ProbeBackend {
    active: AtomicUsize,
    max_active: AtomicUsize,
    executed: AtomicUsize,
}

#[async_trait]
impl GatewayBackend for ProbeBackend {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, command: &ObdCommand) -> Result<ObdResponse> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.executed.fetch_add(1, Ordering::SeqCst);

        if command.raw == "AT FAIL" {
            return Err(AppError::NotConnected);
        }
        if command.raw == "AT PANIC" {
            panic!("backend exploded");
        }
        Ok(ok_response())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Blocks each execution until a permit is released
struct GatedBackend {
    gate: Semaphore,
}

#[async_trait]
impl GatewayBackend for GatedBackend {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _command: &ObdCommand) -> Result<ObdResponse> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        permit.forget();
        Ok(ok_response())
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    service: GatewayService,
    notifier: Arc<RecordingNotifier>,
    listener: Arc<CollectingListener>,
}

fn harness(backend: Arc<dyn GatewayBackend>) -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let listener = Arc::new(CollectingListener::new());
    let service = GatewayService::new(
        backend,
        notifier.clone(),
        Arc::new(ManualTimeProvider::new(1_000)),
    )
    .unwrap();
    service.set_context(listener.clone());
    Harness {
        service,
        notifier,
        listener,
    }
}

fn at_job(raw: &str) -> ObdCommandJob {
    ObdCommandJob::new(ObdCommand::raw("test", raw).unwrap())
}

#[tokio::test]
async fn test_sequential_ids_increase_by_one() {
    let h = harness(Arc::new(ProbeBackend::default()));

    let ids: Vec<JobId> = (0..10)
        .map(|_| h.service.queue_job(at_job("AT RV")).job_id.unwrap())
        .collect();

    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    assert!(h.service.wait_until_idle(WAIT).await);
}

#[tokio::test]
async fn test_queue_job_returns_new_state() {
    let h = harness(Arc::new(ProbeBackend::default()));

    let view = h.service.queue_job(at_job("AT RV"));
    assert_eq!(view.state, JobState::New);
    assert_eq!(view.queued_at, Some(1_000));
    assert!(h.service.wait_until_idle(WAIT).await);
}

#[tokio::test]
async fn test_closed_queue_marks_queue_error() {
    let h = harness(Arc::new(ProbeBackend::default()));
    h.service.on_destroy().await;

    let view = h.service.queue_job(at_job("AT RV"));

    assert_eq!(view.state, JobState::QueueError);
    assert_eq!(view.error.as_deref(), Some(QUEUE_CLOSED_MESSAGE));
    assert!(h.service.wait_until_idle(WAIT).await);

    let stats = h.service.stats();
    assert_eq!(stats.queue_errors, 1);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.queued, 0);
    assert!(h.listener.updates().is_empty());
}

#[tokio::test]
async fn test_queue_empty_tracks_pending_jobs() {
    let backend = Arc::new(GatedBackend {
        gate: Semaphore::new(0),
    });
    let h = harness(backend.clone());
    assert!(h.service.queue_empty());

    for _ in 0..3 {
        h.service.queue_job(at_job("AT RV"));
    }

    // The worker takes the first job and blocks on it
    let picked_up = async {
        while h.service.pending_jobs() != 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(WAIT, picked_up).await.unwrap();
    assert!(!h.service.queue_empty());
    assert!(h.service.is_queue_running());

    backend.gate.add_permits(3);
    assert!(h.service.wait_until_idle(WAIT).await);
    assert!(h.service.queue_empty());
    assert!(!h.service.is_queue_running());
    assert_eq!(h.service.stats().completed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueue_runs_single_worker() {
    let backend = Arc::new(ProbeBackend::default());
    let h = harness(backend.clone());

    let mut producers = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let service = h.service.bind();
        producers.spawn(async move {
            for _ in 0..25 {
                service.queue_job(at_job("AT RV"));
                tokio::task::yield_now().await;
            }
        });
    }
    while let Some(res) = producers.join_next().await {
        res.unwrap();
    }

    assert!(h.service.wait_until_idle(WAIT).await);
    assert_eq!(backend.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(backend.executed.load(Ordering::SeqCst), 200);

    let updates = h.listener.updates();
    assert_eq!(updates.len(), 200);
    assert!(updates.iter().all(|u| u.state == JobState::Finished));

    let mut ids: Vec<JobId> = updates.iter().filter_map(|u| u.job_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=200).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_worker_restarts_after_idle() {
    let backend = Arc::new(ProbeBackend::default());
    let h = harness(backend.clone());

    h.service.queue_job(at_job("AT RV"));
    assert!(h.service.wait_until_idle(WAIT).await);
    assert!(!h.service.is_queue_running());

    h.service.queue_job(at_job("AT RV"));
    assert!(h.service.wait_until_idle(WAIT).await);
    assert_eq!(backend.executed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_listener_sees_finished_and_failed_jobs() {
    let h = harness(Arc::new(ProbeBackend::default()));

    h.service.queue_job(at_job("AT RV"));
    h.service.queue_job(at_job("AT FAIL"));
    assert!(h.service.wait_until_idle(WAIT).await);

    let updates = h.listener.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].state, JobState::Finished);
    assert_eq!(updates[0].value.as_deref(), Some("OK"));
    assert_eq!(updates[1].state, JobState::ExecutionError);
    assert!(updates[1].error.as_deref().unwrap().contains("Not connected"));

    let stats = h.service.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_panicking_backend_fails_only_that_job() {
    let h = harness(Arc::new(ProbeBackend::default()));

    h.service.queue_job(at_job("AT PANIC"));
    h.service.queue_job(at_job("AT RV"));
    assert!(h.service.wait_until_idle(WAIT).await);

    let states: Vec<JobState> = h.listener.updates().iter().map(|u| u.state).collect();
    assert_eq!(states, vec![JobState::ExecutionError, JobState::Finished]);
    assert!(!h.service.is_queue_running());
}

#[tokio::test]
async fn test_non_new_job_is_reported_without_running() {
    let backend = Arc::new(ProbeBackend::default());
    let h = harness(backend.clone());

    let mut job = at_job("AT RV");
    job.state = JobState::Finished;
    h.service.queue_job(job);
    assert!(h.service.wait_until_idle(WAIT).await);

    assert_eq!(backend.executed.load(Ordering::SeqCst), 0);
    assert_eq!(h.listener.updates().len(), 1);
}

#[tokio::test]
async fn test_start_service_queues_init_commands() {
    let h = harness(Arc::new(MockGatewayBackend::new()));

    h.service.start_service().await.unwrap();
    assert!(h.service.is_running());
    assert!(h.service.wait_until_idle(WAIT).await);

    let updates = h.listener.updates();
    assert!(!updates.is_empty());
    assert_eq!(updates[0].command, "AT Z");
    assert!(updates.iter().all(|u| u.state == JobState::Finished));

    let shown = h.notifier.shown();
    assert_eq!(shown.len(), 2);
    assert!(shown.iter().all(|(id, n)| *id == NOTIFICATION_ID && n.ongoing));
    assert_eq!(shown[1].1.text, "Connected to OBD adapter");
}

#[tokio::test]
async fn test_lost_session_stops_service_and_restart_reconnects() {
    let connector = ScriptedConnector::elm327();
    connector.fail("01 05", TransportError::Disconnected);
    connector.respond("01 46", "41 46 3A\r\r>");
    connector.respond("01 0C", "41 0C 1A F8\r\r>");
    let h = harness(Arc::new(ObdGatewayBackend::new(
        Arc::new(connector.clone()),
        ObdBackendConfig::default(),
    )));
    h.service.start_service().await.unwrap();
    assert!(h.service.wait_until_idle(WAIT).await);

    h.service
        .queue_job(ObdCommandJob::new(ObdCommand::coolant_temperature()));
    assert!(h.service.wait_until_idle(WAIT).await);

    assert!(!h.service.is_running());
    assert!(h.notifier.cancelled().contains(&NOTIFICATION_ID));
    let (id, lost) = h.notifier.shown().last().cloned().unwrap();
    assert_eq!(id, STATUS_NOTIFICATION_ID);
    assert!(lost.text.starts_with("OBD connection lost"));
    assert!(lost.vibrate);

    h.service.start_service().await.unwrap();
    assert!(h.service.is_running());
    assert_eq!(connector.connects(), 2);

    let rpm = h
        .service
        .queue_job(ObdCommandJob::new(ObdCommand::engine_rpm()));
    assert!(h.service.wait_until_idle(WAIT).await);
    let view = h
        .listener
        .updates()
        .into_iter()
        .find(|u| u.job_id == rpm.job_id)
        .unwrap();
    assert_eq!(view.state, JobState::Finished);
    assert_eq!(view.value.as_deref(), Some("1726 rpm"));
}

#[tokio::test]
async fn test_start_reconnects_when_backend_has_no_session() {
    let backend = Arc::new(MockGatewayBackend::new());
    let h = harness(backend.clone());
    h.service.start_service().await.unwrap();
    assert!(h.service.wait_until_idle(WAIT).await);

    // Session gone behind the service's back
    backend.stop().await.unwrap();
    assert!(h.service.is_running());

    h.service.start_service().await.unwrap();
    assert!(backend.is_connected().await);
    assert!(h.service.is_running());
}

#[tokio::test]
async fn test_start_failure_stops_and_reports() {
    let h = harness(Arc::new(MockGatewayBackend::new().with_failing_start()));

    let err = h.service.start_service().await.unwrap_err();
    assert!(matches!(err, AppError::Transport(_)));
    assert!(!h.service.is_running());

    assert_eq!(h.notifier.cancelled(), vec![NOTIFICATION_ID]);
    let (id, last) = h.notifier.shown().pop().unwrap();
    assert_eq!(id, STATUS_NOTIFICATION_ID);
    assert_eq!(last.icon, ICON_ERROR);
    assert!(last.vibrate);
    assert!(last.auto_cancel);
}

#[tokio::test]
async fn test_stop_service_clears_pending_jobs() {
    let backend = Arc::new(GatedBackend {
        gate: Semaphore::new(0),
    });
    let h = harness(backend.clone());
    h.service.start_service().await.unwrap();

    for _ in 0..4 {
        h.service.queue_job(at_job("AT RV"));
    }
    let picked_up = async {
        while h.service.pending_jobs() != 3 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(WAIT, picked_up).await.unwrap();

    h.service.stop_service().await;
    assert!(!h.service.is_running());
    assert!(h.service.queue_empty());
    assert_eq!(h.service.stats().cleared, 3);

    let cleared: Vec<_> = h
        .listener
        .updates()
        .into_iter()
        .filter(|u| u.error.as_deref() == Some(QUEUE_CLEARED_MESSAGE))
        .collect();
    assert_eq!(cleared.len(), 3);
    assert!(cleared.iter().all(|u| u.state == JobState::QueueError));

    backend.gate.add_permits(1);
    assert!(h.service.wait_until_idle(WAIT).await);
    assert_eq!(h.service.stats().completed, 1);
}

#[tokio::test]
async fn test_show_notification_displays_once() {
    let h = harness(Arc::new(ProbeBackend::default()));

    h.service
        .show_notification("t", "cancelable", ICON_STATUS, false, true, true);
    h.service
        .show_notification("t", "transient", ICON_STATUS, true, false, false);

    let shown = h.notifier.shown();
    assert_eq!(shown.len(), 2);

    let (id, first) = &shown[0];
    assert_eq!(*id, NOTIFICATION_ID);
    assert!(first.auto_cancel);
    assert!(first.vibrate);
    assert_eq!(first.when_millis, 1_000);

    let (id, second) = &shown[1];
    assert_eq!(*id, STATUS_NOTIFICATION_ID);
    assert!(second.ongoing);
    assert!(!second.auto_cancel);
}

#[tokio::test]
async fn test_on_destroy_stops_and_cancels_notification() {
    let h = harness(Arc::new(MockGatewayBackend::new()));
    h.service.on_create();
    tokio_test::assert_ok!(h.service.start_service().await);

    h.service.on_destroy().await;

    assert!(!h.service.is_running());
    assert!(h.notifier.cancelled().contains(&NOTIFICATION_ID));
    let err = tokio_test::assert_err!(h.service.start_service().await);
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_bind_shares_the_instance() {
    let h = harness(Arc::new(ProbeBackend::default()));
    let bound = h.service.bind();

    bound.queue_job(at_job("AT RV"));
    let view = h.service.queue_job(at_job("AT RV"));

    assert_eq!(view.job_id, Some(2));
    assert!(h.service.wait_until_idle(WAIT).await);
    assert_eq!(bound.stats().completed, 2);
}

#[test]
fn test_new_requires_runtime() {
    let result = GatewayService::new(
        Arc::new(ProbeBackend::default()),
        Arc::new(RecordingNotifier::new()),
        Arc::new(ManualTimeProvider::new(0)),
    );
    assert!(matches!(result, Err(AppError::Internal(_))));
}
