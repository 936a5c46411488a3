//! Job monitor integration tests: shared poll cycle lifecycle, cancel
//! semantics, and progress monotonicity. Run under paused tokio time so
//! interval windows are deterministic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::{json, Value};

use botdesk_core::config::MonitorConfig;
use botdesk_core::monitor::JobMonitor;
use botdesk_core::resource::{BroadcastJob, BroadcastRequest, JobStatus, ResourceClient};
use botdesk_core::session::{SessionManager, SqliteCredentialStore};
use botdesk_core::testing::{MockAuthBackend, MockTransport};
use botdesk_core::transport::{ApiResponse, HttpMethod, TransportPipeline};

const INTERVAL: Duration = Duration::from_millis(2000);
const WINDOW: Duration = Duration::from_millis(2100);

fn job(id: i64, status: JobStatus, total: u32, success: u32, failed: u32) -> BroadcastJob {
    BroadcastJob {
        id,
        status,
        message: "promo".to_string(),
        total_recipients: total,
        sent_success: success,
        sent_failed: failed,
        created_at: None,
        completed_at: None,
    }
}

/// Scripted broadcast endpoints behind the mock transport.
#[derive(Default)]
struct FakeBroadcastServer {
    jobs: RwLock<HashMap<i64, BroadcastJob>>,
    /// Optional per-job queue of responses; the last one sticks.
    scripts: RwLock<HashMap<i64, VecDeque<BroadcastJob>>>,
    next_id: AtomicI64,
}

impl FakeBroadcastServer {
    fn set(&self, job: BroadcastJob) {
        self.jobs.write().unwrap().insert(job.id, job);
    }

    fn script(&self, id: i64, states: Vec<BroadcastJob>) {
        self.scripts.write().unwrap().insert(id, states.into());
    }

    fn get(&self, id: i64) -> Option<BroadcastJob> {
        let mut scripts = self.scripts.write().unwrap();
        if let Some(queue) = scripts.get_mut(&id) {
            if queue.len() > 1 {
                return queue.pop_front();
            }
            return queue.front().cloned();
        }
        drop(scripts);
        self.jobs.read().unwrap().get(&id).cloned()
    }

    fn mark_cancelled(&self, id: i64) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(&id) {
            job.status = JobStatus::Cancelled;
        }
    }
}

fn wire(server: Arc<FakeBroadcastServer>) -> (JobMonitor, Arc<MockTransport>) {
    let handler_server = Arc::clone(&server);
    let transport = Arc::new(MockTransport::new(move |request, _token| {
        let path = request.path.as_str();

        if path == "/broadcasts" && request.method == HttpMethod::Post {
            let id = handler_server.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let created = job(id, JobStatus::Pending, 2, 0, 0);
            handler_server.set(created.clone());
            return Ok(ApiResponse::new(
                201,
                serde_json::to_value(&created).unwrap(),
            ));
        }

        if let Some(rest) = path.strip_prefix("/broadcasts/") {
            if let Some(id) = rest.strip_suffix("/cancel") {
                handler_server.mark_cancelled(id.parse().unwrap());
                return Ok(ApiResponse::new(200, Value::Null));
            }
            let id: i64 = rest.parse().unwrap();
            return match handler_server.get(id) {
                Some(job) => Ok(ApiResponse::new(200, serde_json::to_value(&job).unwrap())),
                None => Ok(ApiResponse::new(404, json!({"detail": "job not found"}))),
            };
        }

        Ok(ApiResponse::new(404, Value::Null))
    }));

    let backend = Arc::new(MockAuthBackend::new());
    let store = Arc::new(SqliteCredentialStore::in_memory().unwrap());
    let session = Arc::new(SessionManager::new(backend, store));
    let pipeline = Arc::new(TransportPipeline::new(transport.clone(), session));
    let client = Arc::new(ResourceClient::new(pipeline));
    let config = MonitorConfig {
        poll_interval_ms: INTERVAL.as_millis() as u64,
    };

    (JobMonitor::new(client, &config), transport)
}

#[tokio::test(start_paused = true)]
async fn polls_only_active_jobs_while_any_remains() {
    let server = Arc::new(FakeBroadcastServer::default());
    server.set(job(1, JobStatus::Pending, 10, 0, 0));
    server.set(job(2, JobStatus::Completed, 10, 10, 0));
    server.set(job(3, JobStatus::InProgress, 10, 4, 0));
    let (monitor, transport) = wire(Arc::clone(&server));

    monitor.track(job(1, JobStatus::Pending, 10, 0, 0)).await;
    monitor.track(job(2, JobStatus::Completed, 10, 10, 0)).await;
    monitor.track(job(3, JobStatus::InProgress, 10, 4, 0)).await;

    assert!(monitor.is_polling());
    tokio::time::sleep(WINDOW).await;

    assert_eq!(transport.requests_for("/broadcasts/1").len(), 1);
    assert_eq!(transport.requests_for("/broadcasts/3").len(), 1);
    // Terminal jobs are not re-fetched.
    assert_eq!(transport.requests_for("/broadcasts/2").len(), 0);
    assert!(monitor.is_polling());
}

#[tokio::test(start_paused = true)]
async fn polling_stops_once_every_job_is_terminal() {
    let server = Arc::new(FakeBroadcastServer::default());
    server.set(job(1, JobStatus::Completed, 10, 10, 0));
    let (monitor, transport) = wire(Arc::clone(&server));

    monitor.track(job(1, JobStatus::InProgress, 10, 8, 0)).await;
    assert!(monitor.is_polling());

    // The next poll observes the terminal state and the loop exits.
    tokio::time::sleep(WINDOW).await;
    assert!(!monitor.is_polling());

    // No further poll within two interval windows.
    let count = transport.request_count();
    tokio::time::sleep(WINDOW * 2).await;
    assert_eq!(transport.request_count(), count);
}

#[tokio::test(start_paused = true)]
async fn polling_resumes_when_a_new_active_job_arrives() {
    let server = Arc::new(FakeBroadcastServer::default());
    server.set(job(1, JobStatus::Completed, 10, 10, 0));
    let (monitor, transport) = wire(Arc::clone(&server));

    monitor.track(job(1, JobStatus::InProgress, 10, 8, 0)).await;
    tokio::time::sleep(WINDOW).await;
    assert!(!monitor.is_polling());

    server.set(job(4, JobStatus::Pending, 5, 0, 0));
    monitor.track(job(4, JobStatus::Pending, 5, 0, 0)).await;
    assert!(monitor.is_polling());

    tokio::time::sleep(WINDOW).await;
    assert_eq!(transport.requests_for("/broadcasts/4").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn tracking_only_terminal_jobs_never_starts_the_loop() {
    let server = Arc::new(FakeBroadcastServer::default());
    let (monitor, transport) = wire(server);

    monitor.track(job(1, JobStatus::Completed, 10, 10, 0)).await;
    monitor.track(job(2, JobStatus::Failed, 10, 3, 7)).await;

    assert!(!monitor.is_polling());
    tokio::time::sleep(WINDOW * 2).await;
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_waits_for_the_poll_to_confirm() {
    let server = Arc::new(FakeBroadcastServer::default());
    server.set(job(1, JobStatus::InProgress, 10, 4, 0));
    let (monitor, transport) = wire(Arc::clone(&server));

    monitor.track(job(1, JobStatus::InProgress, 10, 4, 0)).await;

    monitor.cancel(1).await.unwrap();
    assert_eq!(transport.requests_for("/broadcasts/1/cancel").len(), 1);

    // Not locally forced: still in_progress until a poll confirms.
    let snapshot = monitor.snapshot().await;
    assert_eq!(snapshot[0].status, JobStatus::InProgress);

    tokio::time::sleep(WINDOW).await;
    let snapshot = monitor.snapshot().await;
    assert_eq!(snapshot[0].status, JobStatus::Cancelled);
    assert!(!monitor.is_polling());
}

#[tokio::test(start_paused = true)]
async fn progress_counters_never_regress_and_never_exceed_total() {
    let server = Arc::new(FakeBroadcastServer::default());
    server.script(
        1,
        vec![
            job(1, JobStatus::InProgress, 100, 10, 2),
            // Server glitch: counters go backwards.
            job(1, JobStatus::InProgress, 100, 5, 1),
            // And overshoot.
            job(1, JobStatus::InProgress, 100, 95, 10),
            job(1, JobStatus::Completed, 100, 95, 5),
        ],
    );
    let (monitor, _) = wire(Arc::clone(&server));

    monitor.track(job(1, JobStatus::Pending, 100, 0, 0)).await;

    let mut last_success = 0;
    let mut last_failed = 0;
    for _ in 0..5 {
        tokio::time::sleep(WINDOW).await;
        let snapshot = monitor.snapshot().await;
        let tracked = &snapshot[0];

        assert!(tracked.sent_success >= last_success, "sent_success regressed");
        assert!(tracked.sent_failed >= last_failed, "sent_failed regressed");
        assert!(
            tracked.sent_success + tracked.sent_failed <= tracked.total_recipients,
            "counters exceed total_recipients"
        );
        last_success = tracked.sent_success;
        last_failed = tracked.sent_failed;
    }

    let snapshot = monitor.snapshot().await;
    assert_eq!(snapshot[0].status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn subscribers_receive_observed_changes() {
    let server = Arc::new(FakeBroadcastServer::default());
    server.set(job(1, JobStatus::Completed, 10, 10, 0));
    let (monitor, _) = wire(Arc::clone(&server));
    let mut updates = monitor.subscribe();

    monitor.track(job(1, JobStatus::InProgress, 10, 8, 0)).await;

    // First update is the tracked snapshot itself.
    let first = updates.recv().await.unwrap();
    assert_eq!(first.job.status, JobStatus::InProgress);

    tokio::time::sleep(WINDOW).await;
    let second = updates.recv().await.unwrap();
    assert_eq!(second.job.status, JobStatus::Completed);
    assert_eq!(second.job.sent_success, 10);
}

#[tokio::test(start_paused = true)]
async fn start_broadcast_creates_and_tracks_the_job() {
    let server = Arc::new(FakeBroadcastServer::default());
    let (monitor, transport) = wire(Arc::clone(&server));

    let request = BroadcastRequest::to_numbers(
        "promo",
        vec!["+393331234567".to_string(), "+14155552671".to_string()],
    );
    let created = monitor.start_broadcast(&request).await.unwrap();

    assert_eq!(created.status, JobStatus::Pending);
    assert_eq!(transport.requests_for("/broadcasts").len(), 1);
    assert!(monitor.is_polling());

    server.set(job(created.id, JobStatus::Completed, 2, 2, 0));
    tokio::time::sleep(WINDOW).await;

    let snapshot = monitor.snapshot().await;
    assert_eq!(snapshot[0].status, JobStatus::Completed);
    assert!(!monitor.is_polling());
}
