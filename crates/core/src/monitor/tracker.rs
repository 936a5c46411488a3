//! The broadcast job tracker and its poll loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::error::ApiError;
use crate::metrics;
use crate::resource::{BroadcastJob, BroadcastRequest, ResourceClient};

/// A tracked job changed (status or send counters).
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub job: BroadcastJob,
}

/// Tracks broadcast jobs to completion.
///
/// Polls all tracked jobs in one shared cycle while at least one is
/// non-terminal; stops entirely when every job is terminal and resumes
/// when a new active job is tracked.
pub struct JobMonitor {
    client: Arc<ResourceClient>,
    poll_interval: Duration,
    jobs: Arc<RwLock<HashMap<i64, BroadcastJob>>>,
    polling: Arc<AtomicBool>,
    updates: broadcast::Sender<JobUpdate>,
    shutdown: broadcast::Sender<()>,
}

impl JobMonitor {
    pub fn new(client: Arc<ResourceClient>, config: &MonitorConfig) -> Self {
        let (updates, _) = broadcast::channel(64);
        let (shutdown, _) = broadcast::channel(1);

        Self {
            client,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            polling: Arc::new(AtomicBool::new(false)),
            updates,
            shutdown,
        }
    }

    /// Create a broadcast and track the resulting job.
    pub async fn start_broadcast(
        &self,
        request: &BroadcastRequest,
    ) -> Result<BroadcastJob, ApiError> {
        let job = self.client.create_broadcast(request).await?;
        self.track(job.clone()).await;
        Ok(job)
    }

    /// Track a job. Polling resumes if it is non-terminal and the loop is
    /// not already running.
    pub async fn track(&self, job: BroadcastJob) {
        let merged = {
            let mut jobs = self.jobs.write().await;
            let merged = match jobs.get(&job.id) {
                Some(prev) => merge_progress(prev, job),
                None => job,
            };
            jobs.insert(merged.id, merged.clone());
            merged
        };

        let _ = self.updates.send(JobUpdate { job: merged });
        self.ensure_polling().await;
    }

    /// Stop tracking a job. Does not affect the job server-side.
    pub async fn untrack(&self, job_id: i64) {
        self.jobs.write().await.remove(&job_id);
    }

    /// Request cancellation of a job.
    ///
    /// The tracked status is deliberately not forced to `cancelled`; a
    /// later poll confirms whatever state the server actually reached.
    pub async fn cancel(&self, job_id: i64) -> Result<(), ApiError> {
        self.client.cancel_broadcast(job_id).await
    }

    /// Subscribe to job updates.
    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.updates.subscribe()
    }

    /// Current view of all tracked jobs, ordered by id.
    pub async fn snapshot(&self) -> Vec<BroadcastJob> {
        let mut jobs: Vec<BroadcastJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Whether the shared poll loop is currently running.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Shut the poll loop down for teardown. Tracked state is retained.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    async fn ensure_polling(&self) {
        let any_active = self
            .jobs
            .read()
            .await
            .values()
            .any(|job| !job.status.is_terminal());
        if !any_active {
            return;
        }
        if !self.polling.swap(true, Ordering::SeqCst) {
            self.spawn_poll_loop();
        }
    }

    fn spawn_poll_loop(&self) {
        let client = Arc::clone(&self.client);
        let jobs = Arc::clone(&self.jobs);
        let polling = Arc::clone(&self.polling);
        let updates = self.updates.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            debug!("job poll loop started");
            'run: loop {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            polling.store(false, Ordering::SeqCst);
                            debug!("job poll loop shut down");
                            return;
                        }
                        _ = tokio::time::sleep(interval) => {}
                    }

                    metrics::MONITOR_POLL_CYCLES.inc();
                    let active: Vec<i64> = jobs
                        .read()
                        .await
                        .values()
                        .filter(|job| !job.status.is_terminal())
                        .map(|job| job.id)
                        .collect();
                    if active.is_empty() {
                        break;
                    }

                    // One cycle fetches every active job concurrently.
                    let client_ref = &client;
                    let polled = join_all(active.into_iter().map(|job_id| async move {
                        (job_id, client_ref.get_broadcast(job_id).await)
                    }))
                    .await;

                    for (job_id, result) in polled {
                        match result {
                            Ok(fresh) => {
                                let changed = {
                                    let mut guard = jobs.write().await;
                                    match guard.get(&job_id) {
                                        Some(prev) => {
                                            let merged = merge_progress(prev, fresh);
                                            if merged != *prev {
                                                guard.insert(job_id, merged.clone());
                                                Some(merged)
                                            } else {
                                                None
                                            }
                                        }
                                        // Untracked mid-poll; drop the result.
                                        None => None,
                                    }
                                };
                                if let Some(job) = changed {
                                    if job.status.is_terminal() {
                                        debug!(job_id = job.id, status = %job.status, "job reached terminal state");
                                    }
                                    let _ = updates.send(JobUpdate { job });
                                }
                            }
                            Err(e) => {
                                // Transient poll failures leave the last
                                // known state in place.
                                warn!(job_id = job_id, "job poll failed: {}", e);
                            }
                        }
                    }

                    let any_active = jobs
                        .read()
                        .await
                        .values()
                        .any(|job| !job.status.is_terminal());
                    if !any_active {
                        break;
                    }
                }

                polling.store(false, Ordering::SeqCst);

                // A job tracked between the exit decision and the flag
                // clear must not be left unpolled.
                let any_active = jobs
                    .read()
                    .await
                    .values()
                    .any(|job| !job.status.is_terminal());
                if any_active && !polling.swap(true, Ordering::SeqCst) {
                    continue 'run;
                }

                debug!("job poll loop stopped, all tracked jobs terminal");
                break 'run;
            }
        });
    }
}

/// Merge a freshly polled job into the tracked state.
///
/// Send counters are monotonically non-decreasing while tracked and their
/// sum never exceeds `total_recipients`; server regressions are clamped.
fn merge_progress(prev: &BroadcastJob, mut fresh: BroadcastJob) -> BroadcastJob {
    if fresh.sent_success < prev.sent_success || fresh.sent_failed < prev.sent_failed {
        warn!(
            job_id = fresh.id,
            "server reported regressing send counters, clamping"
        );
    }

    fresh.total_recipients = fresh.total_recipients.max(prev.total_recipients);
    fresh.sent_success = fresh.sent_success.max(prev.sent_success);
    fresh.sent_failed = fresh.sent_failed.max(prev.sent_failed);

    let total = fresh.total_recipients;
    if fresh.sent_success > total {
        warn!(job_id = fresh.id, "sent_success exceeds recipients, clamping");
        fresh.sent_success = total;
    }
    if fresh.sent_success + fresh.sent_failed > total {
        warn!(job_id = fresh.id, "send counters exceed recipients, clamping");
        fresh.sent_failed = total - fresh.sent_success;
    }

    fresh
}
