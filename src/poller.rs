//! Polling of asynchronous media-generation jobs.
//!
//! `JobPoller::tick` checks every message that is pending *right now* and
//! finalizes the ones whose job finished. `PollScheduler` drives ticks on a
//! fixed interval and keeps exactly one timer alive while at least one
//! pending message exists.

use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::Attachment;
use crate::backend::StatusSource;
use crate::store::{Resolution, SharedStore};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub const JOB_FAILED: &str = "Generation failed.";

pub const STATUS_UNAVAILABLE: &str = "Could not retrieve generation status.";

/// Wire shape of the status-check endpoint.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Processing,
    Completed {
        content: String,
        attachments: Vec<Attachment>,
    },
    Failed {
        reason: Option<String>,
    },
}

impl From<StatusResponse> for JobStatus {
    fn from(response: StatusResponse) -> Self {
        match response.status.to_ascii_lowercase().as_str() {
            "completed" | "succeeded" => {
                let result = response.result.unwrap_or_default();
                JobStatus::Completed {
                    content: result.content,
                    attachments: result.attachments,
                }
            }
            "failed" | "canceled" | "cancelled" => JobStatus::Failed {
                reason: response.error.filter(|e| !e.trim().is_empty()),
            },
            _ => JobStatus::Processing,
        }
    }
}

impl JobStatus {
    /// `None` while the job is still running.
    pub fn into_resolution(self) -> Option<Resolution> {
        match self {
            JobStatus::Processing => None,
            JobStatus::Completed {
                content,
                attachments,
            } => Some(Resolution::Completed {
                content,
                attachments,
            }),
            JobStatus::Failed { reason } => Some(Resolution::Failed {
                reason: reason.unwrap_or_else(|| JOB_FAILED.to_string()),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
}

pub struct JobPoller {
    store: SharedStore,
    source: Arc<dyn StatusSource>,
}

impl JobPoller {
    pub fn new(store: SharedStore, source: Arc<dyn StatusSource>) -> Self {
        JobPoller { store, source }
    }

    /// One polling round. The pending set is read from the store on every
    /// call, and a result is only applied if its message is still pending
    /// when the check returns.
    pub async fn tick(&self) -> TickReport {
        let jobs = self.store.lock().await.pending_jobs();
        let mut report = TickReport {
            checked: jobs.len(),
            ..TickReport::default()
        };
        if jobs.is_empty() {
            return report;
        }

        let checks = jobs.iter().map(|job| async move {
            (job.message_id, self.source.check(&job.job_status_url).await)
        });
        let results = join_all(checks).await;

        let mut store = self.store.lock().await;
        for (id, result) in results {
            let resolution = match result {
                Ok(status) => status.into_resolution(),
                Err(e) => {
                    tracing::warn!(message_id = %id, error = %e, "status check failed");
                    Some(Resolution::Failed {
                        reason: STATUS_UNAVAILABLE.to_string(),
                    })
                }
            };
            match resolution {
                None => report.still_pending += 1,
                Some(resolution) => {
                    let failed = matches!(resolution, Resolution::Failed { .. });
                    if store.resolve(id, resolution) {
                        if failed {
                            report.failed += 1;
                        } else {
                            report.completed += 1;
                        }
                    }
                }
            }
        }
        report
    }

    async fn pending_count(&self) -> usize {
        self.store.lock().await.pending_count()
    }
}

struct SchedulerInner {
    poller: JobPoller,
    period: Duration,
    // Lock order: `timer` before the store.
    timer: Mutex<Option<CancellationToken>>,
}

/// Handle to the shared poll timer; clones drive the same timer.
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<SchedulerInner>,
}

impl PollScheduler {
    pub fn new(poller: JobPoller, period: Duration) -> Self {
        PollScheduler {
            inner: Arc::new(SchedulerInner {
                poller,
                period,
                timer: Mutex::new(None),
            }),
        }
    }

    /// Starts the timer if the store holds a pending message and no timer is
    /// running. Call after any mutation that may add a pending message.
    /// Returns whether a timer is running afterwards.
    pub async fn ensure_armed(&self) -> bool {
        let mut timer = self.inner.timer.lock().await;
        if timer.is_some() {
            return true;
        }
        if self.inner.poller.pending_count().await == 0 {
            return false;
        }
        let cancel = CancellationToken::new();
        *timer = Some(cancel.clone());
        tokio::spawn(Self::run(Arc::clone(&self.inner), cancel));
        tracing::debug!(period = ?self.inner.period, "poll timer armed");
        true
    }

    /// Stops the timer, abandoning a tick that is in flight.
    pub async fn disarm(&self) {
        if let Some(cancel) = self.inner.timer.lock().await.take() {
            cancel.cancel();
            tracing::debug!("poll timer disarmed");
        }
    }

    pub async fn is_armed(&self) -> bool {
        self.inner.timer.lock().await.is_some()
    }

    async fn run(inner: Arc<SchedulerInner>, cancel: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + inner.period, inner.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let report = tokio::select! {
                _ = cancel.cancelled() => return,
                report = inner.poller.tick() => report,
            };
            tracing::debug!(?report, "poll tick");

            let mut timer = inner.timer.lock().await;
            if cancel.is_cancelled() {
                // disarmed while this tick ran; the slot belongs to someone else now
                return;
            }
            if inner.poller.pending_count().await == 0 {
                *timer = None;
                tracing::debug!("no pending jobs left, poll timer stopped");
                return;
            }
        }
    }
}
